// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::RefCell;
use std::rc::Rc;

use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::context::ContextGuard;
use crate::context::ContextStack;
use crate::context::ExecutionContext;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::handle::HandleRecord;
use crate::handle::HandleState;
use crate::native::NativeHandle;
use crate::native::stream::StreamHandle;
use crate::native::udp::UdpHandle;
use crate::options::BridgeOptions;
use crate::resources::ResourceId;
use crate::resources::ResourceTable;
use crate::uv::RunMode;
use crate::uv::UvLoop;

thread_local! {
  static DEFAULT_BRIDGE: RefCell<Option<Rc<UvBridge>>> = const { RefCell::new(None) };
}

/// Returns this thread's default bridge, creating it from the environment on
/// first use.
pub fn default_bridge() -> Result<Rc<UvBridge>, BridgeError> {
  DEFAULT_BRIDGE.with(|cell| {
    if let Some(bridge) = cell.borrow().as_ref() {
      return Ok(bridge.clone());
    }
    let bridge = Rc::new(UvBridge::new(BridgeOptions::from_env())?);
    *cell.borrow_mut() = Some(bridge.clone());
    Ok(bridge)
  })
}

/// Owns the native loop and every handle record created through it.
///
/// All entry points take `&self`: host closures receive the bridge while a
/// completion is being dispatched and may start, stop or close handles from
/// there.
pub struct UvBridge {
  // Records drop before the loop so their sockets deregister from a live
  // reactor.
  resources: RefCell<ResourceTable>,
  contexts: ContextStack,
  options: BridgeOptions,
  pub(crate) uv: UvLoop,
}

impl UvBridge {
  pub fn new(options: BridgeOptions) -> Result<Self, BridgeError> {
    let uv = UvLoop::new(options.threadpool_size)?;
    Ok(Self {
      resources: RefCell::new(ResourceTable::default()),
      contexts: ContextStack::new(ExecutionContext::new("root")),
      options,
      uv,
    })
  }

  pub fn options(&self) -> &BridgeOptions {
    &self.options
  }

  pub fn current_context(&self) -> ExecutionContext {
    self.contexts.current()
  }

  /// Makes `context` current until the guard is dropped. Handles and
  /// callbacks registered meanwhile capture it.
  pub fn enter_context(&self, context: ExecutionContext) -> ContextGuard<'_> {
    self.contexts.enter(context)
  }

  pub fn lookup(&self, rid: ResourceId) -> Result<Rc<HandleRecord>, BridgeError> {
    self.resources.borrow().lookup(rid)
  }

  pub fn retain(&self, rid: ResourceId) -> Result<usize, BridgeError> {
    let count = self.resources.borrow_mut().retain(rid)?;
    log::trace!("retain {rid} -> {count}");
    Ok(count)
  }

  /// Drops one reference; the record is torn down when none remain.
  pub fn release(&self, rid: ResourceId) {
    let released = self.resources.borrow_mut().release(rid);
    log::trace!("release {rid} -> {:?}", self.refcount(rid));
    if let Some(record) = released {
      self.destroy(&record);
    }
  }

  pub fn refcount(&self, rid: ResourceId) -> Option<usize> {
    self.resources.borrow().refcount(rid)
  }

  pub fn resource_count(&self) -> usize {
    self.resources.borrow().len()
  }

  pub fn resource_names(&self) -> Vec<(ResourceId, &'static str)> {
    self.resources.borrow().names().collect()
  }

  pub(crate) fn register(
    &self,
    kind: HandleKind,
    native: NativeHandle,
  ) -> ResourceId {
    let record =
      Rc::new(HandleRecord::new(kind, native, self.current_context()));
    let rid = self.resources.borrow_mut().register(record);
    self.uv.init_handle(rid);
    log::trace!("registered {kind} handle {rid}");
    rid
  }

  /// Removes the entry regardless of its count and tears the record down.
  pub(crate) fn delete(&self, rid: ResourceId) {
    let removed = self.resources.borrow_mut().remove(rid);
    if let Some(record) = removed {
      self.destroy(&record);
    }
  }

  fn destroy(&self, record: &HandleRecord) {
    let rid = record.rid();
    if record.state() == HandleState::Destroyed {
      return;
    }
    self.uv.forget(rid);
    match record.teardown() {
      Ok(()) => log::trace!("destroyed {} handle {rid}", record.kind()),
      Err(err) => log::debug!("teardown of {rid} skipped: {err}"),
    }
  }

  /// Looks up a record that may still start operations.
  pub(crate) fn open(
    &self,
    rid: ResourceId,
  ) -> Result<Rc<HandleRecord>, BridgeError> {
    let record = self.lookup(rid)?;
    record.ensure_open()?;
    Ok(record)
  }

  /// Looks up a record of `kind`, whatever its state. Stop operations use
  /// this so they stay idempotent on closing handles.
  pub(crate) fn lookup_kind(
    &self,
    rid: ResourceId,
    kind: HandleKind,
    op: &'static str,
  ) -> Result<Rc<HandleRecord>, BridgeError> {
    let record = self.lookup(rid)?;
    if record.kind() != kind {
      return Err(BridgeError::Unsupported {
        op,
        kind: record.kind(),
      });
    }
    Ok(record)
  }

  pub(crate) fn open_kind(
    &self,
    rid: ResourceId,
    kind: HandleKind,
    op: &'static str,
  ) -> Result<Rc<HandleRecord>, BridgeError> {
    let record = self.lookup_kind(rid, kind, op)?;
    record.ensure_open()?;
    Ok(record)
  }

  pub(crate) fn as_stream(
    &self,
    record: &HandleRecord,
    op: &'static str,
  ) -> Result<StreamHandle, BridgeError> {
    record.native().stream().ok_or(BridgeError::Unsupported {
      op,
      kind: record.kind(),
    })
  }

  pub(crate) fn as_udp(
    &self,
    record: &HandleRecord,
    op: &'static str,
  ) -> Result<UdpHandle, BridgeError> {
    record.native().udp().ok_or(BridgeError::Unsupported {
      op,
      kind: record.kind(),
    })
  }

  pub(crate) fn set_slot(
    &self,
    record: &HandleRecord,
    event: EventKind,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    record.set_callback(event, callback, self.current_context())
  }

  /// Marks a persistent event as started. The first start takes a reference
  /// that is held until the matching [`Self::unwatch`].
  pub(crate) fn watch(
    &self,
    record: &HandleRecord,
    event: EventKind,
  ) -> Result<(), BridgeError> {
    if record.add_watcher(event) {
      if let Err(err) = self.retain(record.rid()) {
        record.remove_watcher(event);
        return Err(err);
      }
    }
    record.mark_active();
    self.uv.set_active(record.rid(), true);
    Ok(())
  }

  pub(crate) fn unwatch(&self, record: &HandleRecord, event: EventKind) {
    if !record.remove_watcher(event) {
      return;
    }
    let rid = record.rid();
    if !record.has_watchers() {
      self.uv.set_active(rid, false);
    }
    self.release(rid);
  }

  /// Accounts for a one-shot request the native side has accepted. Its
  /// completion releases the reference taken here.
  pub(crate) fn begin_request(
    &self,
    record: &HandleRecord,
    event: EventKind,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    self.set_slot(record, event, callback)?;
    self.retain(record.rid())?;
    self.uv.begin_request();
    record.mark_active();
    Ok(())
  }

  /// Creates a handle of a kind that needs no parameters.
  pub fn create(&self, kind: HandleKind) -> Result<ResourceId, BridgeError> {
    let native = match kind {
      HandleKind::Timer => NativeHandle::Timer,
      HandleKind::Tcp => NativeHandle::Stream(StreamHandle::new(kind, false)),
      HandleKind::Pipe => NativeHandle::Stream(StreamHandle::new(kind, false)),
      HandleKind::Udp => NativeHandle::Udp(UdpHandle::new()),
      HandleKind::Idle | HandleKind::Prepare | HandleKind::Check => {
        NativeHandle::Watcher
      }
      kind => return Err(BridgeError::Unsupported { op: "create", kind }),
    };
    Ok(self.register(kind, native))
  }

  /// Starts closing `rid`. Outstanding requests complete with `ECANCELED`
  /// before `callback` runs; the record is torn down right after it.
  pub fn close(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.lookup(rid)?;
    let kind = record.kind();
    if kind.is_request() || kind == HandleKind::Lock {
      return Err(BridgeError::Unsupported { op: "close", kind });
    }
    record.mark_closing()?;
    self.set_slot(&record, EventKind::Close, callback)?;
    self.retain(rid)?;
    for event in record.watching() {
      self.unwatch(&record, event);
    }
    let sink = self.uv.sink();
    match &*record.native() {
      NativeHandle::Stream(stream) => stream.cancel_pending(rid, &sink),
      NativeHandle::Udp(udp) => udp.cancel_pending(rid, &sink),
      NativeHandle::FsEvent(watcher) => watcher.stop(&self.uv, rid),
      _ => {}
    }
    self.uv.close(rid);
    log::debug!("closing {kind} handle {rid}");
    Ok(())
  }

  pub fn is_active(&self, rid: ResourceId) -> bool {
    self.uv.is_active(rid)
  }

  pub fn is_closing(&self, rid: ResourceId) -> bool {
    self
      .lookup(rid)
      .map(|record| record.is_closing())
      .unwrap_or(true)
  }

  pub fn is_readable(&self, rid: ResourceId) -> bool {
    self
      .lookup(rid)
      .ok()
      .and_then(|record| record.native().stream())
      .is_some_and(|stream| stream.is_readable())
  }

  pub fn is_writable(&self, rid: ResourceId) -> bool {
    self
      .lookup(rid)
      .ok()
      .and_then(|record| record.native().stream())
      .is_some_and(|stream| stream.is_writable())
  }

  /// Lets `rid` keep the loop alive again. Has no effect on the resource
  /// table.
  pub fn ref_handle(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lookup(rid)?;
    self.uv.ref_handle(rid);
    Ok(())
  }

  /// Stops `rid` from keeping the loop alive. Has no effect on the resource
  /// table.
  pub fn unref_handle(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lookup(rid)?;
    self.uv.unref_handle(rid);
    Ok(())
  }

  pub fn has_ref(&self, rid: ResourceId) -> bool {
    self.uv.has_ref(rid)
  }

  /// Runs the loop, dispatching completions to host closures. Returns true
  /// while active handles or requests remain.
  pub fn run(&self, mode: RunMode) -> bool {
    self.uv.run(mode, &|completion| self.dispatch(completion))
  }

  pub fn stop(&self) {
    self.uv.stop();
  }

  pub fn now(&self) -> u64 {
    self.uv.now()
  }

  pub fn update_time(&self) {
    self.uv.update_time();
  }
}
