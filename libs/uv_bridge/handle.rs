// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::Cell;
use std::cell::Ref;
use std::cell::RefCell;
use std::fmt;

use crate::callback::CallbackSlot;
use crate::callback::CallbackSlots;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::context::ExecutionContext;
use crate::error::BridgeError;
use crate::native::NativeHandle;
use crate::resources::ResourceId;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum HandleKind {
  Timer,
  Tcp,
  Udp,
  Pipe,
  Tty,
  Process,
  Idle,
  Prepare,
  Check,
  Async,
  Poll,
  FsEvent,
  FsPoll,
  Fs,
  GetAddrInfo,
  Work,
  Lock,
}

impl HandleKind {
  pub fn is_stream(self) -> bool {
    matches!(self, HandleKind::Tcp | HandleKind::Pipe | HandleKind::Tty)
  }

  /// Request kinds live for exactly one operation and cannot be closed.
  pub fn is_request(self) -> bool {
    matches!(
      self,
      HandleKind::Fs | HandleKind::GetAddrInfo | HandleKind::Work
    )
  }

  /// libuv's `uv_handle_type` numbering, used for the pending type of
  /// `read2` callbacks.
  pub fn handle_type(self) -> i32 {
    match self {
      HandleKind::Async => 1,
      HandleKind::Check => 2,
      HandleKind::FsEvent => 3,
      HandleKind::FsPoll => 4,
      HandleKind::Idle => 6,
      HandleKind::Pipe => 7,
      HandleKind::Poll => 8,
      HandleKind::Prepare => 9,
      HandleKind::Process => 10,
      HandleKind::Tcp => 12,
      HandleKind::Timer => 13,
      HandleKind::Tty => 14,
      HandleKind::Udp => 15,
      HandleKind::Fs
      | HandleKind::GetAddrInfo
      | HandleKind::Work
      | HandleKind::Lock => 0,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum HandleState {
  Created,
  Active,
  Closing,
  Destroyed,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LiveState {
  Created,
  Active,
  Closing,
}

// Callback slots only exist while the record is live. Once torn down there is
// nothing left to read, so a late completion cannot reach a stale closure.
enum Phase {
  Live {
    state: LiveState,
    slots: CallbackSlots,
  },
  Destroyed,
}

/// Per-handle bookkeeping shared between the host and the native loop.
pub struct HandleRecord {
  rid: Cell<ResourceId>,
  kind: HandleKind,
  context: ExecutionContext,
  phase: RefCell<Phase>,
  // Persistent event kinds currently started. Each holds one reference.
  watchers: Cell<u32>,
  native: RefCell<NativeHandle>,
}

impl HandleRecord {
  pub(crate) fn new(
    kind: HandleKind,
    native: NativeHandle,
    context: ExecutionContext,
  ) -> Self {
    Self {
      rid: Cell::new(0),
      kind,
      context,
      phase: RefCell::new(Phase::Live {
        state: LiveState::Created,
        slots: CallbackSlots::new(),
      }),
      watchers: Cell::new(0),
      native: RefCell::new(native),
    }
  }

  /// Resource id of the record, or 0 once it has been torn down.
  pub fn rid(&self) -> ResourceId {
    self.rid.get()
  }

  pub(crate) fn set_rid(&self, rid: ResourceId) {
    self.rid.set(rid);
  }

  pub fn kind(&self) -> HandleKind {
    self.kind
  }

  pub fn context(&self) -> &ExecutionContext {
    &self.context
  }

  pub fn state(&self) -> HandleState {
    match &*self.phase.borrow() {
      Phase::Live { state, .. } => match state {
        LiveState::Created => HandleState::Created,
        LiveState::Active => HandleState::Active,
        LiveState::Closing => HandleState::Closing,
      },
      Phase::Destroyed => HandleState::Destroyed,
    }
  }

  pub fn is_closing(&self) -> bool {
    matches!(
      self.state(),
      HandleState::Closing | HandleState::Destroyed
    )
  }

  pub(crate) fn ensure_open(&self) -> Result<(), BridgeError> {
    match self.state() {
      HandleState::Created | HandleState::Active => Ok(()),
      state => Err(BridgeError::InvalidHandleState {
        rid: self.rid(),
        state,
      }),
    }
  }

  pub(crate) fn mark_active(&self) {
    if let Phase::Live { state, .. } = &mut *self.phase.borrow_mut() {
      if *state == LiveState::Created {
        *state = LiveState::Active;
      }
    }
  }

  pub(crate) fn mark_closing(&self) -> Result<(), BridgeError> {
    self.ensure_open()?;
    if let Phase::Live { state, .. } = &mut *self.phase.borrow_mut() {
      *state = LiveState::Closing;
    }
    Ok(())
  }

  pub(crate) fn set_callback(
    &self,
    kind: EventKind,
    callback: Option<HostCallback>,
    context: ExecutionContext,
  ) -> Result<(), BridgeError> {
    let previous = match &mut *self.phase.borrow_mut() {
      Phase::Live { slots, .. } => slots.set(
        kind,
        callback.map(|callback| CallbackSlot { callback, context }),
      ),
      Phase::Destroyed => {
        return Err(BridgeError::InvalidHandleState {
          rid: self.rid(),
          state: HandleState::Destroyed,
        });
      }
    };
    drop(previous);
    Ok(())
  }

  pub(crate) fn callback(&self, kind: EventKind) -> Option<CallbackSlot> {
    match &*self.phase.borrow() {
      Phase::Live { slots, .. } => slots.get(kind),
      Phase::Destroyed => None,
    }
  }

  pub fn registered_events(&self) -> Vec<EventKind> {
    match &*self.phase.borrow() {
      Phase::Live { slots, .. } => slots.registered(),
      Phase::Destroyed => Vec::new(),
    }
  }

  pub(crate) fn is_watching(&self, kind: EventKind) -> bool {
    self.watchers.get() & kind.bit() != 0
  }

  /// Returns true when `kind` was not started before.
  pub(crate) fn add_watcher(&self, kind: EventKind) -> bool {
    let watchers = self.watchers.get();
    self.watchers.set(watchers | kind.bit());
    watchers & kind.bit() == 0
  }

  /// Returns true when `kind` was started.
  pub(crate) fn remove_watcher(&self, kind: EventKind) -> bool {
    let watchers = self.watchers.get();
    self.watchers.set(watchers & !kind.bit());
    watchers & kind.bit() != 0
  }

  pub(crate) fn has_watchers(&self) -> bool {
    self.watchers.get() != 0
  }

  pub(crate) fn watching(&self) -> Vec<EventKind> {
    (0..u32::BITS as usize)
      .filter(|index| self.watchers.get() & (1 << index) != 0)
      .filter_map(EventKind::from_index)
      .collect()
  }

  pub(crate) fn native(&self) -> Ref<'_, NativeHandle> {
    self.native.borrow()
  }

  pub(crate) fn set_native(&self, native: NativeHandle) {
    let previous = self.native.replace(native);
    drop(previous);
  }

  /// Releases the native resource and every callback slot. A second call
  /// changes nothing and reports `DoubleTeardown`.
  pub(crate) fn teardown(&self) -> Result<(), BridgeError> {
    let previous =
      std::mem::replace(&mut *self.phase.borrow_mut(), Phase::Destroyed);
    let Phase::Live { slots, .. } = previous else {
      return Err(BridgeError::DoubleTeardown);
    };
    let native = std::mem::take(&mut *self.native.borrow_mut());
    self.watchers.set(0);
    self.rid.set(0);
    drop(slots);
    drop(native);
    Ok(())
  }
}

impl fmt::Debug for HandleRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandleRecord")
      .field("rid", &self.rid())
      .field("kind", &self.kind)
      .field("state", &self.state())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record() -> HandleRecord {
    HandleRecord::new(
      HandleKind::Timer,
      NativeHandle::Timer,
      ExecutionContext::new("test"),
    )
  }

  #[test]
  fn lifecycle() {
    let record = record();
    record.set_rid(7);
    assert_eq!(record.state(), HandleState::Created);
    record.mark_active();
    assert_eq!(record.state(), HandleState::Active);
    record.mark_closing().unwrap();
    assert_eq!(record.state(), HandleState::Closing);
    assert!(matches!(
      record.mark_closing(),
      Err(BridgeError::InvalidHandleState {
        rid: 7,
        state: HandleState::Closing
      })
    ));
    record.teardown().unwrap();
    assert_eq!(record.state(), HandleState::Destroyed);
    assert_eq!(record.rid(), 0);
  }

  #[test]
  fn teardown_runs_once() {
    let record = record();
    record
      .set_callback(
        EventKind::Timer,
        Some(HostCallback::new(|_, _| {})),
        ExecutionContext::new("cb"),
      )
      .unwrap();
    record.teardown().unwrap();
    assert!(matches!(record.teardown(), Err(BridgeError::DoubleTeardown)));
    assert!(record.callback(EventKind::Timer).is_none());
    assert!(record.registered_events().is_empty());
    assert!(
      record
        .set_callback(EventKind::Timer, None, ExecutionContext::new("x"))
        .is_err()
    );
  }

  #[test]
  fn watcher_bits() {
    let record = record();
    assert!(record.add_watcher(EventKind::Timer));
    assert!(!record.add_watcher(EventKind::Timer));
    assert!(record.add_watcher(EventKind::Read));
    assert_eq!(record.watching(), vec![EventKind::Read, EventKind::Timer]);
    assert!(record.remove_watcher(EventKind::Timer));
    assert!(!record.remove_watcher(EventKind::Timer));
    assert!(record.is_watching(EventKind::Read));
    assert!(record.has_watchers());
  }
}
