// Copyright 2018-2026 the Deno authors. MIT license.

//! A single-threaded event loop with libuv's phase structure.
//!
//! Every iteration runs, in order: due timers, pending completions, idle
//! watchers, prepare watchers, the poll phase, check watchers and finally
//! close callbacks. I/O is driven by a current-thread tokio runtime plus a
//! `LocalSet`; tasks never call into the host directly. They push a
//! [`Completion`] onto the pending queue and wake the poll phase, and the loop
//! hands completions to the dispatcher outside of any task context.

mod completion;

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

pub use completion::Completion;
pub use completion::FsPayload;
use parking_lot::Mutex;
use tokio::runtime::EnterGuard;
use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tokio::task::LocalSet;

use crate::resources::ResourceId;

const HANDLE_ACTIVE: u32 = 1 << 0;
const HANDLE_REF: u32 = 1 << 1;
const HANDLE_CLOSING: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  /// Run until no active and referenced handles or requests remain.
  Default,
  /// Poll for I/O once, blocking if nothing is pending.
  Once,
  /// Poll for I/O once without blocking.
  NoWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerKey {
  deadline_ms: u64,
  seq: u64,
  rid: ResourceId,
}

struct TimerState {
  key: Option<TimerKey>,
  repeat: u64,
}

/// Background tasks owned by a handle. Starting an exclusive kind again
/// replaces the running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
  Read,
  Write,
  Connect,
  Listen,
  Recv,
  Request,
  Poll,
  FsEvent,
  FsPoll,
  Exit,
}

impl TaskKind {
  fn is_exclusive(self) -> bool {
    !matches!(self, TaskKind::Request)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchPhase {
  Idle,
  Prepare,
  Check,
}

struct LoopShared {
  pending: RefCell<VecDeque<Completion>>,
  wake: Arc<Notify>,
}

/// Lets loop tasks queue completions and wake the poll phase.
#[derive(Clone)]
pub(crate) struct CompletionSink(Rc<LoopShared>);

impl CompletionSink {
  pub fn post(&self, completion: Completion) {
    self.0.pending.borrow_mut().push_back(completion);
    self.0.wake.notify_one();
  }
}

struct AsyncShared {
  pending: Mutex<Vec<ResourceId>>,
  wake: Arc<Notify>,
}

/// Wakes an async handle from any thread. Sends that happen before the loop
/// gets to run the handle's callback are coalesced into one invocation.
#[derive(Clone)]
pub struct AsyncSender {
  rid: ResourceId,
  shared: Arc<AsyncShared>,
}

impl AsyncSender {
  pub fn rid(&self) -> ResourceId {
    self.rid
  }

  pub fn send(&self) {
    {
      let mut pending = self.shared.pending.lock();
      if !pending.contains(&self.rid) {
        pending.push(self.rid);
      }
    }
    self.shared.wake.notify_one();
  }
}

pub struct UvLoop {
  // Dropped before the runtime so local tasks release their I/O first.
  local: LocalSet,
  runtime: Runtime,
  shared: Rc<LoopShared>,
  async_shared: Arc<AsyncShared>,
  time_origin: Instant,
  now_ms: Cell<u64>,
  timers: RefCell<BTreeSet<TimerKey>>,
  timer_states: RefCell<HashMap<ResourceId, TimerState>>,
  timer_seq: Cell<u64>,
  idle: RefCell<Vec<ResourceId>>,
  prepare: RefCell<Vec<ResourceId>>,
  check: RefCell<Vec<ResourceId>>,
  flags: RefCell<HashMap<ResourceId, u32>>,
  closing: RefCell<VecDeque<ResourceId>>,
  tasks: RefCell<HashMap<ResourceId, Vec<(TaskKind, AbortHandle)>>>,
  inflight: Cell<usize>,
  stop_flag: Cell<bool>,
}

impl UvLoop {
  pub fn new(threadpool_size: usize) -> io::Result<Self> {
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .max_blocking_threads(threadpool_size.max(1))
      .thread_name("uv-worker")
      .build()?;
    let wake = Arc::new(Notify::new());
    Ok(Self {
      local: LocalSet::new(),
      runtime,
      shared: Rc::new(LoopShared {
        pending: RefCell::new(VecDeque::new()),
        wake: wake.clone(),
      }),
      async_shared: Arc::new(AsyncShared {
        pending: Mutex::new(Vec::new()),
        wake,
      }),
      time_origin: Instant::now(),
      now_ms: Cell::new(0),
      timers: RefCell::new(BTreeSet::new()),
      timer_states: RefCell::new(HashMap::new()),
      timer_seq: Cell::new(0),
      idle: RefCell::new(Vec::new()),
      prepare: RefCell::new(Vec::new()),
      check: RefCell::new(Vec::new()),
      flags: RefCell::new(HashMap::new()),
      closing: RefCell::new(VecDeque::new()),
      tasks: RefCell::new(HashMap::new()),
      inflight: Cell::new(0),
      stop_flag: Cell::new(false),
    })
  }

  pub(crate) fn sink(&self) -> CompletionSink {
    CompletionSink(self.shared.clone())
  }

  pub(crate) fn post(&self, completion: Completion) {
    self.sink().post(completion);
  }

  pub(crate) fn async_sender(&self, rid: ResourceId) -> AsyncSender {
    AsyncSender {
      rid,
      shared: self.async_shared.clone(),
    }
  }

  /// Enters the runtime context, needed to register sockets with the reactor.
  pub(crate) fn enter(&self) -> EnterGuard<'_> {
    self.runtime.enter()
  }

  pub(crate) fn spawn(
    &self,
    rid: ResourceId,
    kind: TaskKind,
    task: impl Future<Output = ()> + 'static,
  ) {
    let abort = self.local.spawn_local(task).abort_handle();
    let mut tasks = self.tasks.borrow_mut();
    let list = tasks.entry(rid).or_default();
    list.retain(|(k, handle)| {
      if kind.is_exclusive() && *k == kind {
        handle.abort();
        return false;
      }
      !handle.is_finished()
    });
    list.push((kind, abort));
  }

  pub(crate) fn abort(&self, rid: ResourceId, kind: TaskKind) {
    if let Some(list) = self.tasks.borrow_mut().get_mut(&rid) {
      list.retain(|(k, handle)| {
        if *k == kind {
          handle.abort();
          return false;
        }
        true
      });
    }
  }

  fn abort_all(&self, rid: ResourceId) {
    let list = self.tasks.borrow_mut().remove(&rid);
    for (_, handle) in list.into_iter().flatten() {
      handle.abort();
    }
  }

  /// Cached loop time in milliseconds, refreshed at the start of every
  /// iteration.
  pub fn now(&self) -> u64 {
    self.now_ms.get()
  }

  pub fn update_time(&self) {
    self.now_ms.set(self.time_origin.elapsed().as_millis() as u64);
  }

  pub(crate) fn init_handle(&self, rid: ResourceId) {
    self.flags.borrow_mut().insert(rid, HANDLE_REF);
  }

  fn update_flags(&self, rid: ResourceId, set: u32, clear: u32) {
    if let Some(flags) = self.flags.borrow_mut().get_mut(&rid) {
      *flags = (*flags | set) & !clear;
    }
  }

  fn has_flag(&self, rid: ResourceId, flag: u32) -> bool {
    self
      .flags
      .borrow()
      .get(&rid)
      .is_some_and(|flags| flags & flag != 0)
  }

  pub(crate) fn set_active(&self, rid: ResourceId, active: bool) {
    if active {
      self.update_flags(rid, HANDLE_ACTIVE, 0);
    } else {
      self.update_flags(rid, 0, HANDLE_ACTIVE);
    }
  }

  pub fn is_active(&self, rid: ResourceId) -> bool {
    self.has_flag(rid, HANDLE_ACTIVE)
  }

  pub fn is_closing(&self, rid: ResourceId) -> bool {
    self.has_flag(rid, HANDLE_CLOSING)
  }

  pub(crate) fn ref_handle(&self, rid: ResourceId) {
    self.update_flags(rid, HANDLE_REF, 0);
  }

  pub(crate) fn unref_handle(&self, rid: ResourceId) {
    self.update_flags(rid, 0, HANDLE_REF);
  }

  pub fn has_ref(&self, rid: ResourceId) -> bool {
    self.has_flag(rid, HANDLE_REF)
  }

  /// Marks one more request in flight. The counter drops when the request's
  /// completion is dispatched.
  pub(crate) fn begin_request(&self) {
    self.inflight.set(self.inflight.get() + 1);
  }

  pub(crate) fn timer_start(&self, rid: ResourceId, timeout: u64, repeat: u64) {
    self.timer_stop(rid);
    let seq = self.timer_seq.get();
    self.timer_seq.set(seq + 1);
    let key = TimerKey {
      deadline_ms: self.now().saturating_add(timeout),
      seq,
      rid,
    };
    self.timers.borrow_mut().insert(key);
    self.timer_states.borrow_mut().insert(
      rid,
      TimerState {
        key: Some(key),
        repeat,
      },
    );
  }

  pub(crate) fn timer_stop(&self, rid: ResourceId) {
    let key = self
      .timer_states
      .borrow_mut()
      .get_mut(&rid)
      .and_then(|state| state.key.take());
    if let Some(key) = key {
      self.timers.borrow_mut().remove(&key);
    }
  }

  /// Restarts a timer using its repeat value as the timeout. A timer without
  /// a repeat value is left alone.
  pub(crate) fn timer_again(&self, rid: ResourceId) -> Result<(), i32> {
    let repeat = self
      .timer_states
      .borrow()
      .get(&rid)
      .map(|state| state.repeat)
      .ok_or(crate::errno::UV_EINVAL)?;
    if repeat > 0 {
      self.timer_start(rid, repeat, repeat);
    }
    Ok(())
  }

  pub(crate) fn timer_set_repeat(&self, rid: ResourceId, repeat: u64) {
    self
      .timer_states
      .borrow_mut()
      .entry(rid)
      .or_insert(TimerState { key: None, repeat })
      .repeat = repeat;
  }

  pub(crate) fn timer_get_repeat(&self, rid: ResourceId) -> u64 {
    self
      .timer_states
      .borrow()
      .get(&rid)
      .map(|state| state.repeat)
      .unwrap_or(0)
  }

  pub(crate) fn timer_is_pending(&self, rid: ResourceId) -> bool {
    self
      .timer_states
      .borrow()
      .get(&rid)
      .is_some_and(|state| state.key.is_some())
  }

  fn watch_list(&self, phase: WatchPhase) -> &RefCell<Vec<ResourceId>> {
    match phase {
      WatchPhase::Idle => &self.idle,
      WatchPhase::Prepare => &self.prepare,
      WatchPhase::Check => &self.check,
    }
  }

  pub(crate) fn watch(&self, rid: ResourceId, phase: WatchPhase) {
    let mut list = self.watch_list(phase).borrow_mut();
    if !list.contains(&rid) {
      list.push(rid);
    }
  }

  pub(crate) fn unwatch(&self, rid: ResourceId, phase: WatchPhase) {
    self.watch_list(phase).borrow_mut().retain(|r| *r != rid);
  }

  /// Stops all native activity of `rid` and schedules its close completion
  /// for the close phase of the current or next iteration.
  pub(crate) fn close(&self, rid: ResourceId) {
    self.update_flags(rid, HANDLE_CLOSING, HANDLE_ACTIVE);
    self.timer_stop(rid);
    for phase in [WatchPhase::Idle, WatchPhase::Prepare, WatchPhase::Check] {
      self.unwatch(rid, phase);
    }
    self.abort_all(rid);
    self.closing.borrow_mut().push_back(rid);
  }

  /// Drops every trace of `rid` from the loop.
  pub(crate) fn forget(&self, rid: ResourceId) {
    self.timer_stop(rid);
    self.timer_states.borrow_mut().remove(&rid);
    for phase in [WatchPhase::Idle, WatchPhase::Prepare, WatchPhase::Check] {
      self.unwatch(rid, phase);
    }
    self.abort_all(rid);
    self.flags.borrow_mut().remove(&rid);
  }

  pub fn stop(&self) {
    self.stop_flag.set(true);
  }

  pub fn has_alive(&self) -> bool {
    let has_handles = self.flags.borrow().values().any(|flags| {
      flags & (HANDLE_ACTIVE | HANDLE_REF) == HANDLE_ACTIVE | HANDLE_REF
        && flags & HANDLE_CLOSING == 0
    });
    has_handles
      || self.inflight.get() > 0
      || !self.closing.borrow().is_empty()
      || !self.shared.pending.borrow().is_empty()
  }

  /// Runs the loop in `mode`, passing each completion to `dispatch`. Returns
  /// whether the loop is still alive.
  pub(crate) fn run(&self, mode: RunMode, dispatch: &dyn Fn(Completion)) -> bool {
    self.update_time();
    let mut alive = self.has_alive();
    while alive && !self.stop_flag.get() {
      self.update_time();
      self.run_timers(dispatch);
      self.run_pending(dispatch);
      self.run_watchers(WatchPhase::Idle, dispatch);
      self.run_watchers(WatchPhase::Prepare, dispatch);

      let timeout = match mode {
        RunMode::NoWait => Some(Duration::ZERO),
        _ => self.poll_timeout(),
      };
      self.poll_io(timeout);
      self.run_pending(dispatch);

      self.run_watchers(WatchPhase::Check, dispatch);
      self.run_closing(dispatch);

      if mode == RunMode::Once {
        self.update_time();
        self.run_timers(dispatch);
      }
      alive = self.has_alive();
      if mode != RunMode::Default {
        break;
      }
    }
    self.stop_flag.set(false);
    alive
  }

  fn run_timers(&self, dispatch: &dyn Fn(Completion)) {
    let now = self.now();
    loop {
      let key = match self.timers.borrow().first() {
        Some(key) if key.deadline_ms <= now => *key,
        _ => break,
      };
      self.timers.borrow_mut().remove(&key);
      let repeat = {
        let mut states = self.timer_states.borrow_mut();
        let Some(state) = states.get_mut(&key.rid) else {
          continue;
        };
        if state.key != Some(key) {
          continue;
        }
        state.key = None;
        state.repeat
      };
      if repeat > 0 {
        self.timer_start(key.rid, repeat, repeat);
      }
      dispatch(Completion::Timer { rid: key.rid });
    }
  }

  fn run_pending(&self, dispatch: &dyn Fn(Completion)) {
    loop {
      let next = self.shared.pending.borrow_mut().pop_front();
      let Some(completion) = next else {
        break;
      };
      if completion.is_request() {
        self.inflight.set(self.inflight.get().saturating_sub(1));
      }
      dispatch(completion);
    }
  }

  fn run_watchers(&self, phase: WatchPhase, dispatch: &dyn Fn(Completion)) {
    let snapshot = self.watch_list(phase).borrow().clone();
    for rid in snapshot {
      // A callback earlier in this pass may have stopped the watcher.
      if !self.watch_list(phase).borrow().contains(&rid) {
        continue;
      }
      dispatch(match phase {
        WatchPhase::Idle => Completion::Idle { rid },
        WatchPhase::Prepare => Completion::Prepare { rid },
        WatchPhase::Check => Completion::Check { rid },
      });
    }
  }

  fn run_closing(&self, dispatch: &dyn Fn(Completion)) {
    // Cancellations queued by close() must reach the host before the close
    // callback does.
    self.run_pending(dispatch);
    let closing: Vec<_> = self.closing.borrow_mut().drain(..).collect();
    for rid in closing {
      self.flags.borrow_mut().remove(&rid);
      dispatch(Completion::Close { rid });
    }
  }

  fn poll_timeout(&self) -> Option<Duration> {
    if self.stop_flag.get()
      || !self.idle.borrow().is_empty()
      || !self.shared.pending.borrow().is_empty()
      || !self.closing.borrow().is_empty()
      || !self.has_alive()
    {
      return Some(Duration::ZERO);
    }
    self.timers.borrow().first().map(|key| {
      Duration::from_millis(key.deadline_ms.saturating_sub(self.now()))
    })
  }

  fn poll_io(&self, timeout: Option<Duration>) {
    let shared = self.shared.clone();
    let async_shared = self.async_shared.clone();
    self.local.block_on(&self.runtime, async move {
      // Let ready tasks and the I/O driver make progress before parking.
      tokio::task::yield_now().await;
      if !shared.pending.borrow().is_empty()
        || !async_shared.pending.lock().is_empty()
      {
        return;
      }
      let notified = shared.wake.notified();
      match timeout {
        Some(timeout) => {
          let _ = tokio::time::timeout(timeout, notified).await;
        }
        None => notified.await,
      }
    });
    let woken = std::mem::take(&mut *self.async_shared.pending.lock());
    if !woken.is_empty() {
      let mut pending = self.shared.pending.borrow_mut();
      pending.extend(woken.into_iter().map(|rid| Completion::Async { rid }));
    }
  }
}
