// Copyright 2018-2026 the Deno authors. MIT license.

use std::fmt;
use std::rc::Rc;

use strum::EnumCount;

use crate::bridge::UvBridge;
use crate::context::ExecutionContext;
use crate::value::HostValue;

/// The asynchronous events a host can subscribe to on a handle. Each kind
/// owns one callback slot per record.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  strum::EnumCount,
  strum::IntoStaticStr,
  strum::Display,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum EventKind {
  Connect,
  Write,
  Send,
  Shutdown,
  Listen,
  Read,
  Recv,
  Close,
  Timer,
  Idle,
  Prepare,
  Check,
  Async,
  Poll,
  FsEvent,
  FsPoll,
  Fs,
  GetAddrInfo,
  Exit,
  AfterWork,
}

impl EventKind {
  /// Persistent events fire repeatedly until stopped and hold one extra
  /// reference on the record while started.
  pub fn is_persistent(self) -> bool {
    matches!(
      self,
      EventKind::Listen
        | EventKind::Read
        | EventKind::Recv
        | EventKind::Timer
        | EventKind::Idle
        | EventKind::Prepare
        | EventKind::Check
        | EventKind::Async
        | EventKind::Poll
        | EventKind::FsEvent
        | EventKind::FsPoll
        | EventKind::Exit
    )
  }

  pub(crate) fn bit(self) -> u32 {
    1 << (self as u8)
  }

  pub(crate) fn from_index(index: usize) -> Option<EventKind> {
    ALL_EVENTS.get(index).copied()
  }
}

const ALL_EVENTS: [EventKind; EventKind::COUNT] = [
  EventKind::Connect,
  EventKind::Write,
  EventKind::Send,
  EventKind::Shutdown,
  EventKind::Listen,
  EventKind::Read,
  EventKind::Recv,
  EventKind::Close,
  EventKind::Timer,
  EventKind::Idle,
  EventKind::Prepare,
  EventKind::Check,
  EventKind::Async,
  EventKind::Poll,
  EventKind::FsEvent,
  EventKind::FsPoll,
  EventKind::Fs,
  EventKind::GetAddrInfo,
  EventKind::Exit,
  EventKind::AfterWork,
];

type HostFn = dyn Fn(&UvBridge, &[HostValue]);

/// A host closure. Invoked with the bridge so it can issue further operations
/// (including closing the handle it was called for).
#[derive(Clone)]
pub struct HostCallback(Rc<HostFn>);

impl HostCallback {
  pub fn new(f: impl Fn(&UvBridge, &[HostValue]) + 'static) -> Self {
    Self(Rc::new(f))
  }

  pub(crate) fn call(&self, bridge: &UvBridge, args: &[HostValue]) {
    (self.0)(bridge, args)
  }
}

impl fmt::Debug for HostCallback {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("HostCallback")
  }
}

#[derive(Debug, Clone)]
pub struct CallbackSlot {
  pub callback: HostCallback,
  pub context: ExecutionContext,
}

pub(crate) struct CallbackSlots {
  slots: [Option<CallbackSlot>; EventKind::COUNT],
}

impl CallbackSlots {
  pub fn new() -> Self {
    Self {
      slots: std::array::from_fn(|_| None),
    }
  }

  /// Stores `slot` for `kind`, handing back whatever it replaced so the
  /// caller can drop it outside of any borrow.
  pub fn set(
    &mut self,
    kind: EventKind,
    slot: Option<CallbackSlot>,
  ) -> Option<CallbackSlot> {
    std::mem::replace(&mut self.slots[kind as usize], slot)
  }

  pub fn get(&self, kind: EventKind) -> Option<CallbackSlot> {
    self.slots[kind as usize].clone()
  }

  pub fn registered(&self) -> Vec<EventKind> {
    self
      .slots
      .iter()
      .enumerate()
      .filter(|(_, slot)| slot.is_some())
      .filter_map(|(index, _)| EventKind::from_index(index))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;

  fn slot(context: &ExecutionContext) -> CallbackSlot {
    CallbackSlot {
      callback: HostCallback::new(|_, _| {}),
      context: context.clone(),
    }
  }

  #[test]
  fn event_table_matches_discriminants() {
    for (index, kind) in ALL_EVENTS.iter().enumerate() {
      assert_eq!(*kind as usize, index);
    }
    assert_eq!(EventKind::GetAddrInfo.to_string(), "get_addr_info");
  }

  #[test]
  fn set_replaces_previous() {
    let context = ExecutionContext::new("test");
    let mut slots = CallbackSlots::new();
    assert!(slots.set(EventKind::Read, Some(slot(&context))).is_none());
    assert!(slots.set(EventKind::Read, Some(slot(&context))).is_some());
    assert_eq!(slots.registered(), vec![EventKind::Read]);
    assert!(slots.set(EventKind::Read, None).is_some());
    assert!(slots.get(EventKind::Read).is_none());
  }

  #[test]
  fn replaced_closure_is_dropped_by_caller() {
    let dropped = Rc::new(Cell::new(false));
    struct Flag(Rc<Cell<bool>>);
    impl Drop for Flag {
      fn drop(&mut self) {
        self.0.set(true);
      }
    }
    let context = ExecutionContext::new("test");
    let flag = Flag(dropped.clone());
    let mut slots = CallbackSlots::new();
    slots.set(
      EventKind::Timer,
      Some(CallbackSlot {
        callback: HostCallback::new(move |_, _| {
          let _ = &flag;
        }),
        context: context.clone(),
      }),
    );
    let previous = slots.set(EventKind::Timer, None);
    assert!(!dropped.get());
    drop(previous);
    assert!(dropped.get());
  }
}
