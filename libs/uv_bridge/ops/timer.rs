// Copyright 2018-2026 the Deno authors. MIT license.

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::resources::ResourceId;

impl UvBridge {
  /// Fires `callback` after `timeout` ms, then every `repeat` ms when
  /// `repeat` is non-zero. Starting a started timer re-arms it.
  pub fn timer_start(
    &self,
    rid: ResourceId,
    timeout: u64,
    repeat: u64,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Timer, "timer_start")?;
    self.set_slot(&record, EventKind::Timer, callback)?;
    self.uv.timer_start(rid, timeout, repeat);
    self.watch(&record, EventKind::Timer)
  }

  pub fn timer_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::Timer, "timer_stop")?;
    self.uv.timer_stop(rid);
    self.unwatch(&record, EventKind::Timer);
    Ok(())
  }

  /// Restarts the timer with its repeat value as timeout. Does nothing for a
  /// timer whose repeat is 0.
  pub fn timer_again(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Timer, "timer_again")?;
    if record.callback(EventKind::Timer).is_none()
      && !record.is_watching(EventKind::Timer)
    {
      return Err(BridgeError::InvalidArgument("timer was never started"));
    }
    self
      .uv
      .timer_again(rid)
      .map_err(|code| BridgeError::setup("timer_again", code))?;
    if self.uv.timer_is_pending(rid) {
      self.watch(&record, EventKind::Timer)?;
    }
    Ok(())
  }

  pub fn timer_set_repeat(
    &self,
    rid: ResourceId,
    repeat: u64,
  ) -> Result<(), BridgeError> {
    self.lookup_kind(rid, HandleKind::Timer, "timer_set_repeat")?;
    self.uv.timer_set_repeat(rid, repeat);
    Ok(())
  }

  pub fn timer_get_repeat(&self, rid: ResourceId) -> Result<u64, BridgeError> {
    self.lookup_kind(rid, HandleKind::Timer, "timer_get_repeat")?;
    Ok(self.uv.timer_get_repeat(rid))
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use pretty_assertions::assert_eq;

  use crate::bridge::UvBridge;
  use crate::callback::HostCallback;
  use crate::error::BridgeError;
  use crate::handle::HandleKind;
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;
  use crate::value::HostValue;

  #[test]
  fn repeating_timer_stops_from_its_callback() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Timer).unwrap();
    let fired = Rc::new(RefCell::new(0));
    let counter = fired.clone();
    bridge
      .timer_start(
        rid,
        0,
        1,
        Some(HostCallback::new(move |bridge, args| {
          assert_eq!(args[1], HostValue::Int(0));
          *counter.borrow_mut() += 1;
          if *counter.borrow() == 3 {
            bridge.timer_stop(rid).unwrap();
          }
        })),
      )
      .unwrap();
    assert_eq!(bridge.refcount(rid), Some(2));
    bridge.run(RunMode::Default);
    assert_eq!(*fired.borrow(), 3);
    assert_eq!(bridge.refcount(rid), Some(1));
    assert!(!bridge.is_active(rid));
  }

  #[test]
  fn repeat_is_reported() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Timer).unwrap();
    assert!(matches!(
      bridge.timer_again(rid),
      Err(BridgeError::InvalidArgument(_))
    ));
    bridge.timer_set_repeat(rid, 25).unwrap();
    assert_eq!(bridge.timer_get_repeat(rid).unwrap(), 25);
    bridge.timer_stop(rid).unwrap();
    bridge.timer_stop(rid).unwrap();
    assert_eq!(bridge.refcount(rid), Some(1));
  }

  #[test]
  fn timer_ops_reject_other_kinds() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Idle).unwrap();
    assert!(matches!(
      bridge.timer_start(rid, 1, 0, None),
      Err(BridgeError::Unsupported {
        kind: HandleKind::Idle,
        ..
      })
    ));
  }
}
