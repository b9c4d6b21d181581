// Copyright 2018-2026 the Deno authors. MIT license.

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::resources::ResourceId;
use crate::uv::WatchPhase;

fn phase_of(kind: HandleKind) -> (WatchPhase, EventKind) {
  match kind {
    HandleKind::Prepare => (WatchPhase::Prepare, EventKind::Prepare),
    HandleKind::Check => (WatchPhase::Check, EventKind::Check),
    _ => (WatchPhase::Idle, EventKind::Idle),
  }
}

impl UvBridge {
  fn watcher_start(
    &self,
    rid: ResourceId,
    kind: HandleKind,
    op: &'static str,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, kind, op)?;
    let (phase, event) = phase_of(kind);
    self.set_slot(&record, event, callback)?;
    self.uv.watch(rid, phase);
    self.watch(&record, event)
  }

  fn watcher_stop(
    &self,
    rid: ResourceId,
    kind: HandleKind,
    op: &'static str,
  ) -> Result<(), BridgeError> {
    let record = self.lookup_kind(rid, kind, op)?;
    let (phase, event) = phase_of(kind);
    self.uv.unwatch(rid, phase);
    self.unwatch(&record, event);
    Ok(())
  }

  /// Runs `callback` once per loop iteration, before I/O polling. An
  /// active idle handle makes the poll phase non-blocking.
  pub fn idle_start(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    self.watcher_start(rid, HandleKind::Idle, "idle_start", callback)
  }

  pub fn idle_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.watcher_stop(rid, HandleKind::Idle, "idle_stop")
  }

  pub fn prepare_start(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    self.watcher_start(rid, HandleKind::Prepare, "prepare_start", callback)
  }

  pub fn prepare_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.watcher_stop(rid, HandleKind::Prepare, "prepare_stop")
  }

  pub fn check_start(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    self.watcher_start(rid, HandleKind::Check, "check_start", callback)
  }

  pub fn check_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.watcher_stop(rid, HandleKind::Check, "check_stop")
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use pretty_assertions::assert_eq;

  use crate::bridge::UvBridge;
  use crate::callback::HostCallback;
  use crate::handle::HandleKind;
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;

  #[test]
  fn idle_runs_until_stopped() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let idle = bridge.create(HandleKind::Idle).unwrap();
    let check = bridge.create(HandleKind::Check).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));

    let seen = order.clone();
    bridge
      .check_start(
        check,
        Some(HostCallback::new(move |_, _| seen.borrow_mut().push("check"))),
      )
      .unwrap();
    let seen = order.clone();
    bridge
      .idle_start(
        idle,
        Some(HostCallback::new(move |bridge, _| {
          seen.borrow_mut().push("idle");
          if seen.borrow().len() >= 3 {
            bridge.idle_stop(idle).unwrap();
            bridge.check_stop(check).unwrap();
          }
        })),
      )
      .unwrap();
    bridge.run(RunMode::Default);
    assert_eq!(*order.borrow(), vec!["idle", "check", "idle"]);
    assert_eq!(bridge.refcount(idle), Some(1));
    assert_eq!(bridge.refcount(check), Some(1));
    bridge.idle_stop(idle).unwrap();
  }
}
