// Copyright 2018-2026 the Deno authors. MIT license.

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::resources::ResourceId;
use crate::uv::AsyncSender;

impl UvBridge {
  /// Creates an async handle. It is active right away and keeps the loop
  /// alive until closed or unreferenced.
  pub fn async_init(
    &self,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let rid = self.register(HandleKind::Async, NativeHandle::Released);
    let record = self.lookup(rid)?;
    record.set_native(NativeHandle::Async(self.uv.async_sender(rid)));
    self.set_slot(&record, EventKind::Async, callback)?;
    self.watch(&record, EventKind::Async)?;
    Ok(rid)
  }

  /// A sender that can be moved to another thread.
  pub fn async_sender(
    &self,
    rid: ResourceId,
  ) -> Result<AsyncSender, BridgeError> {
    let record = self.open_kind(rid, HandleKind::Async, "async_sender")?;
    match &*record.native() {
      NativeHandle::Async(sender) => Ok(sender.clone()),
      _ => Err(BridgeError::InvalidHandleState {
        rid,
        state: record.state(),
      }),
    }
  }

  pub fn async_send(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.async_sender(rid)?.send();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;
  use std::rc::Rc;

  use crate::bridge::UvBridge;
  use crate::callback::HostCallback;
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;

  #[test]
  fn send_from_another_thread() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let rid = bridge
      .async_init(Some(HostCallback::new(move |bridge, args| {
        counter.set(counter.get() + 1);
        let rid = args[0].as_handle().unwrap();
        bridge.close(rid, None).unwrap();
      })))
      .unwrap();
    let sender = bridge.async_sender(rid).unwrap();
    std::thread::spawn(move || {
      sender.send();
      sender.send();
    })
    .join()
    .unwrap();
    bridge.run(RunMode::Default);
    assert_eq!(calls.get(), 1);
    assert!(bridge.lookup(rid).is_err());
    assert!(bridge.async_send(rid).is_err());
  }
}
