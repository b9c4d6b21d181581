// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::RefCell;
use std::rc::Rc;

use uv_bridge::BridgeOptions;
use uv_bridge::HostCallback;
use uv_bridge::HostValue;
use uv_bridge::UvBridge;

pub fn bridge() -> UvBridge {
  let _ = env_logger::builder().is_test(true).try_init();
  UvBridge::new(BridgeOptions::default()).unwrap()
}

/// Every argument list a callback was invoked with, in order.
#[derive(Clone, Default)]
pub struct Calls(Rc<RefCell<Vec<Vec<HostValue>>>>);

impl Calls {
  pub fn callback(&self) -> HostCallback {
    let calls = self.0.clone();
    HostCallback::new(move |_, args| calls.borrow_mut().push(args.to_vec()))
  }

  pub fn take(&self) -> Vec<Vec<HostValue>> {
    std::mem::take(&mut *self.0.borrow_mut())
  }

  pub fn len(&self) -> usize {
    self.0.borrow().len()
  }
}
