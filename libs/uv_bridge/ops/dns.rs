// Copyright 2018-2026 the Deno authors. MIT license.

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::native::dns;
use crate::resources::ResourceId;

impl UvBridge {
  /// Resolves `node`. The callback gets `(status, addresses)` with IPv4
  /// addresses listed before IPv6 ones. `service` must be a port number.
  pub fn getaddrinfo(
    &self,
    node: &str,
    service: Option<&str>,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let port = match service {
      Some(service) => service
        .parse::<u16>()
        .map_err(|_| BridgeError::InvalidArgument("service"))?,
      None => 0,
    };
    if node.is_empty() {
      return Err(BridgeError::InvalidArgument("node"));
    }
    let rid = self.register(HandleKind::GetAddrInfo, NativeHandle::Request);
    let record = self.lookup(rid)?;
    self.set_slot(&record, EventKind::GetAddrInfo, callback)?;
    self.uv.begin_request();
    dns::getaddrinfo(&self.uv, rid, node.to_string(), port);
    record.mark_active();
    Ok(rid)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use crate::bridge::UvBridge;
  use crate::callback::HostCallback;
  use crate::error::BridgeError;
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;
  use crate::value::HostValue;

  #[test]
  fn numeric_host_resolves_to_itself() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let result = Rc::new(RefCell::new(Vec::new()));
    let sink = result.clone();
    bridge
      .getaddrinfo(
        "127.0.0.1",
        Some("80"),
        Some(HostCallback::new(move |_, args| {
          sink.borrow_mut().extend_from_slice(args)
        })),
      )
      .unwrap();
    bridge.run(RunMode::Default);
    assert_eq!(
      *result.borrow(),
      vec![
        HostValue::Int(0),
        HostValue::List(vec![HostValue::from("127.0.0.1")])
      ]
    );
    assert_eq!(bridge.resource_count(), 0);
  }

  #[test]
  fn service_must_be_numeric() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    assert!(matches!(
      bridge.getaddrinfo("localhost", Some("http"), None),
      Err(BridgeError::InvalidArgument("service"))
    ));
    assert_eq!(bridge.resource_count(), 0);
  }
}
