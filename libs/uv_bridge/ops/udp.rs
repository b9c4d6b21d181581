// Copyright 2018-2026 the Deno authors. MIT license.

use std::net::IpAddr;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::udp::UdpHandle;
use crate::resources::ResourceId;

impl UvBridge {
  fn udp(
    &self,
    rid: ResourceId,
    op: &'static str,
  ) -> Result<UdpHandle, BridgeError> {
    let record = self.open_kind(rid, HandleKind::Udp, op)?;
    self.as_udp(&record, op)
  }

  /// Binds to `addr`. `flags` takes `UDP_IPV6ONLY` and `UDP_REUSEADDR`.
  pub fn udp_bind(
    &self,
    rid: ResourceId,
    addr: SocketAddr,
    flags: u32,
  ) -> Result<(), BridgeError> {
    self
      .udp(rid, "udp_bind")?
      .bind(&self.uv, addr, flags)
      .map_err(|code| BridgeError::setup("udp_bind", code))
  }

  /// Sends one datagram, binding to an ephemeral port first if needed.
  pub fn udp_send(
    &self,
    rid: ResourceId,
    data: Bytes,
    addr: SocketAddr,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Udp, "udp_send")?;
    self
      .as_udp(&record, "udp_send")?
      .send(&self.uv, rid, data, addr)
      .map_err(|code| BridgeError::setup("udp_send", code))?;
    self.begin_request(&record, EventKind::Send, callback)
  }

  pub fn udp_recv_start(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Udp, "udp_recv_start")?;
    let udp = self.as_udp(&record, "udp_recv_start")?;
    self.set_slot(&record, EventKind::Recv, callback)?;
    udp
      .recv_start(&self.uv, rid, self.options().read_buffer_size)
      .map_err(|code| BridgeError::setup("udp_recv_start", code))?;
    self.watch(&record, EventKind::Recv)
  }

  pub fn udp_recv_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::Udp, "udp_recv_stop")?;
    self
      .as_udp(&record, "udp_recv_stop")?
      .recv_stop(&self.uv, rid);
    self.unwatch(&record, EventKind::Recv);
    Ok(())
  }

  pub fn udp_getsockname(
    &self,
    rid: ResourceId,
  ) -> Result<SocketAddr, BridgeError> {
    self
      .udp(rid, "udp_getsockname")?
      .local_addr()
      .map_err(|code| BridgeError::setup("udp_getsockname", code))
  }

  pub fn udp_set_broadcast(
    &self,
    rid: ResourceId,
    enable: bool,
  ) -> Result<(), BridgeError> {
    self
      .udp(rid, "udp_set_broadcast")?
      .set_broadcast(enable)
      .map_err(|code| BridgeError::setup("udp_set_broadcast", code))
  }

  pub fn udp_set_multicast_loop(
    &self,
    rid: ResourceId,
    enable: bool,
  ) -> Result<(), BridgeError> {
    self
      .udp(rid, "udp_set_multicast_loop")?
      .set_multicast_loop(enable)
      .map_err(|code| BridgeError::setup("udp_set_multicast_loop", code))
  }

  pub fn udp_set_multicast_ttl(
    &self,
    rid: ResourceId,
    ttl: u32,
  ) -> Result<(), BridgeError> {
    self
      .udp(rid, "udp_set_multicast_ttl")?
      .set_multicast_ttl(ttl)
      .map_err(|code| BridgeError::setup("udp_set_multicast_ttl", code))
  }

  pub fn udp_set_ttl(
    &self,
    rid: ResourceId,
    ttl: u32,
  ) -> Result<(), BridgeError> {
    self
      .udp(rid, "udp_set_ttl")?
      .set_ttl(ttl)
      .map_err(|code| BridgeError::setup("udp_set_ttl", code))
  }

  /// Joins or leaves `multicast` (`UDP_JOIN_GROUP` / `UDP_LEAVE_GROUP`).
  pub fn udp_set_membership(
    &self,
    rid: ResourceId,
    multicast: IpAddr,
    interface: Option<IpAddr>,
    membership: i32,
  ) -> Result<(), BridgeError> {
    self
      .udp(rid, "udp_set_membership")?
      .set_membership(multicast, interface, membership)
      .map_err(|code| BridgeError::setup("udp_set_membership", code))
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use pretty_assertions::assert_eq;

  use crate::bridge::UvBridge;
  use crate::callback::HostCallback;
  use crate::errno;
  use crate::handle::HandleKind;
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;
  use crate::value::HostValue;

  #[test]
  fn datagram_over_loopback() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let server = bridge.create(HandleKind::Udp).unwrap();
    let client = bridge.create(HandleKind::Udp).unwrap();
    bridge
      .udp_bind(server, "127.0.0.1:0".parse().unwrap(), 0)
      .unwrap();
    let addr = bridge.udp_getsockname(server).unwrap();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    bridge
      .udp_recv_start(
        server,
        Some(HostCallback::new(move |bridge, args| {
          sink.borrow_mut().push(args.to_vec());
          bridge.close(server, None).unwrap();
        })),
      )
      .unwrap();
    let sent = Rc::new(RefCell::new(None));
    let status = sent.clone();
    bridge
      .udp_send(
        client,
        "ping".into(),
        addr,
        Some(HostCallback::new(move |bridge, args| {
          *status.borrow_mut() = args[1].as_int();
          bridge.close(client, None).unwrap();
        })),
      )
      .unwrap();
    bridge.run(RunMode::Default);

    assert_eq!(*sent.borrow(), Some(0));
    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0][1], HostValue::Int(4));
    assert_eq!(received[0][2].as_bytes().map(|b| &b[..]), Some(&b"ping"[..]));
    let from = received[0][3].as_map().unwrap();
    assert_eq!(from["family"], HostValue::from("IPv4"));
    assert_eq!(bridge.resource_count(), 0);
  }

  #[test]
  fn multicast_ttl_range() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Udp).unwrap();
    bridge
      .udp_bind(rid, "127.0.0.1:0".parse().unwrap(), 0)
      .unwrap();
    let err = bridge.udp_set_multicast_ttl(rid, 0).unwrap_err();
    assert_eq!(err.code(), Some(errno::UV_EINVAL));
    bridge.udp_set_multicast_ttl(rid, 4).unwrap();
  }
}
