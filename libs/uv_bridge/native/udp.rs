// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::Cell;
use std::cell::RefCell;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::net::SocketAddr;
use std::rc::Rc;

use bytes::Bytes;
use socket2::Domain;
use socket2::Protocol;
use socket2::Socket;
use socket2::Type;
use tokio::net::UdpSocket;

use crate::errno;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::CompletionSink;
use crate::uv::TaskKind;
use crate::uv::UvLoop;

pub const UDP_IPV6ONLY: u32 = 1;
pub const UDP_REUSEADDR: u32 = 4;

pub const UDP_LEAVE_GROUP: i32 = 0;
pub const UDP_JOIN_GROUP: i32 = 1;

#[derive(Clone)]
pub(crate) struct UdpHandle(Rc<UdpInner>);

struct UdpInner {
  socket: RefCell<Option<Rc<UdpSocket>>>,
  // Sends in flight, so close can fail each of them exactly once.
  sending: Cell<usize>,
}

fn io_code(err: std::io::Error) -> i32 {
  errno::from_io_error(&err)
}

impl UdpHandle {
  pub fn new() -> Self {
    Self(Rc::new(UdpInner {
      socket: RefCell::new(None),
      sending: Cell::new(0),
    }))
  }

  fn socket(&self) -> Result<Rc<UdpSocket>, i32> {
    self.0.socket.borrow().clone().ok_or(errno::UV_EBADF)
  }

  pub fn bind(
    &self,
    uv: &UvLoop,
    addr: SocketAddr,
    flags: u32,
  ) -> Result<(), i32> {
    if self.0.socket.borrow().is_some() {
      return Err(errno::UV_EINVAL);
    }
    let socket =
      Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(io_code)?;
    if flags & UDP_REUSEADDR != 0 {
      socket.set_reuse_address(true).map_err(io_code)?;
    }
    if addr.is_ipv6() {
      socket
        .set_only_v6(flags & UDP_IPV6ONLY != 0)
        .map_err(io_code)?;
    }
    socket.set_nonblocking(true).map_err(io_code)?;
    socket.bind(&addr.into()).map_err(io_code)?;
    let socket = {
      let _guard = uv.enter();
      UdpSocket::from_std(socket.into()).map_err(io_code)?
    };
    *self.0.socket.borrow_mut() = Some(Rc::new(socket));
    Ok(())
  }

  // An unbound socket is bound to the wildcard address on first send, the
  // way libuv does it.
  fn ensure_bound(&self, uv: &UvLoop, peer: SocketAddr) -> Result<(), i32> {
    if self.0.socket.borrow().is_some() {
      return Ok(());
    }
    let any: IpAddr = if peer.is_ipv4() {
      Ipv4Addr::UNSPECIFIED.into()
    } else {
      Ipv6Addr::UNSPECIFIED.into()
    };
    self.bind(uv, SocketAddr::new(any, 0), 0)
  }

  pub fn send(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    data: Bytes,
    addr: SocketAddr,
  ) -> Result<(), i32> {
    self.ensure_bound(uv, addr)?;
    let socket = self.socket()?;
    self.0.sending.set(self.0.sending.get() + 1);
    let udp = self.clone();
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Request, async move {
      let status = match socket.send_to(&data, addr).await {
        Ok(_) => 0,
        Err(err) => errno::from_io_error(&err),
      };
      udp.0.sending.set(udp.0.sending.get().saturating_sub(1));
      sink.post(Completion::Send { rid, status });
    });
    Ok(())
  }

  pub fn recv_start(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    buffer_size: usize,
  ) -> Result<(), i32> {
    let socket = self.socket()?;
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Recv, async move {
      let mut buf = vec![0u8; buffer_size.max(1)];
      loop {
        match socket.recv_from(&mut buf).await {
          Ok((n, addr)) => sink.post(Completion::Recv {
            rid,
            nread: n as isize,
            buf: (n > 0).then(|| Bytes::copy_from_slice(&buf[..n])),
            addr: Some(addr),
          }),
          Err(err) => {
            sink.post(Completion::Recv {
              rid,
              nread: errno::from_io_error(&err) as isize,
              buf: None,
              addr: None,
            });
            break;
          }
        }
      }
    });
    Ok(())
  }

  pub fn recv_stop(&self, uv: &UvLoop, rid: ResourceId) {
    uv.abort(rid, TaskKind::Recv);
  }

  pub fn cancel_pending(&self, rid: ResourceId, sink: &CompletionSink) {
    for _ in 0..self.0.sending.replace(0) {
      sink.post(Completion::Send {
        rid,
        status: errno::UV_ECANCELED,
      });
    }
  }

  pub fn local_addr(&self) -> Result<SocketAddr, i32> {
    self.socket()?.local_addr().map_err(io_code)
  }

  pub fn set_broadcast(&self, enable: bool) -> Result<(), i32> {
    self.socket()?.set_broadcast(enable).map_err(io_code)
  }

  pub fn set_multicast_loop(&self, enable: bool) -> Result<(), i32> {
    let socket = self.socket()?;
    if socket.local_addr().map_err(io_code)?.is_ipv4() {
      socket.set_multicast_loop_v4(enable).map_err(io_code)
    } else {
      socket.set_multicast_loop_v6(enable).map_err(io_code)
    }
  }

  pub fn set_multicast_ttl(&self, ttl: u32) -> Result<(), i32> {
    if !(1..=255).contains(&ttl) {
      return Err(errno::UV_EINVAL);
    }
    self.socket()?.set_multicast_ttl_v4(ttl).map_err(io_code)
  }

  pub fn set_ttl(&self, ttl: u32) -> Result<(), i32> {
    if !(1..=255).contains(&ttl) {
      return Err(errno::UV_EINVAL);
    }
    self.socket()?.set_ttl(ttl).map_err(io_code)
  }

  pub fn set_membership(
    &self,
    multicast: IpAddr,
    interface: Option<IpAddr>,
    membership: i32,
  ) -> Result<(), i32> {
    let socket = self.socket()?;
    let join = match membership {
      UDP_JOIN_GROUP => true,
      UDP_LEAVE_GROUP => false,
      _ => return Err(errno::UV_EINVAL),
    };
    match (multicast, interface) {
      (IpAddr::V4(group), None) => {
        let any = Ipv4Addr::UNSPECIFIED;
        if join {
          socket.join_multicast_v4(group, any)
        } else {
          socket.leave_multicast_v4(group, any)
        }
      }
      (IpAddr::V4(group), Some(IpAddr::V4(iface))) => {
        if join {
          socket.join_multicast_v4(group, iface)
        } else {
          socket.leave_multicast_v4(group, iface)
        }
      }
      (IpAddr::V6(group), None) => {
        if join {
          socket.join_multicast_v6(&group, 0)
        } else {
          socket.leave_multicast_v6(&group, 0)
        }
      }
      _ => return Err(errno::UV_EINVAL),
    }
    .map_err(io_code)
  }
}
