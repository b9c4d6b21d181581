// Copyright 2018-2026 the Deno authors. MIT license.

use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::rc::Rc;

use bytes::Bytes;

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::handle::HandleRecord;
use crate::native::NativeHandle;
use crate::native::stream::StreamHandle;
use crate::resources::ResourceId;

impl UvBridge {
  fn open_stream(
    &self,
    rid: ResourceId,
    op: &'static str,
  ) -> Result<(Rc<HandleRecord>, StreamHandle), BridgeError> {
    let record = self.open(rid)?;
    let stream = self.as_stream(&record, op)?;
    Ok((record, stream))
  }

  fn tcp(
    &self,
    rid: ResourceId,
    op: &'static str,
  ) -> Result<StreamHandle, BridgeError> {
    let record = self.open_kind(rid, HandleKind::Tcp, op)?;
    self.as_stream(&record, op)
  }

  fn pipe(
    &self,
    rid: ResourceId,
    op: &'static str,
  ) -> Result<StreamHandle, BridgeError> {
    let record = self.open_kind(rid, HandleKind::Pipe, op)?;
    self.as_stream(&record, op)
  }

  /// Creates a pipe handle. `ipc` pipes may use `read2_start`.
  pub fn pipe_init(&self, ipc: bool) -> Result<ResourceId, BridgeError> {
    let stream = StreamHandle::new(HandleKind::Pipe, ipc);
    Ok(self.register(HandleKind::Pipe, NativeHandle::Stream(stream)))
  }

  pub fn tcp_bind(
    &self,
    rid: ResourceId,
    addr: SocketAddr,
  ) -> Result<(), BridgeError> {
    self
      .tcp(rid, "tcp_bind")?
      .tcp_bind(&self.uv, addr)
      .map_err(|code| BridgeError::setup("tcp_bind", code))
  }

  pub fn tcp_nodelay(
    &self,
    rid: ResourceId,
    enable: bool,
  ) -> Result<(), BridgeError> {
    self
      .tcp(rid, "tcp_nodelay")?
      .set_nodelay(enable)
      .map_err(|code| BridgeError::setup("tcp_nodelay", code))
  }

  /// `delay` is the idle time in seconds before the first probe.
  pub fn tcp_keepalive(
    &self,
    rid: ResourceId,
    enable: bool,
    delay: u32,
  ) -> Result<(), BridgeError> {
    self
      .tcp(rid, "tcp_keepalive")?
      .set_keepalive(enable, delay)
      .map_err(|code| BridgeError::setup("tcp_keepalive", code))
  }

  pub fn tcp_getsockname(
    &self,
    rid: ResourceId,
  ) -> Result<SocketAddr, BridgeError> {
    self
      .tcp(rid, "tcp_getsockname")?
      .local_addr()
      .map_err(|code| BridgeError::setup("tcp_getsockname", code))
  }

  pub fn tcp_getpeername(
    &self,
    rid: ResourceId,
  ) -> Result<SocketAddr, BridgeError> {
    self
      .tcp(rid, "tcp_getpeername")?
      .peer_addr()
      .map_err(|code| BridgeError::setup("tcp_getpeername", code))
  }

  pub fn tcp_connect(
    &self,
    rid: ResourceId,
    addr: SocketAddr,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Tcp, "tcp_connect")?;
    let stream = self.as_stream(&record, "tcp_connect")?;
    stream
      .connect_tcp(&self.uv, rid, addr)
      .map_err(|code| BridgeError::setup("tcp_connect", code))?;
    self.begin_request(&record, EventKind::Connect, callback)
  }

  pub fn pipe_bind(
    &self,
    rid: ResourceId,
    path: &Path,
  ) -> Result<(), BridgeError> {
    self
      .pipe(rid, "pipe_bind")?
      .pipe_bind(path)
      .map_err(|code| BridgeError::setup("pipe_bind", code))
  }

  /// Wraps an existing descriptor. The pipe takes ownership of it.
  pub fn pipe_open(
    &self,
    rid: ResourceId,
    fd: OwnedFd,
  ) -> Result<(), BridgeError> {
    self
      .pipe(rid, "pipe_open")?
      .open_fd(&self.uv, fd, true, true)
      .map_err(|code| BridgeError::setup("pipe_open", code))
  }

  pub fn pipe_connect(
    &self,
    rid: ResourceId,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Pipe, "pipe_connect")?;
    let stream = self.as_stream(&record, "pipe_connect")?;
    stream
      .connect_pipe(&self.uv, rid, path)
      .map_err(|code| BridgeError::setup("pipe_connect", code))?;
    self.begin_request(&record, EventKind::Connect, callback)
  }

  /// Starts accepting connections. `callback` gets `(handle, status)` once
  /// per queued connection; pass a backlog of 0 for the configured default.
  pub fn listen(
    &self,
    rid: ResourceId,
    backlog: u32,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let (record, stream) = self.open_stream(rid, "listen")?;
    let backlog = match backlog {
      0 => self.options().listen_backlog,
      backlog => backlog,
    };
    self.set_slot(&record, EventKind::Listen, callback)?;
    stream
      .listen(&self.uv, rid, backlog)
      .map_err(|code| BridgeError::setup("listen", code))?;
    self.watch(&record, EventKind::Listen)
  }

  /// Moves the oldest pending connection of `server` into `client`.
  pub fn accept(
    &self,
    server: ResourceId,
    client: ResourceId,
  ) -> Result<(), BridgeError> {
    let (_, server) = self.open_stream(server, "accept")?;
    let (client_record, client) = self.open_stream(client, "accept")?;
    if client.kind() != server.kind() {
      return Err(BridgeError::Unsupported {
        op: "accept",
        kind: client_record.kind(),
      });
    }
    server
      .accept(&client)
      .map_err(|code| BridgeError::setup("accept", code))
  }

  pub fn read_start(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    self.start_reading(rid, "read_start", false, callback)
  }

  /// Like `read_start` for ipc pipes, with a fourth callback argument
  /// carrying the type of a handle passed along with the data. Handle
  /// passing is not supported, so it is always 0.
  pub fn read2_start(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Pipe, "read2_start")?;
    if !self.as_stream(&record, "read2_start")?.is_ipc() {
      return Err(BridgeError::InvalidArgument("pipe was not created for ipc"));
    }
    self.start_reading(rid, "read2_start", true, callback)
  }

  fn start_reading(
    &self,
    rid: ResourceId,
    op: &'static str,
    read2: bool,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let (record, stream) = self.open_stream(rid, op)?;
    self.set_slot(&record, EventKind::Read, callback)?;
    stream
      .read_start(&self.uv, rid, self.options().read_buffer_size, read2)
      .map_err(|code| BridgeError::setup(op, code))?;
    self.watch(&record, EventKind::Read)
  }

  pub fn read_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record = self.lookup(rid)?;
    let stream = self.as_stream(&record, "read_stop")?;
    stream.read_stop(&self.uv, rid);
    self.unwatch(&record, EventKind::Read);
    Ok(())
  }

  /// Queues `data`. Writes complete in submission order, each with its own
  /// `(handle, status)` callback.
  pub fn write(
    &self,
    rid: ResourceId,
    data: Bytes,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let (record, stream) = self.open_stream(rid, "write")?;
    stream
      .write(&self.uv, rid, data)
      .map_err(|code| BridgeError::setup("write", code))?;
    self.begin_request(&record, EventKind::Write, callback)
  }

  /// Shuts down the write side once every queued write has finished.
  pub fn shutdown(
    &self,
    rid: ResourceId,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let (record, stream) = self.open_stream(rid, "shutdown")?;
    stream
      .shutdown(&self.uv, rid)
      .map_err(|code| BridgeError::setup("shutdown", code))?;
    self.begin_request(&record, EventKind::Shutdown, callback)
  }
}

#[cfg(test)]
mod tests {
  use crate::bridge::UvBridge;
  use crate::errno;
  use crate::error::BridgeError;
  use crate::handle::HandleKind;
  use crate::options::BridgeOptions;

  #[test]
  fn write_before_connect_is_rejected() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Tcp).unwrap();
    let err = bridge.write(rid, "x".into(), None).unwrap_err();
    assert_eq!(err.code(), Some(errno::UV_ENOTCONN));
    assert_eq!(bridge.refcount(rid), Some(1));
  }

  #[test]
  fn stream_ops_reject_timers() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Timer).unwrap();
    assert!(matches!(
      bridge.read_start(rid, None),
      Err(BridgeError::Unsupported {
        op: "read_start",
        kind: HandleKind::Timer
      })
    ));
    let pipe = bridge.pipe_init(false).unwrap();
    assert!(matches!(
      bridge.tcp_nodelay(pipe, true),
      Err(BridgeError::Unsupported { .. })
    ));
  }

  #[test]
  fn listen_needs_a_bound_socket() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.create(HandleKind::Tcp).unwrap();
    let err = bridge.listen(rid, 0, None).unwrap_err();
    assert_eq!(err.code(), Some(errno::UV_EINVAL));
    assert!(!bridge.is_active(rid));
  }
}
