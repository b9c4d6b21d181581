// Copyright 2018-2026 the Deno authors. MIT license.

use std::os::fd::RawFd;

use crate::bridge::UvBridge;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::native::stream::StreamHandle;
use crate::resources::ResourceId;

impl UvBridge {
  /// Wraps a terminal descriptor. The descriptor is duplicated, so the
  /// caller keeps its own copy open.
  pub fn tty_init(
    &self,
    fd: RawFd,
    readable: bool,
  ) -> Result<ResourceId, BridgeError> {
    let stream = StreamHandle::new(HandleKind::Tty, false);
    stream
      .tty_init(&self.uv, fd, readable)
      .map_err(|code| BridgeError::setup("tty_init", code))?;
    Ok(self.register(HandleKind::Tty, NativeHandle::Stream(stream)))
  }

  fn tty(
    &self,
    rid: ResourceId,
    op: &'static str,
  ) -> Result<StreamHandle, BridgeError> {
    let record = self.open_kind(rid, HandleKind::Tty, op)?;
    self.as_stream(&record, op)
  }

  /// Returns `(width, height)`.
  pub fn tty_get_winsize(
    &self,
    rid: ResourceId,
  ) -> Result<(i32, i32), BridgeError> {
    self
      .tty(rid, "tty_get_winsize")?
      .get_winsize()
      .map_err(|code| BridgeError::setup("tty_get_winsize", code))
  }

  /// `mode` is one of `TTY_MODE_NORMAL`, `TTY_MODE_RAW` or `TTY_MODE_IO`.
  pub fn tty_set_mode(
    &self,
    rid: ResourceId,
    mode: i32,
  ) -> Result<(), BridgeError> {
    self
      .tty(rid, "tty_set_mode")?
      .set_mode(mode)
      .map_err(|code| BridgeError::setup("tty_set_mode", code))
  }

  pub fn tty_reset_mode(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self
      .tty(rid, "tty_reset_mode")?
      .reset_mode()
      .map_err(|code| BridgeError::setup("tty_reset_mode", code))
  }
}

#[cfg(test)]
mod tests {
  use crate::bridge::UvBridge;
  use crate::errno;
  use crate::options::BridgeOptions;

  #[test]
  fn non_terminal_descriptor() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let file = tempfile::tempfile().unwrap();
    let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
    // Regular files cannot be registered with the reactor.
    assert!(bridge.tty_init(fd, false).is_err());
    assert!(bridge.tty_init(-1, true).is_err());

    let (tx, _rx) = std::os::unix::net::UnixStream::pair().unwrap();
    let fd = std::os::fd::AsRawFd::as_raw_fd(&tx);
    let rid = bridge.tty_init(fd, false).unwrap();
    assert!(bridge.is_writable(rid));
    let err = bridge.tty_get_winsize(rid).unwrap_err();
    assert_eq!(err.code(), Some(errno::UV_ENOTTY));
  }
}
