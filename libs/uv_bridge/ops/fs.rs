// Copyright 2018-2026 the Deno authors. MIT license.

//! File system requests. Each call creates a one-shot request record that
//! is deleted right after its callback ran. Callbacks receive the result
//! (a negative status on failure) followed by the request's payload, if any.

use std::os::fd::RawFd;
use std::path::Path;

use bytes::Bytes;

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::native::fs::FsRequest;
use crate::resources::ResourceId;

impl UvBridge {
  /// Queues `request` on the blocking pool.
  pub fn fs(
    &self,
    request: FsRequest,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let rid = self.register(HandleKind::Fs, NativeHandle::Request);
    let record = self.lookup(rid)?;
    self.set_slot(&record, EventKind::Fs, callback)?;
    log::trace!("fs {} queued as {rid}", request.name());
    self.uv.begin_request();
    request.spawn(&self.uv, rid);
    record.mark_active();
    Ok(rid)
  }

  pub fn fs_open(
    &self,
    path: &Path,
    flags: i32,
    mode: u32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Open { path, flags, mode }, callback)
  }

  pub fn fs_close(
    &self,
    fd: RawFd,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Close { fd }, callback)
  }

  /// Reads up to `len` bytes, or the configured chunk size when `len` is
  /// `None`. A negative `offset` reads from the current position.
  pub fn fs_read(
    &self,
    fd: RawFd,
    offset: i64,
    len: Option<usize>,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let len = len.unwrap_or(self.options().fs_read_size);
    self.fs(FsRequest::Read { fd, offset, len }, callback)
  }

  pub fn fs_write(
    &self,
    fd: RawFd,
    data: Bytes,
    offset: i64,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Write { fd, data, offset }, callback)
  }

  pub fn fs_fsync(
    &self,
    fd: RawFd,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Fsync { fd }, callback)
  }

  pub fn fs_fdatasync(
    &self,
    fd: RawFd,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Fdatasync { fd }, callback)
  }

  pub fn fs_ftruncate(
    &self,
    fd: RawFd,
    len: u64,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Ftruncate { fd, len }, callback)
  }

  pub fn fs_unlink(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Unlink { path }, callback)
  }

  pub fn fs_mkdir(
    &self,
    path: &Path,
    mode: u32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Mkdir { path, mode }, callback)
  }

  pub fn fs_rmdir(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Rmdir { path }, callback)
  }

  pub fn fs_rename(
    &self,
    from: &Path,
    to: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    self.fs(FsRequest::Rename { from, to }, callback)
  }

  pub fn fs_link(
    &self,
    from: &Path,
    to: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    self.fs(FsRequest::Link { from, to }, callback)
  }

  pub fn fs_symlink(
    &self,
    target: &Path,
    path: &Path,
    flags: i32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let (target, path) = (target.to_path_buf(), path.to_path_buf());
    self.fs(FsRequest::Symlink { target, path, flags }, callback)
  }

  pub fn fs_readlink(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Readlink { path }, callback)
  }

  pub fn fs_chmod(
    &self,
    path: &Path,
    mode: u32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Chmod { path, mode }, callback)
  }

  pub fn fs_fchmod(
    &self,
    fd: RawFd,
    mode: u32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Fchmod { fd, mode }, callback)
  }

  pub fn fs_chown(
    &self,
    path: &Path,
    uid: u32,
    gid: u32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Chown { path, uid, gid }, callback)
  }

  pub fn fs_fchown(
    &self,
    fd: RawFd,
    uid: u32,
    gid: u32,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Fchown { fd, uid, gid }, callback)
  }

  /// Times are seconds since the epoch.
  pub fn fs_utime(
    &self,
    path: &Path,
    atime: f64,
    mtime: f64,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Utime { path, atime, mtime }, callback)
  }

  pub fn fs_futime(
    &self,
    fd: RawFd,
    atime: f64,
    mtime: f64,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Futime { fd, atime, mtime }, callback)
  }

  pub fn fs_stat(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Stat { path }, callback)
  }

  pub fn fs_lstat(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Lstat { path }, callback)
  }

  pub fn fs_fstat(
    &self,
    fd: RawFd,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    self.fs(FsRequest::Fstat { fd }, callback)
  }

  /// Entry names, sorted, without `.` and `..`.
  pub fn fs_readdir(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let path = path.to_path_buf();
    self.fs(FsRequest::Readdir { path }, callback)
  }

  pub fn fs_sendfile(
    &self,
    out_fd: RawFd,
    in_fd: RawFd,
    offset: i64,
    len: usize,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let request = FsRequest::Sendfile {
      out_fd,
      in_fd,
      offset,
      len,
    };
    self.fs(request, callback)
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
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;
  use crate::value::HostValue;

  #[test]
  fn request_record_is_deleted_after_callback() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let result = Rc::new(RefCell::new(Vec::new()));
    let sink = result.clone();
    let rid = bridge
      .fs_stat(
        &dir.path().join("missing"),
        Some(HostCallback::new(move |_, args| {
          sink.borrow_mut().extend_from_slice(args)
        })),
      )
      .unwrap();
    assert_eq!(bridge.refcount(rid), Some(1));
    assert!(bridge.close(rid, None).is_err());
    bridge.run(RunMode::Default);
    assert_eq!(*result.borrow(), vec![HostValue::Int(errno::UV_ENOENT as i64)]);
    assert!(bridge.lookup(rid).is_err());
    assert_eq!(bridge.resource_count(), 0);
  }

  #[test]
  fn requests_without_callback_still_complete() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    bridge.fs_mkdir(&dir.path().join("sub"), 0o755, None).unwrap();
    bridge.run(RunMode::Default);
    assert!(dir.path().join("sub").is_dir());
    assert_eq!(bridge.resource_count(), 0);
  }
}
