// Copyright 2018-2026 the Deno authors. MIT license.

use std::os::fd::RawFd;
use std::path::Path;
use std::path::PathBuf;

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::native::watch::FsEventHandle;
use crate::native::watch::FsPollHandle;
use crate::native::watch::PollHandle;
use crate::resources::ResourceId;

impl UvBridge {
  /// Watches a descriptor the caller keeps ownership of.
  pub fn poll_init(&self, fd: RawFd) -> Result<ResourceId, BridgeError> {
    if fd < 0 {
      return Err(BridgeError::InvalidArgument("fd"));
    }
    let poll = PollHandle::new(fd);
    Ok(self.register(HandleKind::Poll, NativeHandle::Poll(poll)))
  }

  /// `events` is a mask of `POLL_READABLE` and `POLL_WRITABLE`. The callback
  /// keeps firing while the descriptor stays ready.
  pub fn poll_start(
    &self,
    rid: ResourceId,
    events: i32,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Poll, "poll_start")?;
    self.set_slot(&record, EventKind::Poll, callback)?;
    if let NativeHandle::Poll(poll) = &*record.native() {
      poll
        .start(&self.uv, rid, events)
        .map_err(|code| BridgeError::setup("poll_start", code))?;
    }
    self.watch(&record, EventKind::Poll)
  }

  pub fn poll_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::Poll, "poll_stop")?;
    if let NativeHandle::Poll(poll) = &*record.native() {
      poll.stop(&self.uv, rid);
    }
    self.unwatch(&record, EventKind::Poll);
    Ok(())
  }

  /// Creates an fs-event handle and starts watching `path` (not
  /// recursively). The callback gets `(handle, filename, events, status)`.
  pub fn fs_event_init(
    &self,
    path: &Path,
    callback: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let watcher = FsEventHandle::new();
    let rid = self.register(HandleKind::FsEvent, NativeHandle::Released);
    if let Err(code) = watcher.start(&self.uv, rid, path) {
      self.delete(rid);
      return Err(BridgeError::setup("fs_event_init", code));
    }
    let record = self.lookup(rid)?;
    record.set_native(NativeHandle::FsEvent(watcher));
    self.set_slot(&record, EventKind::FsEvent, callback)?;
    self.watch(&record, EventKind::FsEvent)?;
    Ok(rid)
  }

  pub fn fs_event_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record =
      self.lookup_kind(rid, HandleKind::FsEvent, "fs_event_stop")?;
    if let NativeHandle::FsEvent(watcher) = &*record.native() {
      watcher.stop(&self.uv, rid);
    }
    self.unwatch(&record, EventKind::FsEvent);
    Ok(())
  }

  pub fn fs_event_path(
    &self,
    rid: ResourceId,
  ) -> Result<Option<PathBuf>, BridgeError> {
    let record =
      self.lookup_kind(rid, HandleKind::FsEvent, "fs_event_path")?;
    match &*record.native() {
      NativeHandle::FsEvent(watcher) => Ok(watcher.path()),
      _ => Ok(None),
    }
  }

  pub fn fs_poll_init(&self) -> Result<ResourceId, BridgeError> {
    Ok(self.register(
      HandleKind::FsPoll,
      NativeHandle::FsPoll(FsPollHandle::new()),
    ))
  }

  /// Stats `path` every `interval_ms` and reports `(handle, status, prev,
  /// curr)` whenever anything but the access time changed.
  pub fn fs_poll_start(
    &self,
    rid: ResourceId,
    path: &Path,
    interval_ms: u64,
    callback: Option<HostCallback>,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::FsPoll, "fs_poll_start")?;
    self.set_slot(&record, EventKind::FsPoll, callback)?;
    if let NativeHandle::FsPoll(poller) = &*record.native() {
      poller.start(&self.uv, rid, path, interval_ms);
    }
    self.watch(&record, EventKind::FsPoll)
  }

  pub fn fs_poll_stop(&self, rid: ResourceId) -> Result<(), BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::FsPoll, "fs_poll_stop")?;
    if let NativeHandle::FsPoll(poller) = &*record.native() {
      poller.stop(&self.uv, rid);
    }
    self.unwatch(&record, EventKind::FsPoll);
    Ok(())
  }

  pub fn fs_poll_path(
    &self,
    rid: ResourceId,
  ) -> Result<Option<PathBuf>, BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::FsPoll, "fs_poll_path")?;
    match &*record.native() {
      NativeHandle::FsPoll(poller) => Ok(poller.path()),
      _ => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::io::Write;
  use std::rc::Rc;

  use pretty_assertions::assert_eq;

  use crate::bridge::UvBridge;
  use crate::callback::HostCallback;
  use crate::errno;
  use crate::native::watch::POLL_READABLE;
  use crate::options::BridgeOptions;
  use crate::uv::RunMode;
  use crate::value::HostValue;

  #[test]
  fn poll_reports_readable_socket() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let (mut tx, rx) = std::os::unix::net::UnixStream::pair().unwrap();
    rx.set_nonblocking(true).unwrap();
    tx.write_all(b"x").unwrap();
    let fd = std::os::fd::AsRawFd::as_raw_fd(&rx);

    let rid = bridge.poll_init(fd).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    bridge
      .poll_start(
        rid,
        POLL_READABLE,
        Some(HostCallback::new(move |bridge, args| {
          sink.borrow_mut().push(args.to_vec());
          bridge.close(rid, None).unwrap();
        })),
      )
      .unwrap();
    bridge.run(RunMode::Default);

    assert_eq!(
      *seen.borrow(),
      vec![vec![
        HostValue::Handle(rid),
        HostValue::Int(0),
        HostValue::Int(POLL_READABLE as i64),
        HostValue::Int(fd as i64),
      ]]
    );
    drop(rx);
  }

  #[test]
  fn poll_needs_events() {
    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.poll_init(0).unwrap();
    let err = bridge.poll_start(rid, 0, None).unwrap_err();
    assert_eq!(err.code(), Some(errno::UV_EINVAL));
    assert!(bridge.poll_init(-1).is_err());
  }

  #[test]
  fn fs_poll_reports_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watched");
    std::fs::write(&path, b"one").unwrap();

    let bridge = UvBridge::new(BridgeOptions::default()).unwrap();
    let rid = bridge.fs_poll_init().unwrap();
    let sizes = Rc::new(RefCell::new(None));
    let sink = sizes.clone();
    bridge
      .fs_poll_start(
        rid,
        &path,
        5,
        Some(HostCallback::new(move |bridge, args| {
          let size = |value: &HostValue| {
            value.as_map().and_then(|m| m["size"].as_int())
          };
          *sink.borrow_mut() = Some((size(&args[2]), size(&args[3])));
          bridge.close(rid, None).unwrap();
        })),
      )
      .unwrap();
    assert_eq!(bridge.fs_poll_path(rid).unwrap(), Some(path.clone()));

    let writer = path.clone();
    let timer = bridge.create(crate::handle::HandleKind::Timer).unwrap();
    bridge
      .timer_start(
        timer,
        20,
        0,
        Some(HostCallback::new(move |_, _| {
          std::fs::write(&writer, b"three").unwrap();
        })),
      )
      .unwrap();
    bridge.run(RunMode::Default);
    assert_eq!(*sizes.borrow(), Some((Some(3), Some(5))));
  }
}
