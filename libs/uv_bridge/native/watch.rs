// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::RefCell;
use std::os::fd::AsRawFd;
use std::os::fd::RawFd;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use notify::Watcher;
use notify::event::ModifyKind;
use tokio::io::Interest;
use tokio::io::Ready;
use tokio::io::unix::AsyncFd;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use crate::errno;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::TaskKind;
use crate::uv::UvLoop;
use crate::value::FsStat;

pub const POLL_READABLE: i32 = 1;
pub const POLL_WRITABLE: i32 = 2;

pub const FS_EVENT_RENAME: i32 = 1;
pub const FS_EVENT_CHANGE: i32 = 2;

// The descriptor belongs to the host; this only lends it to the reactor.
struct LentFd(RawFd);

impl AsRawFd for LentFd {
  fn as_raw_fd(&self) -> RawFd {
    self.0
  }
}

fn ready_events(ready: Ready) -> i32 {
  let mut events = 0;
  if ready.is_readable() || ready.is_read_closed() {
    events |= POLL_READABLE;
  }
  if ready.is_writable() || ready.is_write_closed() {
    events |= POLL_WRITABLE;
  }
  events
}

// Level check without blocking, so readiness the host left undrained is
// reported again on the next iteration.
fn poll_now(fd: RawFd, events: i32) -> i32 {
  let mut wanted = 0;
  if events & POLL_READABLE != 0 {
    wanted |= libc::POLLIN;
  }
  if events & POLL_WRITABLE != 0 {
    wanted |= libc::POLLOUT;
  }
  let mut pfd = libc::pollfd {
    fd,
    events: wanted,
    revents: 0,
  };
  // SAFETY: pfd is a single valid pollfd and the timeout is zero.
  if unsafe { libc::poll(&mut pfd, 1, 0) } <= 0 {
    return 0;
  }
  let mut ready = 0;
  if pfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
    ready |= POLL_READABLE;
  }
  if pfd.revents & libc::POLLOUT != 0 {
    ready |= POLL_WRITABLE;
  }
  ready & events
}

/// Readiness watcher over a descriptor the host owns.
pub(crate) struct PollHandle {
  fd: RawFd,
  delivered: Rc<Notify>,
}

impl PollHandle {
  pub fn new(fd: RawFd) -> Self {
    Self {
      fd,
      delivered: Rc::new(Notify::new()),
    }
  }

  pub fn start(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    events: i32,
  ) -> Result<(), i32> {
    let interest = match (
      events & POLL_READABLE != 0,
      events & POLL_WRITABLE != 0,
    ) {
      (true, true) => Interest::READABLE | Interest::WRITABLE,
      (true, false) => Interest::READABLE,
      (false, true) => Interest::WRITABLE,
      (false, false) => return Err(errno::UV_EINVAL),
    };
    // Restarting replaces the previous task, which drops its registration.
    uv.abort(rid, TaskKind::Poll);
    let async_fd = {
      let _guard = uv.enter();
      AsyncFd::with_interest(LentFd(self.fd), interest)
        .map_err(|e| errno::from_io_error(&e))?
    };
    let delivered = self.delivered.clone();
    let fd = self.fd;
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Poll, async move {
      loop {
        let mut ready = match async_fd.ready(interest).await {
          Ok(mut guard) => {
            let ready = ready_events(guard.ready());
            guard.clear_ready();
            ready & events
          }
          Err(err) => {
            sink.post(Completion::Poll {
              rid,
              status: errno::from_io_error(&err),
              events: 0,
            });
            break;
          }
        };
        while ready != 0 {
          sink.post(Completion::Poll {
            rid,
            status: 0,
            events: ready,
          });
          delivered.notified().await;
          ready = poll_now(fd, events);
        }
      }
    });
    Ok(())
  }

  pub fn stop(&self, uv: &UvLoop, rid: ResourceId) {
    uv.abort(rid, TaskKind::Poll);
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  /// Called once the host has seen a poll event.
  pub fn delivered(&self) {
    self.delivered.notify_one();
  }
}

fn notify_code(err: &notify::Error) -> i32 {
  match &err.kind {
    notify::ErrorKind::Io(err) => errno::from_io_error(err),
    notify::ErrorKind::PathNotFound => errno::UV_ENOENT,
    notify::ErrorKind::WatchNotFound => errno::UV_EINVAL,
    _ => errno::UV_EIO,
  }
}

fn fs_event_kind(kind: &notify::EventKind) -> Option<i32> {
  match kind {
    notify::EventKind::Access(_) => None,
    notify::EventKind::Create(_)
    | notify::EventKind::Remove(_)
    | notify::EventKind::Modify(ModifyKind::Name(_)) => Some(FS_EVENT_RENAME),
    notify::EventKind::Modify(_)
    | notify::EventKind::Any
    | notify::EventKind::Other => Some(FS_EVENT_CHANGE),
  }
}

/// Path change notifications.
pub(crate) struct FsEventHandle {
  watcher: RefCell<Option<notify::RecommendedWatcher>>,
  path: RefCell<Option<PathBuf>>,
}

impl FsEventHandle {
  pub fn new() -> Self {
    Self {
      watcher: RefCell::new(None),
      path: RefCell::new(None),
    }
  }

  pub fn path(&self) -> Option<PathBuf> {
    self.path.borrow().clone()
  }

  pub fn start(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    path: &Path,
  ) -> Result<(), i32> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(
      move |res: notify::Result<notify::Event>| {
        let _ = tx.send(res);
      },
    )
    .map_err(|e| notify_code(&e))?;
    watcher
      .watch(path, notify::RecursiveMode::NonRecursive)
      .map_err(|e| notify_code(&e))?;
    *self.watcher.borrow_mut() = Some(watcher);
    *self.path.borrow_mut() = Some(path.to_path_buf());

    let sink = uv.sink();
    uv.spawn(rid, TaskKind::FsEvent, async move {
      while let Some(res) = rx.recv().await {
        match res {
          Ok(event) => {
            let Some(events) = fs_event_kind(&event.kind) else {
              continue;
            };
            let filename = event
              .paths
              .first()
              .and_then(|p| p.file_name())
              .map(|name| name.to_string_lossy().into_owned());
            sink.post(Completion::FsEvent {
              rid,
              filename,
              events,
              status: 0,
            });
          }
          Err(err) => sink.post(Completion::FsEvent {
            rid,
            filename: None,
            events: 0,
            status: notify_code(&err),
          }),
        }
      }
    });
    Ok(())
  }

  pub fn stop(&self, uv: &UvLoop, rid: ResourceId) {
    uv.abort(rid, TaskKind::FsEvent);
    self.watcher.borrow_mut().take();
  }
}

async fn stat(path: &Path) -> (i32, FsStat) {
  match tokio::fs::metadata(path).await {
    Ok(metadata) => (0, FsStat::from(&metadata)),
    Err(err) => (errno::from_io_error(&err), FsStat::default()),
  }
}

// Access times move on every read, so they do not count as a change.
fn changed(prev: &(i32, FsStat), curr: &(i32, FsStat)) -> bool {
  let strip = |(status, stat): &(i32, FsStat)| {
    (
      *status,
      FsStat {
        atime: 0,
        ..*stat
      },
    )
  };
  strip(prev) != strip(curr)
}

/// Periodic stat comparison of a path.
pub(crate) struct FsPollHandle {
  path: RefCell<Option<PathBuf>>,
}

impl FsPollHandle {
  pub fn new() -> Self {
    Self {
      path: RefCell::new(None),
    }
  }

  pub fn path(&self) -> Option<PathBuf> {
    self.path.borrow().clone()
  }

  pub fn start(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    path: &Path,
    interval_ms: u64,
  ) {
    *self.path.borrow_mut() = Some(path.to_path_buf());
    let path = path.to_path_buf();
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::FsPoll, async move {
      let mut prev = stat(&path).await;
      let mut ticker =
        tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let curr = stat(&path).await;
        if changed(&prev, &curr) {
          sink.post(Completion::FsPoll {
            rid,
            status: curr.0,
            prev: prev.1,
            curr: curr.1,
          });
          prev = curr;
        }
      }
    });
  }

  pub fn stop(&self, uv: &UvLoop, rid: ResourceId) {
    uv.abort(rid, TaskKind::FsPoll);
  }
}
