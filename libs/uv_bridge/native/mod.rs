// Copyright 2018-2026 the Deno authors. MIT license.

//! Native state owned by a handle record, one variant per handle family.

pub mod dns;
pub mod fs;
pub mod lock;
pub mod process;
pub mod stream;
pub mod udp;
pub mod watch;

use std::sync::Arc;

use crate::uv::AsyncSender;

use self::lock::HostLock;
use self::process::ProcessHandle;
use self::stream::StreamHandle;
use self::udp::UdpHandle;
use self::watch::FsEventHandle;
use self::watch::FsPollHandle;
use self::watch::PollHandle;

#[derive(Default)]
pub(crate) enum NativeHandle {
  #[default]
  Released,
  Timer,
  /// Idle, prepare and check handles; the loop keeps their state.
  Watcher,
  Async(AsyncSender),
  Stream(StreamHandle),
  Udp(UdpHandle),
  Process(ProcessHandle),
  Poll(PollHandle),
  FsEvent(FsEventHandle),
  FsPoll(FsPollHandle),
  /// One-shot requests whose payload lives in the loop task.
  Request,
  Lock(Arc<HostLock>),
}

impl NativeHandle {
  pub fn stream(&self) -> Option<StreamHandle> {
    match self {
      NativeHandle::Stream(stream) => Some(stream.clone()),
      _ => None,
    }
  }

  pub fn udp(&self) -> Option<UdpHandle> {
    match self {
      NativeHandle::Udp(udp) => Some(udp.clone()),
      _ => None,
    }
  }

  pub fn lock(&self) -> Option<Arc<HostLock>> {
    match self {
      NativeHandle::Lock(lock) => Some(lock.clone()),
      _ => None,
    }
  }
}
