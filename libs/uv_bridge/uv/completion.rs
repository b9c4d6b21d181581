// Copyright 2018-2026 the Deno authors. MIT license.

use std::net::IpAddr;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::callback::EventKind;
use crate::resources::ResourceId;
use crate::value::FsStat;

/// Result payload of a file system request.
#[derive(Debug, Clone, PartialEq)]
pub enum FsPayload {
  None,
  Data(Option<Bytes>),
  Stat(FsStat),
  Entries(Vec<String>),
  Path(String),
}

/// A finished native event, queued by the loop and handed to the bridge's
/// dispatcher. It names its handle by id only.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
  Timer {
    rid: ResourceId,
  },
  Idle {
    rid: ResourceId,
  },
  Prepare {
    rid: ResourceId,
  },
  Check {
    rid: ResourceId,
  },
  Async {
    rid: ResourceId,
  },
  Poll {
    rid: ResourceId,
    status: i32,
    events: i32,
  },
  Connect {
    rid: ResourceId,
    status: i32,
  },
  Write {
    rid: ResourceId,
    status: i32,
  },
  Send {
    rid: ResourceId,
    status: i32,
  },
  Shutdown {
    rid: ResourceId,
    status: i32,
  },
  Listen {
    rid: ResourceId,
    status: i32,
  },
  /// `pending` is set for reads started with `read2_start` and carries the
  /// handle type of a passed handle (0 when none).
  Read {
    rid: ResourceId,
    nread: isize,
    buf: Option<Bytes>,
    pending: Option<i32>,
  },
  Recv {
    rid: ResourceId,
    nread: isize,
    buf: Option<Bytes>,
    addr: Option<SocketAddr>,
  },
  FsEvent {
    rid: ResourceId,
    filename: Option<String>,
    events: i32,
    status: i32,
  },
  FsPoll {
    rid: ResourceId,
    status: i32,
    prev: FsStat,
    curr: FsStat,
  },
  Fs {
    rid: ResourceId,
    result: i64,
    payload: FsPayload,
  },
  GetAddrInfo {
    rid: ResourceId,
    status: i32,
    addrs: Vec<IpAddr>,
  },
  Exit {
    rid: ResourceId,
    exit_status: i64,
    term_signal: i32,
  },
  AfterWork {
    rid: ResourceId,
    status: i32,
  },
  Close {
    rid: ResourceId,
  },
}

impl Completion {
  pub fn rid(&self) -> ResourceId {
    match self {
      Completion::Timer { rid }
      | Completion::Idle { rid }
      | Completion::Prepare { rid }
      | Completion::Check { rid }
      | Completion::Async { rid }
      | Completion::Poll { rid, .. }
      | Completion::Connect { rid, .. }
      | Completion::Write { rid, .. }
      | Completion::Send { rid, .. }
      | Completion::Shutdown { rid, .. }
      | Completion::Listen { rid, .. }
      | Completion::Read { rid, .. }
      | Completion::Recv { rid, .. }
      | Completion::FsEvent { rid, .. }
      | Completion::FsPoll { rid, .. }
      | Completion::Fs { rid, .. }
      | Completion::GetAddrInfo { rid, .. }
      | Completion::Exit { rid, .. }
      | Completion::AfterWork { rid, .. }
      | Completion::Close { rid } => *rid,
    }
  }

  pub fn event_kind(&self) -> EventKind {
    match self {
      Completion::Timer { .. } => EventKind::Timer,
      Completion::Idle { .. } => EventKind::Idle,
      Completion::Prepare { .. } => EventKind::Prepare,
      Completion::Check { .. } => EventKind::Check,
      Completion::Async { .. } => EventKind::Async,
      Completion::Poll { .. } => EventKind::Poll,
      Completion::Connect { .. } => EventKind::Connect,
      Completion::Write { .. } => EventKind::Write,
      Completion::Send { .. } => EventKind::Send,
      Completion::Shutdown { .. } => EventKind::Shutdown,
      Completion::Listen { .. } => EventKind::Listen,
      Completion::Read { .. } => EventKind::Read,
      Completion::Recv { .. } => EventKind::Recv,
      Completion::FsEvent { .. } => EventKind::FsEvent,
      Completion::FsPoll { .. } => EventKind::FsPoll,
      Completion::Fs { .. } => EventKind::Fs,
      Completion::GetAddrInfo { .. } => EventKind::GetAddrInfo,
      Completion::Exit { .. } => EventKind::Exit,
      Completion::AfterWork { .. } => EventKind::AfterWork,
      Completion::Close { .. } => EventKind::Close,
    }
  }

  /// One-shot requests counted by the loop while in flight.
  pub fn is_request(&self) -> bool {
    matches!(
      self,
      Completion::Connect { .. }
        | Completion::Write { .. }
        | Completion::Send { .. }
        | Completion::Shutdown { .. }
        | Completion::Fs { .. }
        | Completion::GetAddrInfo { .. }
        | Completion::AfterWork { .. }
    )
  }
}
