// Copyright 2018-2026 the Deno authors. MIT license.

//! Turns loop completions into host closure invocations.

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::handle::HandleRecord;
use crate::native::NativeHandle;
use crate::uv::Completion;
use crate::uv::FsPayload;
use crate::value::HostValue;

/// What happens to the record once the closure has returned.
enum Lifetime {
  Keep,
  /// Timers stay started only while re-armed.
  TimerFired,
  /// The exit watcher fires once.
  Unwatch(EventKind),
  Release,
  Delete,
}

fn lifetime(completion: &Completion) -> Lifetime {
  match completion {
    Completion::Timer { .. } => Lifetime::TimerFired,
    Completion::Exit { .. } => Lifetime::Unwatch(EventKind::Exit),
    Completion::Connect { .. }
    | Completion::Write { .. }
    | Completion::Send { .. }
    | Completion::Shutdown { .. } => Lifetime::Release,
    Completion::Fs { .. }
    | Completion::GetAddrInfo { .. }
    | Completion::AfterWork { .. }
    | Completion::Close { .. } => Lifetime::Delete,
    _ => Lifetime::Keep,
  }
}

fn buffer(nread: isize, buf: Option<bytes::Bytes>) -> HostValue {
  match buf {
    Some(buf) if nread > 0 => {
      let len = (nread as usize).min(buf.len());
      HostValue::Bytes(buf.slice(..len))
    }
    _ => HostValue::Null,
  }
}

fn fs_args(result: i64, payload: FsPayload) -> Vec<HostValue> {
  let mut args = vec![HostValue::Int(result)];
  match payload {
    FsPayload::None => {}
    FsPayload::Data(data) => args.push(data.into()),
    FsPayload::Stat(stat) => args.push((&stat).into()),
    FsPayload::Entries(entries) => args.push(HostValue::List(
      entries.into_iter().map(HostValue::Str).collect(),
    )),
    FsPayload::Path(path) => args.push(HostValue::Str(path)),
  }
  args
}

fn poll_fd(record: &HandleRecord) -> HostValue {
  match &*record.native() {
    NativeHandle::Poll(poll) => HostValue::Int(poll.fd() as i64),
    _ => HostValue::Null,
  }
}

/// Builds the closure arguments for `completion`.
fn marshal(record: &HandleRecord, completion: Completion) -> Vec<HostValue> {
  let handle = HostValue::Handle(completion.rid());
  match completion {
    Completion::Timer { .. }
    | Completion::Idle { .. }
    | Completion::Prepare { .. }
    | Completion::Check { .. }
    | Completion::Async { .. } => vec![handle, HostValue::Int(0)],
    Completion::Poll { status, events, .. } => vec![
      handle,
      status.into(),
      events.into(),
      poll_fd(record),
    ],
    Completion::Connect { status, .. }
    | Completion::Write { status, .. }
    | Completion::Send { status, .. }
    | Completion::Shutdown { status, .. }
    | Completion::Listen { status, .. }
    | Completion::AfterWork { status, .. } => vec![handle, status.into()],
    Completion::Read {
      nread,
      buf,
      pending,
      ..
    } => {
      let mut args =
        vec![handle, HostValue::Int(nread as i64), buffer(nread, buf)];
      if let Some(pending) = pending {
        args.push(pending.into());
      }
      args
    }
    Completion::Recv {
      nread, buf, addr, ..
    } => vec![
      handle,
      HostValue::Int(nread as i64),
      buffer(nread, buf),
      addr.into(),
    ],
    Completion::FsEvent {
      filename,
      events,
      status,
      ..
    } => vec![handle, filename.into(), events.into(), status.into()],
    Completion::FsPoll {
      status, prev, curr, ..
    } => vec![handle, status.into(), (&prev).into(), (&curr).into()],
    Completion::Fs {
      result, payload, ..
    } => fs_args(result, payload),
    Completion::GetAddrInfo { status, addrs, .. } => vec![
      status.into(),
      HostValue::List(
        addrs
          .into_iter()
          .map(|addr| HostValue::Str(addr.to_string()))
          .collect(),
      ),
    ],
    Completion::Exit {
      exit_status,
      term_signal,
      ..
    } => vec![handle, exit_status.into(), term_signal.into()],
    Completion::Close { .. } => vec![handle],
  }
}

impl UvBridge {
  pub(crate) fn dispatch(&self, completion: Completion) {
    let rid = completion.rid();
    let event = completion.event_kind();
    let Ok(record) = self.lookup(rid) else {
      log::debug!("dropping {event} completion for destroyed handle {rid}");
      return;
    };
    if event.is_persistent() && !record.is_watching(event) {
      log::trace!("dropping {event} completion for stopped handle {rid}");
      return;
    }
    log::trace!("dispatch {event} to {} handle {rid}", record.kind());
    let lifetime = lifetime(&completion);
    let is_poll = matches!(completion, Completion::Poll { .. });

    let args = marshal(&record, completion);
    self.invoke(&record, event, &args);
    drop(args);

    if is_poll {
      if let NativeHandle::Poll(poll) = &*record.native() {
        poll.delivered();
      }
    }
    match lifetime {
      Lifetime::Keep => {}
      Lifetime::TimerFired => {
        if !self.uv.timer_is_pending(rid) {
          self.unwatch(&record, EventKind::Timer);
        }
      }
      Lifetime::Unwatch(event) => self.unwatch(&record, event),
      Lifetime::Release => self.release(rid),
      Lifetime::Delete => self.delete(rid),
    }
  }

  fn invoke(&self, record: &HandleRecord, event: EventKind, args: &[HostValue]) {
    let Some(slot) = record.callback(event) else {
      return;
    };
    log::trace!(
      "calling {event} callback registered in context {}",
      slot.context.name()
    );
    let _context = self.enter_context(record.context().clone());
    slot.callback.call(self, args);
  }
}
