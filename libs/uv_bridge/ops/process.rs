// Copyright 2018-2026 the Deno authors. MIT license.

use std::os::fd::OwnedFd;

use crate::bridge::UvBridge;
use crate::callback::EventKind;
use crate::callback::HostCallback;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::native::process::ProcessHandle;
use crate::native::process::ProcessOptions;
use crate::native::process::StdioMode;
use crate::native::stream::StreamHandle;
use crate::resources::ResourceId;

/// Sends `signum` to any process.
pub fn kill(pid: i32, signum: i32) -> Result<(), BridgeError> {
  crate::native::process::kill(pid, signum)
    .map_err(|code| BridgeError::setup("kill", code))
}

impl UvBridge {
  fn stdio_pipe(
    &self,
    mode: StdioMode,
  ) -> Result<Option<StreamHandle>, BridgeError> {
    let StdioMode::Pipe(rid) = mode else {
      return Ok(None);
    };
    let record = self.open_kind(rid, HandleKind::Pipe, "spawn")?;
    if record.is_watching(EventKind::Read)
      || record.is_watching(EventKind::Listen)
    {
      return Err(BridgeError::InvalidArgument("stdio pipe is already in use"));
    }
    self.as_stream(&record, "spawn").map(Some)
  }

  /// Starts a child process. `exit` receives `(handle, exit_status,
  /// term_signal)` once. Pipe stdio entries name pipe handles created with
  /// `pipe_init`; they are connected to the child before this returns.
  pub fn spawn(
    &self,
    options: &ProcessOptions,
    exit: Option<HostCallback>,
  ) -> Result<ResourceId, BridgeError> {
    let pipes = options
      .stdio
      .iter()
      .map(|mode| self.stdio_pipe(*mode))
      .collect::<Result<Vec<_>, _>>()?;

    let process = ProcessHandle::new();
    let rid = self.register(HandleKind::Process, NativeHandle::Released);
    let spawned = match process.spawn(&self.uv, rid, options) {
      Ok(spawned) => spawned,
      Err(code) => {
        log::debug!("spawn {} failed: {code}", options.file);
        self.delete(rid);
        return Err(BridgeError::setup("spawn", code));
      }
    };
    let record = self.lookup(rid)?;
    record.set_native(NativeHandle::Process(process));

    let ends: [(Option<OwnedFd>, bool); 3] = [
      (spawned.stdin, false),
      (spawned.stdout, true),
      (spawned.stderr, true),
    ];
    for (stream, (fd, readable)) in pipes.into_iter().zip(ends) {
      if let (Some(stream), Some(fd)) = (stream, fd) {
        if let Err(code) = stream.open_fd(&self.uv, fd, readable, !readable) {
          log::debug!(
            "spawn {} could not attach stdio: {code}",
            options.file
          );
          if let NativeHandle::Process(process) = &*record.native() {
            let _ = process.kill(libc::SIGKILL);
          }
          self.delete(rid);
          return Err(BridgeError::setup("spawn", code));
        }
      }
    }

    self.set_slot(&record, EventKind::Exit, exit)?;
    self.watch(&record, EventKind::Exit)?;
    Ok(rid)
  }

  pub fn process_pid(
    &self,
    rid: ResourceId,
  ) -> Result<Option<u32>, BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::Process, "process_pid")?;
    match &*record.native() {
      NativeHandle::Process(process) => Ok(process.pid()),
      _ => Ok(None),
    }
  }

  pub fn process_kill(
    &self,
    rid: ResourceId,
    signum: i32,
  ) -> Result<(), BridgeError> {
    let record = self.open_kind(rid, HandleKind::Process, "process_kill")?;
    match &*record.native() {
      NativeHandle::Process(process) => process
        .kill(signum)
        .map_err(|code| BridgeError::setup("process_kill", code)),
      _ => Err(BridgeError::Unsupported {
        op: "process_kill",
        kind: record.kind(),
      }),
    }
  }
}
