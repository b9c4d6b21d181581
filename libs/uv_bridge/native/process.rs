// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::Cell;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;

use crate::errno;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::TaskKind;
use crate::uv::UvLoop;

/// How one of the child's standard streams is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
  #[default]
  Ignore,
  Inherit,
  /// Connect the stream to the given pipe handle, which must not be open yet.
  Pipe(ResourceId),
}

#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
  pub file: String,
  pub args: Vec<String>,
  /// Replaces the child's environment when set.
  pub env: Option<Vec<(String, String)>>,
  pub cwd: Option<PathBuf>,
  pub stdio: [StdioMode; 3],
  pub uid: Option<u32>,
  pub gid: Option<u32>,
  pub detached: bool,
}

/// Parent ends of the pipes requested through [`StdioMode::Pipe`], in stdio
/// order.
pub(crate) struct SpawnedPipes {
  pub stdin: Option<OwnedFd>,
  pub stdout: Option<OwnedFd>,
  pub stderr: Option<OwnedFd>,
}

pub(crate) struct ProcessHandle {
  pid: Cell<Option<u32>>,
}

fn stdio_for(mode: StdioMode) -> Stdio {
  match mode {
    StdioMode::Ignore => Stdio::null(),
    StdioMode::Inherit => Stdio::inherit(),
    StdioMode::Pipe(_) => Stdio::piped(),
  }
}

impl ProcessHandle {
  pub fn new() -> Self {
    Self {
      pid: Cell::new(None),
    }
  }

  pub fn pid(&self) -> Option<u32> {
    self.pid.get()
  }

  pub fn spawn(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    options: &ProcessOptions,
  ) -> Result<SpawnedPipes, i32> {
    let mut command = tokio::process::Command::new(&options.file);
    command.args(&options.args);
    if let Some(env) = &options.env {
      command.env_clear();
      command.envs(env.iter().map(|(k, v)| (k, v)));
    }
    if let Some(cwd) = &options.cwd {
      command.current_dir(cwd);
    }
    if let Some(uid) = options.uid {
      command.uid(uid);
    }
    if let Some(gid) = options.gid {
      command.gid(gid);
    }
    if options.detached {
      command.process_group(0);
    }
    command
      .stdin(stdio_for(options.stdio[0]))
      .stdout(stdio_for(options.stdio[1]))
      .stderr(stdio_for(options.stdio[2]));

    let mut child = {
      let _guard = uv.enter();
      command.spawn().map_err(|e| errno::from_io_error(&e))?
    };
    self.pid.set(child.id());
    log::debug!("spawned {} as pid {:?}", options.file, child.id());

    let pipes = SpawnedPipes {
      stdin: child.stdin.take().and_then(|s| s.into_owned_fd().ok()),
      stdout: child.stdout.take().and_then(|s| s.into_owned_fd().ok()),
      stderr: child.stderr.take().and_then(|s| s.into_owned_fd().ok()),
    };

    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Exit, async move {
      let (exit_status, term_signal) = match child.wait().await {
        Ok(status) => (
          status.code().unwrap_or(0) as i64,
          status.signal().unwrap_or(0),
        ),
        Err(err) => (errno::from_io_error(&err) as i64, 0),
      };
      sink.post(Completion::Exit {
        rid,
        exit_status,
        term_signal,
      });
    });
    Ok(pipes)
  }

  pub fn kill(&self, signum: i32) -> Result<(), i32> {
    let pid = self.pid.get().ok_or(errno::UV_ESRCH)?;
    kill(pid as i32, signum)
  }
}

pub(crate) fn kill(pid: i32, signum: i32) -> Result<(), i32> {
  // SAFETY: kill(2) takes plain integers.
  if unsafe { libc::kill(pid, signum) } != 0 {
    return Err(errno::last_os_error());
  }
  Ok(())
}
