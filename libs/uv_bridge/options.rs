// Copyright 2018-2026 the Deno authors. MIT license.

const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_FS_READ_SIZE: usize = 8192;
const DEFAULT_THREADPOOL_SIZE: usize = 4;
const MAX_THREADPOOL_SIZE: usize = 1024;
const DEFAULT_LISTEN_BACKLOG: u32 = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
  /// Size of the buffer a stream read fills before it is handed to the host.
  pub read_buffer_size: usize,
  /// Bytes read by `fs_read` when the caller gives no length.
  pub fs_read_size: usize,
  /// Worker threads for file system and user work requests.
  pub threadpool_size: usize,
  /// Backlog used by `listen` when the caller passes 0.
  pub listen_backlog: u32,
}

impl Default for BridgeOptions {
  fn default() -> Self {
    Self {
      read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
      fs_read_size: DEFAULT_FS_READ_SIZE,
      threadpool_size: DEFAULT_THREADPOOL_SIZE,
      listen_backlog: DEFAULT_LISTEN_BACKLOG,
    }
  }
}

impl BridgeOptions {
  /// Defaults, with the worker count taken from `UV_THREADPOOL_SIZE` when it
  /// holds a positive integer.
  pub fn from_env() -> Self {
    let threadpool = std::env::var("UV_THREADPOOL_SIZE").ok();
    Self::default().with_threadpool_size(threadpool.as_deref())
  }

  fn with_threadpool_size(mut self, value: Option<&str>) -> Self {
    match value.map(|v| v.trim().parse::<usize>()) {
      Some(Ok(size)) if size > 0 => {
        self.threadpool_size = size.min(MAX_THREADPOOL_SIZE);
      }
      Some(_) => {
        log::debug!("ignoring invalid UV_THREADPOOL_SIZE {value:?}");
      }
      None => {}
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn threadpool_override() {
    let options = BridgeOptions::default().with_threadpool_size(Some("16"));
    assert_eq!(options.threadpool_size, 16);
    let options = BridgeOptions::default().with_threadpool_size(Some("0"));
    assert_eq!(options.threadpool_size, DEFAULT_THREADPOOL_SIZE);
    let options = BridgeOptions::default().with_threadpool_size(Some("lots"));
    assert_eq!(options.threadpool_size, DEFAULT_THREADPOOL_SIZE);
    let options =
      BridgeOptions::default().with_threadpool_size(Some("100000"));
    assert_eq!(options.threadpool_size, MAX_THREADPOOL_SIZE);
  }
}
