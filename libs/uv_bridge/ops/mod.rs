// Copyright 2018-2026 the Deno authors. MIT license.

//! Host entry points, grouped by handle family. Each module adds an
//! `impl UvBridge` block.

mod async_handle;
mod dns;
mod fs;
mod lock;
mod process;
mod stream;
mod timer;
mod tty;
mod udp;
mod watch;
mod watcher;
mod work;

pub use process::kill;
