// Copyright 2018-2026 the Deno authors. MIT license.

//! Handle lifecycle and callback dispatch between a libuv-style event loop
//! and a host runtime.
//!
//! The host creates handles through [`UvBridge`] and gets back plain
//! [`ResourceId`]s. Operations take a [`HostCallback`]; when the loop later
//! completes the operation the bridge looks the handle up again by id, builds
//! the callback arguments as [`HostValue`]s and calls the closure. Pending
//! operations hold references on the handle, so a handle is never torn down
//! while a completion for it can still arrive.

#![deny(clippy::print_stderr)]
#![deny(clippy::print_stdout)]
#![deny(clippy::unused_async)]
#![deny(clippy::unnecessary_wraps)]
#![cfg(unix)]

mod bridge;
mod callback;
mod context;
pub mod errno;
mod error;
mod handle;
mod native;
mod ops;
mod options;
mod resources;
mod trampoline;
mod uv;
mod value;

pub use crate::bridge::UvBridge;
pub use crate::bridge::default_bridge;
pub use crate::callback::CallbackSlot;
pub use crate::callback::EventKind;
pub use crate::callback::HostCallback;
pub use crate::context::ContextGuard;
pub use crate::context::ExecutionContext;
pub use crate::error::BridgeError;
pub use crate::handle::HandleKind;
pub use crate::handle::HandleRecord;
pub use crate::handle::HandleState;
pub use crate::native::fs::FsRequest;
pub use crate::native::lock::HostLock;
pub use crate::native::lock::LockKind;
pub use crate::native::process::ProcessOptions;
pub use crate::native::process::StdioMode;
pub use crate::native::stream::TTY_MODE_IO;
pub use crate::native::stream::TTY_MODE_NORMAL;
pub use crate::native::stream::TTY_MODE_RAW;
pub use crate::native::udp::UDP_IPV6ONLY;
pub use crate::native::udp::UDP_JOIN_GROUP;
pub use crate::native::udp::UDP_LEAVE_GROUP;
pub use crate::native::udp::UDP_REUSEADDR;
pub use crate::native::watch::FS_EVENT_CHANGE;
pub use crate::native::watch::FS_EVENT_RENAME;
pub use crate::native::watch::POLL_READABLE;
pub use crate::native::watch::POLL_WRITABLE;
pub use crate::ops::kill;
pub use crate::options::BridgeOptions;
pub use crate::resources::ResourceId;
pub use crate::resources::ResourceTable;
pub use crate::uv::AsyncSender;
pub use crate::uv::RunMode;
pub use crate::value::FsStat;
pub use crate::value::HostValue;
