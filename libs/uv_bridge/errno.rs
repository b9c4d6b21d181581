// Copyright 2018-2026 the Deno authors. MIT license.

//! Native status codes. Every failure delivered to a host callback is a
//! negated errno value, except for the few codes libuv defines outside the
//! errno range.

use std::io;

pub const UV_EOF: i32 = -4095;
pub const UV_EAI_NONAME: i32 = -3008;

pub const UV_EPERM: i32 = -libc::EPERM;
pub const UV_ENOENT: i32 = -libc::ENOENT;
pub const UV_EIO: i32 = -libc::EIO;
pub const UV_EBADF: i32 = -libc::EBADF;
pub const UV_EAGAIN: i32 = -libc::EAGAIN;
pub const UV_EACCES: i32 = -libc::EACCES;
pub const UV_EBUSY: i32 = -libc::EBUSY;
pub const UV_EEXIST: i32 = -libc::EEXIST;
pub const UV_ENOTDIR: i32 = -libc::ENOTDIR;
pub const UV_EISDIR: i32 = -libc::EISDIR;
pub const UV_EINVAL: i32 = -libc::EINVAL;
pub const UV_EPIPE: i32 = -libc::EPIPE;
pub const UV_ENOSYS: i32 = -libc::ENOSYS;
pub const UV_ENOTEMPTY: i32 = -libc::ENOTEMPTY;
pub const UV_ENOTSOCK: i32 = -libc::ENOTSOCK;
pub const UV_ENOTSUP: i32 = -libc::ENOTSUP;
pub const UV_EADDRINUSE: i32 = -libc::EADDRINUSE;
pub const UV_EADDRNOTAVAIL: i32 = -libc::EADDRNOTAVAIL;
pub const UV_ECONNABORTED: i32 = -libc::ECONNABORTED;
pub const UV_ECONNRESET: i32 = -libc::ECONNRESET;
pub const UV_EISCONN: i32 = -libc::EISCONN;
pub const UV_ENOTCONN: i32 = -libc::ENOTCONN;
pub const UV_ETIMEDOUT: i32 = -libc::ETIMEDOUT;
pub const UV_ECONNREFUSED: i32 = -libc::ECONNREFUSED;
pub const UV_EALREADY: i32 = -libc::EALREADY;
pub const UV_ECANCELED: i32 = -libc::ECANCELED;
pub const UV_ESRCH: i32 = -libc::ESRCH;
pub const UV_ENOTTY: i32 = -libc::ENOTTY;

const NAMES: &[(i32, &str, &str)] = &[
  (UV_EOF, "EOF", "end of file"),
  (UV_EAI_NONAME, "EAI_NONAME", "unknown node or service"),
  (UV_EPERM, "EPERM", "operation not permitted"),
  (UV_ENOENT, "ENOENT", "no such file or directory"),
  (UV_EIO, "EIO", "i/o error"),
  (UV_EBADF, "EBADF", "bad file descriptor"),
  (UV_EAGAIN, "EAGAIN", "resource temporarily unavailable"),
  (UV_EACCES, "EACCES", "permission denied"),
  (UV_EBUSY, "EBUSY", "resource busy or locked"),
  (UV_EEXIST, "EEXIST", "file already exists"),
  (UV_ENOTDIR, "ENOTDIR", "not a directory"),
  (UV_EISDIR, "EISDIR", "illegal operation on a directory"),
  (UV_EINVAL, "EINVAL", "invalid argument"),
  (UV_EPIPE, "EPIPE", "broken pipe"),
  (UV_ENOSYS, "ENOSYS", "function not implemented"),
  (UV_ENOTEMPTY, "ENOTEMPTY", "directory not empty"),
  (UV_ENOTSOCK, "ENOTSOCK", "socket operation on non-socket"),
  (UV_ENOTSUP, "ENOTSUP", "operation not supported on socket"),
  (UV_EADDRINUSE, "EADDRINUSE", "address already in use"),
  (UV_EADDRNOTAVAIL, "EADDRNOTAVAIL", "address not available"),
  (UV_ECONNABORTED, "ECONNABORTED", "software caused connection abort"),
  (UV_ECONNRESET, "ECONNRESET", "connection reset by peer"),
  (UV_EISCONN, "EISCONN", "socket is already connected"),
  (UV_ENOTCONN, "ENOTCONN", "socket is not connected"),
  (UV_ETIMEDOUT, "ETIMEDOUT", "connection timed out"),
  (UV_ECONNREFUSED, "ECONNREFUSED", "connection refused"),
  (UV_EALREADY, "EALREADY", "connection already in progress"),
  (UV_ECANCELED, "ECANCELED", "operation canceled"),
  (UV_ESRCH, "ESRCH", "no such process"),
  (UV_ENOTTY, "ENOTTY", "inappropriate ioctl for device"),
];

/// Symbolic name of a status code, e.g. `ECONNREFUSED`.
pub fn err_name(code: i32) -> &'static str {
  NAMES
    .iter()
    .find(|(c, _, _)| *c == code)
    .map(|(_, name, _)| *name)
    .unwrap_or("UNKNOWN")
}

/// Human readable description of a status code.
pub fn strerror(code: i32) -> String {
  if let Some((_, _, message)) = NAMES.iter().find(|(c, _, _)| *c == code) {
    return (*message).to_string();
  }
  if code < 0 {
    let err = io::Error::from_raw_os_error(-code);
    let message = err.to_string();
    // Drop the " (os error N)" suffix std appends.
    return match message.rfind(" (os error") {
      Some(idx) => message[..idx].to_lowercase(),
      None => message,
    };
  }
  format!("unknown error {code}")
}

pub fn from_io_error(err: &io::Error) -> i32 {
  if let Some(code) = err.raw_os_error() {
    return -code;
  }
  match err.kind() {
    io::ErrorKind::NotFound => UV_ENOENT,
    io::ErrorKind::PermissionDenied => UV_EACCES,
    io::ErrorKind::ConnectionRefused => UV_ECONNREFUSED,
    io::ErrorKind::ConnectionReset => UV_ECONNRESET,
    io::ErrorKind::ConnectionAborted => UV_ECONNABORTED,
    io::ErrorKind::NotConnected => UV_ENOTCONN,
    io::ErrorKind::AddrInUse => UV_EADDRINUSE,
    io::ErrorKind::AddrNotAvailable => UV_EADDRNOTAVAIL,
    io::ErrorKind::BrokenPipe => UV_EPIPE,
    io::ErrorKind::AlreadyExists => UV_EEXIST,
    io::ErrorKind::WouldBlock => UV_EAGAIN,
    io::ErrorKind::InvalidInput => UV_EINVAL,
    io::ErrorKind::TimedOut => UV_ETIMEDOUT,
    io::ErrorKind::Unsupported => UV_ENOTSUP,
    io::ErrorKind::UnexpectedEof => UV_EOF,
    _ => UV_EIO,
  }
}

pub(crate) fn last_os_error() -> i32 {
  from_io_error(&io::Error::last_os_error())
}
