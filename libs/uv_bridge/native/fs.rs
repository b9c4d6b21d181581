// Copyright 2018-2026 the Deno authors. MIT license.

//! File system requests. Each one runs on the blocking pool and reports a
//! single result: a non-negative value on success (a descriptor, a byte count
//! or 0) or a negated errno.

use std::ffi::CString;
use std::fs;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::os::fd::FromRawFd;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::os::unix::fs::FileExt;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use bytes::Bytes;
use filetime::FileTime;

use crate::errno;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::FsPayload;
use crate::uv::TaskKind;
use crate::uv::UvLoop;
use crate::value::FsStat;

#[derive(Debug, Clone)]
pub enum FsRequest {
  Open { path: PathBuf, flags: i32, mode: u32 },
  Close { fd: RawFd },
  /// Reads at `offset`, or at the current position when it is negative.
  Read { fd: RawFd, offset: i64, len: usize },
  Write { fd: RawFd, data: Bytes, offset: i64 },
  Fsync { fd: RawFd },
  Fdatasync { fd: RawFd },
  Ftruncate { fd: RawFd, len: u64 },
  Unlink { path: PathBuf },
  Mkdir { path: PathBuf, mode: u32 },
  Rmdir { path: PathBuf },
  Rename { from: PathBuf, to: PathBuf },
  Link { from: PathBuf, to: PathBuf },
  /// `flags` only matter on Windows and are ignored here.
  Symlink { target: PathBuf, path: PathBuf, flags: i32 },
  Readlink { path: PathBuf },
  Chmod { path: PathBuf, mode: u32 },
  Fchmod { fd: RawFd, mode: u32 },
  Chown { path: PathBuf, uid: u32, gid: u32 },
  Fchown { fd: RawFd, uid: u32, gid: u32 },
  Utime { path: PathBuf, atime: f64, mtime: f64 },
  Futime { fd: RawFd, atime: f64, mtime: f64 },
  Stat { path: PathBuf },
  Lstat { path: PathBuf },
  Fstat { fd: RawFd },
  Readdir { path: PathBuf },
  Sendfile { out_fd: RawFd, in_fd: RawFd, offset: i64, len: usize },
}

impl FsRequest {
  pub fn name(&self) -> &'static str {
    match self {
      FsRequest::Open { .. } => "open",
      FsRequest::Close { .. } => "close",
      FsRequest::Read { .. } => "read",
      FsRequest::Write { .. } => "write",
      FsRequest::Fsync { .. } => "fsync",
      FsRequest::Fdatasync { .. } => "fdatasync",
      FsRequest::Ftruncate { .. } => "ftruncate",
      FsRequest::Unlink { .. } => "unlink",
      FsRequest::Mkdir { .. } => "mkdir",
      FsRequest::Rmdir { .. } => "rmdir",
      FsRequest::Rename { .. } => "rename",
      FsRequest::Link { .. } => "link",
      FsRequest::Symlink { .. } => "symlink",
      FsRequest::Readlink { .. } => "readlink",
      FsRequest::Chmod { .. } => "chmod",
      FsRequest::Fchmod { .. } => "fchmod",
      FsRequest::Chown { .. } => "chown",
      FsRequest::Fchown { .. } => "fchown",
      FsRequest::Utime { .. } => "utime",
      FsRequest::Futime { .. } => "futime",
      FsRequest::Stat { .. } => "stat",
      FsRequest::Lstat { .. } => "lstat",
      FsRequest::Fstat { .. } => "fstat",
      FsRequest::Readdir { .. } => "readdir",
      FsRequest::Sendfile { .. } => "sendfile",
    }
  }

  pub(crate) fn spawn(self, uv: &UvLoop, rid: ResourceId) {
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Request, async move {
      let name = self.name();
      let failed = self.failure_payload();
      let (result, payload) =
        match tokio::task::spawn_blocking(move || self.execute()).await {
          Ok(Ok((result, payload))) => (result, payload),
          Ok(Err(err)) => (errno::from_io_error(&err) as i64, failed),
          Err(err) => {
            log::debug!("fs {name} did not finish: {err}");
            (errno::UV_ECANCELED as i64, failed)
          }
        };
      sink.post(Completion::Fs {
        rid,
        result,
        payload,
      });
    });
  }

  /// Payload delivered when the request fails. Reads keep their buffer
  /// argument so the callback shape does not depend on the outcome.
  fn failure_payload(&self) -> FsPayload {
    match self {
      FsRequest::Read { .. } => FsPayload::Data(None),
      _ => FsPayload::None,
    }
  }

  /// Runs the request on the calling thread.
  pub fn execute(self) -> io::Result<(i64, FsPayload)> {
    let done = |result: i64| Ok((result, FsPayload::None));
    match self {
      FsRequest::Open { path, flags, mode } => {
        let path = CString::new(path.as_os_str().as_bytes())
          .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
        // SAFETY: path is a valid NUL terminated string.
        let fd = unsafe {
          libc::open(
            path.as_ptr(),
            flags | libc::O_CLOEXEC,
            mode as libc::c_uint,
          )
        };
        if fd < 0 {
          return Err(io::Error::last_os_error());
        }
        done(fd as i64)
      }
      FsRequest::Close { fd } => {
        // SAFETY: the caller hands over ownership of fd.
        if unsafe { libc::close(fd) } != 0 {
          return Err(io::Error::last_os_error());
        }
        done(0)
      }
      FsRequest::Read { fd, offset, len } => {
        let mut buf = vec![0u8; len];
        let n = with_fd(fd, |mut file| {
          if offset < 0 {
            file.read(&mut buf)
          } else {
            file.read_at(&mut buf, offset as u64)
          }
        })?;
        buf.truncate(n);
        let data = (n > 0).then(|| Bytes::from(buf));
        Ok((n as i64, FsPayload::Data(data)))
      }
      FsRequest::Write { fd, data, offset } => {
        let n = with_fd(fd, |mut file| {
          if offset < 0 {
            file.write(&data)
          } else {
            file.write_at(&data, offset as u64)
          }
        })?;
        done(n as i64)
      }
      FsRequest::Fsync { fd } => {
        with_fd(fd, |file| file.sync_all())?;
        done(0)
      }
      FsRequest::Fdatasync { fd } => {
        with_fd(fd, |file| file.sync_data())?;
        done(0)
      }
      FsRequest::Ftruncate { fd, len } => {
        with_fd(fd, |file| file.set_len(len))?;
        done(0)
      }
      FsRequest::Unlink { path } => {
        fs::remove_file(path)?;
        done(0)
      }
      FsRequest::Mkdir { path, mode } => {
        let mut builder = fs::DirBuilder::new();
        builder.mode(mode);
        builder.create(path)?;
        done(0)
      }
      FsRequest::Rmdir { path } => {
        fs::remove_dir(path)?;
        done(0)
      }
      FsRequest::Rename { from, to } => {
        fs::rename(from, to)?;
        done(0)
      }
      FsRequest::Link { from, to } => {
        fs::hard_link(from, to)?;
        done(0)
      }
      FsRequest::Symlink { target, path, .. } => {
        std::os::unix::fs::symlink(target, path)?;
        done(0)
      }
      FsRequest::Readlink { path } => {
        let target = fs::read_link(path)?;
        Ok((
          0,
          FsPayload::Path(target.to_string_lossy().into_owned()),
        ))
      }
      FsRequest::Chmod { path, mode } => {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        done(0)
      }
      FsRequest::Fchmod { fd, mode } => {
        with_fd(fd, |file| {
          file.set_permissions(fs::Permissions::from_mode(mode))
        })?;
        done(0)
      }
      FsRequest::Chown { path, uid, gid } => {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
        done(0)
      }
      FsRequest::Fchown { fd, uid, gid } => {
        with_fd(fd, |file| {
          std::os::unix::fs::fchown(file, Some(uid), Some(gid))
        })?;
        done(0)
      }
      FsRequest::Utime { path, atime, mtime } => {
        filetime::set_file_times(path, file_time(atime), file_time(mtime))?;
        done(0)
      }
      FsRequest::Futime { fd, atime, mtime } => {
        with_fd(fd, |file| {
          filetime::set_file_handle_times(
            file,
            Some(file_time(atime)),
            Some(file_time(mtime)),
          )
        })?;
        done(0)
      }
      FsRequest::Stat { path } => {
        let metadata = fs::metadata(path)?;
        Ok((0, FsPayload::Stat(FsStat::from(&metadata))))
      }
      FsRequest::Lstat { path } => {
        let metadata = fs::symlink_metadata(path)?;
        Ok((0, FsPayload::Stat(FsStat::from(&metadata))))
      }
      FsRequest::Fstat { fd } => {
        let metadata = with_fd(fd, |file| file.metadata())?;
        Ok((0, FsPayload::Stat(FsStat::from(&metadata))))
      }
      FsRequest::Readdir { path } => {
        let mut names = fs::read_dir(path)?
          .map(|entry| {
            entry.map(|e| e.file_name().to_string_lossy().into_owned())
          })
          .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok((names.len() as i64, FsPayload::Entries(names)))
      }
      FsRequest::Sendfile {
        out_fd,
        in_fd,
        offset,
        len,
      } => {
        let sent = with_fd(in_fd, |input| {
          with_fd(out_fd, |mut output| {
            let mut buf = vec![0u8; len.min(64 * 1024).max(1)];
            let mut sent = 0usize;
            while sent < len {
              let want = (len - sent).min(buf.len());
              let at = offset.max(0) as u64 + sent as u64;
              let n = input.read_at(&mut buf[..want], at)?;
              if n == 0 {
                break;
              }
              output.write_all(&buf[..n])?;
              sent += n;
            }
            Ok(sent)
          })
        })?;
        done(sent as i64)
      }
    }
  }
}

fn file_time(secs: f64) -> FileTime {
  let whole = secs.floor();
  let nanos = ((secs - whole) * 1e9) as u32;
  FileTime::from_unix_time(whole as i64, nanos)
}

/// Borrows `fd` as a `File` without taking ownership of it.
fn with_fd<T>(
  fd: RawFd,
  f: impl FnOnce(&File) -> io::Result<T>,
) -> io::Result<T> {
  if fd < 0 {
    return Err(io::Error::from_raw_os_error(libc::EBADF));
  }
  // SAFETY: the descriptor stays owned by the host; ManuallyDrop keeps the
  // temporary File from closing it.
  let file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
  f(&file)
}
