// Copyright 2018-2026 the Deno authors. MIT license.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::net::Shutdown;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use socket2::SockRef;
use socket2::TcpKeepalive;
use tokio::io::unix::AsyncFd;
use tokio::net::TcpListener;
use tokio::net::TcpSocket;
use tokio::net::TcpStream;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::Notify;

use crate::errno;
use crate::handle::HandleKind;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::CompletionSink;
use crate::uv::TaskKind;
use crate::uv::UvLoop;

pub const TTY_MODE_NORMAL: i32 = 0;
pub const TTY_MODE_RAW: i32 = 1;
pub const TTY_MODE_IO: i32 = 2;

pub(crate) enum StreamSocket {
  Tcp(TcpStream),
  Unix(UnixStream),
  Fd(AsyncFd<File>),
}

impl StreamSocket {
  async fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
    match self {
      StreamSocket::Tcp(s) => loop {
        s.readable().await?;
        match s.try_read(buf) {
          Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
          result => return result,
        }
      },
      StreamSocket::Unix(s) => loop {
        s.readable().await?;
        match s.try_read(buf) {
          Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
          result => return result,
        }
      },
      StreamSocket::Fd(fd) => loop {
        let mut guard = fd.readable().await?;
        match guard.try_io(|inner| {
          let mut file = inner.get_ref();
          file.read(buf)
        }) {
          Ok(result) => return result,
          Err(_would_block) => continue,
        }
      },
    }
  }

  async fn write_some(&self, data: &[u8]) -> io::Result<usize> {
    match self {
      StreamSocket::Tcp(s) => loop {
        s.writable().await?;
        match s.try_write(data) {
          Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
          result => return result,
        }
      },
      StreamSocket::Unix(s) => loop {
        s.writable().await?;
        match s.try_write(data) {
          Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
          result => return result,
        }
      },
      StreamSocket::Fd(fd) => loop {
        let mut guard = fd.writable().await?;
        match guard.try_io(|inner| {
          let mut file = inner.get_ref();
          file.write(data)
        }) {
          Ok(result) => return result,
          Err(_would_block) => continue,
        }
      },
    }
  }

  async fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
      let n = self.write_some(data).await?;
      if n == 0 {
        return Err(io::ErrorKind::WriteZero.into());
      }
      data = &data[n..];
    }
    Ok(())
  }

  fn shutdown(&self) -> io::Result<()> {
    match self {
      StreamSocket::Tcp(s) => SockRef::from(s).shutdown(Shutdown::Write),
      StreamSocket::Unix(s) => SockRef::from(s).shutdown(Shutdown::Write),
      StreamSocket::Fd(fd) => {
        SockRef::from(fd.get_ref()).shutdown(Shutdown::Write)
      }
    }
  }

  fn raw_fd(&self) -> RawFd {
    match self {
      StreamSocket::Tcp(s) => s.as_raw_fd(),
      StreamSocket::Unix(s) => s.as_raw_fd(),
      StreamSocket::Fd(fd) => fd.as_raw_fd(),
    }
  }
}

enum Bound {
  Tcp(TcpSocket),
  Pipe(std::os::unix::net::UnixListener),
}

enum Listener {
  Tcp(TcpListener),
  Unix(UnixListener),
}

impl Listener {
  async fn accept(&self) -> io::Result<StreamSocket> {
    match self {
      Listener::Tcp(l) => l.accept().await.map(|(s, _)| StreamSocket::Tcp(s)),
      Listener::Unix(l) => {
        l.accept().await.map(|(s, _)| StreamSocket::Unix(s))
      }
    }
  }
}

enum WriteOp {
  Data(Bytes),
  Shutdown,
}

struct TtyState {
  original: Option<libc::termios>,
}

/// Native side of a TCP, pipe or TTY handle.
#[derive(Clone)]
pub(crate) struct StreamHandle(Rc<StreamInner>);

struct StreamInner {
  kind: HandleKind,
  ipc: bool,
  socket: RefCell<Option<Rc<StreamSocket>>>,
  bound: RefCell<Option<Bound>>,
  listener: RefCell<Option<Rc<Listener>>>,
  // At most one connection waits here; the listener pauses until it is
  // taken by `accept`.
  accepted: RefCell<VecDeque<StreamSocket>>,
  drained: Notify,
  // Writes and shutdowns complete in submission order.
  writes: RefCell<VecDeque<WriteOp>>,
  writing: Cell<bool>,
  connecting: Cell<bool>,
  nodelay: Cell<bool>,
  readable: Cell<bool>,
  writable: Cell<bool>,
  tty: RefCell<Option<TtyState>>,
}

impl StreamHandle {
  pub fn new(kind: HandleKind, ipc: bool) -> Self {
    Self(Rc::new(StreamInner {
      kind,
      ipc,
      socket: RefCell::new(None),
      bound: RefCell::new(None),
      listener: RefCell::new(None),
      accepted: RefCell::new(VecDeque::new()),
      drained: Notify::new(),
      writes: RefCell::new(VecDeque::new()),
      writing: Cell::new(false),
      connecting: Cell::new(false),
      nodelay: Cell::new(false),
      readable: Cell::new(false),
      writable: Cell::new(false),
      tty: RefCell::new(None),
    }))
  }

  pub fn is_ipc(&self) -> bool {
    self.0.ipc
  }

  pub fn is_readable(&self) -> bool {
    self.0.readable.get()
  }

  pub fn is_writable(&self) -> bool {
    self.0.writable.get()
  }

  fn socket(&self) -> Option<Rc<StreamSocket>> {
    self.0.socket.borrow().clone()
  }

  fn install(&self, socket: StreamSocket, readable: bool, writable: bool) {
    if let StreamSocket::Tcp(s) = &socket {
      if self.0.nodelay.get() {
        if let Err(err) = s.set_nodelay(true) {
          log::debug!("set_nodelay failed: {err}");
        }
      }
    }
    self.0.readable.set(readable);
    self.0.writable.set(writable);
    *self.0.socket.borrow_mut() = Some(Rc::new(socket));
  }

  fn ensure_unconnected(&self) -> Result<(), i32> {
    if self.0.socket.borrow().is_some() {
      return Err(errno::UV_EISCONN);
    }
    if self.0.connecting.get() {
      return Err(errno::UV_EALREADY);
    }
    Ok(())
  }

  pub fn tcp_bind(&self, uv: &UvLoop, addr: SocketAddr) -> Result<(), i32> {
    self.ensure_unconnected()?;
    let _guard = uv.enter();
    let socket = if addr.is_ipv4() {
      TcpSocket::new_v4()
    } else {
      TcpSocket::new_v6()
    }
    .map_err(|e| errno::from_io_error(&e))?;
    socket
      .set_reuseaddr(true)
      .and_then(|_| socket.bind(addr))
      .map_err(|e| errno::from_io_error(&e))?;
    *self.0.bound.borrow_mut() = Some(Bound::Tcp(socket));
    Ok(())
  }

  pub fn pipe_bind(&self, path: &Path) -> Result<(), i32> {
    self.ensure_unconnected()?;
    let listener = std::os::unix::net::UnixListener::bind(path)
      .and_then(|l| l.set_nonblocking(true).map(|_| l))
      .map_err(|e| errno::from_io_error(&e))?;
    *self.0.bound.borrow_mut() = Some(Bound::Pipe(listener));
    Ok(())
  }

  pub fn listen(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    backlog: u32,
  ) -> Result<(), i32> {
    if self.0.listener.borrow().is_some() {
      return Ok(());
    }
    let bound = self.0.bound.borrow_mut().take().ok_or(errno::UV_EINVAL)?;
    let listener = {
      let _guard = uv.enter();
      match bound {
        Bound::Tcp(socket) => socket.listen(backlog).map(Listener::Tcp),
        Bound::Pipe(listener) => {
          UnixListener::from_std(listener).map(Listener::Unix)
        }
      }
      .map_err(|e| errno::from_io_error(&e))?
    };
    let listener = Rc::new(listener);
    *self.0.listener.borrow_mut() = Some(listener.clone());
    let stream = self.clone();
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Listen, async move {
      loop {
        match listener.accept().await {
          Ok(socket) => {
            stream.0.accepted.borrow_mut().push_back(socket);
            sink.post(Completion::Listen { rid, status: 0 });
            while !stream.0.accepted.borrow().is_empty() {
              stream.0.drained.notified().await;
            }
          }
          Err(err) => {
            sink.post(Completion::Listen {
              rid,
              status: errno::from_io_error(&err),
            });
            break;
          }
        }
      }
    });
    Ok(())
  }

  pub fn accept(&self, client: &StreamHandle) -> Result<(), i32> {
    client.ensure_unconnected()?;
    let socket = self
      .0
      .accepted
      .borrow_mut()
      .pop_front()
      .ok_or(errno::UV_EAGAIN)?;
    self.0.drained.notify_one();
    client.install(socket, true, true);
    Ok(())
  }

  pub fn connect_tcp(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    addr: SocketAddr,
  ) -> Result<(), i32> {
    self.ensure_unconnected()?;
    let bound = match self.0.bound.borrow_mut().take() {
      Some(Bound::Tcp(socket)) => Some(socket),
      Some(Bound::Pipe(_)) => return Err(errno::UV_EINVAL),
      None => None,
    };
    self.0.connecting.set(true);
    let stream = self.clone();
    let sink = uv.sink();
    uv.spawn(rid, TaskKind::Connect, async move {
      let result = match bound {
        Some(socket) => socket.connect(addr).await,
        None => TcpStream::connect(addr).await,
      };
      stream
        .finish_connect(rid, &sink, result.map(StreamSocket::Tcp))
        .await;
    });
    Ok(())
  }

  pub fn connect_pipe(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    path: &Path,
  ) -> Result<(), i32> {
    self.ensure_unconnected()?;
    self.0.connecting.set(true);
    let stream = self.clone();
    let sink = uv.sink();
    let path = path.to_path_buf();
    uv.spawn(rid, TaskKind::Connect, async move {
      let result = UnixStream::connect(&path).await;
      stream
        .finish_connect(rid, &sink, result.map(StreamSocket::Unix))
        .await;
    });
    Ok(())
  }

  async fn finish_connect(
    &self,
    rid: ResourceId,
    sink: &CompletionSink,
    result: io::Result<StreamSocket>,
  ) {
    self.0.connecting.set(false);
    match result {
      Ok(socket) => {
        self.install(socket, true, true);
        sink.post(Completion::Connect { rid, status: 0 });
        // Writes queued while connecting go out now.
        if let Some(socket) = self.socket() {
          if !self.0.writing.get() && !self.0.writes.borrow().is_empty() {
            self.0.writing.set(true);
            self.flush_writes(socket, rid, sink).await;
          }
        }
      }
      Err(err) => {
        sink.post(Completion::Connect {
          rid,
          status: errno::from_io_error(&err),
        });
        self.cancel_writes(rid, sink);
      }
    }
  }

  /// Wraps an existing descriptor, taking ownership of it.
  pub fn open_fd(
    &self,
    uv: &UvLoop,
    fd: OwnedFd,
    readable: bool,
    writable: bool,
  ) -> Result<(), i32> {
    self.ensure_unconnected()?;
    set_nonblocking(fd.as_raw_fd())?;
    let file = File::from(fd);
    let async_fd = {
      let _guard = uv.enter();
      AsyncFd::new(file).map_err(|e| errno::from_io_error(&e))?
    };
    self.install(StreamSocket::Fd(async_fd), readable, writable);
    Ok(())
  }

  pub fn tty_init(
    &self,
    uv: &UvLoop,
    fd: RawFd,
    readable: bool,
  ) -> Result<(), i32> {
    // SAFETY: dup returns a fresh descriptor we own, or -1.
    let dup = unsafe { libc::dup(fd) };
    if dup < 0 {
      return Err(errno::last_os_error());
    }
    // SAFETY: `dup` is a valid descriptor owned by nobody else.
    let owned = unsafe { OwnedFd::from_raw_fd(dup) };
    self.open_fd(uv, owned, readable, !readable)?;
    *self.0.tty.borrow_mut() = Some(TtyState { original: None });
    Ok(())
  }

  pub fn read_start(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    buffer_size: usize,
    read2: bool,
  ) -> Result<(), i32> {
    let socket = self.socket().ok_or(errno::UV_ENOTCONN)?;
    let sink = uv.sink();
    let pending = read2.then_some(0);
    uv.spawn(rid, TaskKind::Read, async move {
      let mut buf = vec![0u8; buffer_size.max(1)];
      loop {
        match socket.read_some(&mut buf).await {
          Ok(0) => {
            sink.post(Completion::Read {
              rid,
              nread: errno::UV_EOF as isize,
              buf: None,
              pending,
            });
            break;
          }
          Ok(n) => sink.post(Completion::Read {
            rid,
            nread: n as isize,
            buf: Some(Bytes::copy_from_slice(&buf[..n])),
            pending,
          }),
          Err(err) => {
            sink.post(Completion::Read {
              rid,
              nread: errno::from_io_error(&err) as isize,
              buf: None,
              pending,
            });
            break;
          }
        }
      }
    });
    Ok(())
  }

  pub fn read_stop(&self, uv: &UvLoop, rid: ResourceId) {
    uv.abort(rid, TaskKind::Read);
  }

  pub fn write(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    data: Bytes,
  ) -> Result<(), i32> {
    self.enqueue(uv, rid, WriteOp::Data(data))
  }

  pub fn shutdown(&self, uv: &UvLoop, rid: ResourceId) -> Result<(), i32> {
    self.enqueue(uv, rid, WriteOp::Shutdown)
  }

  fn enqueue(
    &self,
    uv: &UvLoop,
    rid: ResourceId,
    op: WriteOp,
  ) -> Result<(), i32> {
    let socket = self.socket();
    if socket.is_none() && !self.0.connecting.get() {
      return Err(errno::UV_ENOTCONN);
    }
    self.0.writes.borrow_mut().push_back(op);
    let Some(socket) = socket else {
      return Ok(());
    };
    if !self.0.writing.get() {
      self.0.writing.set(true);
      let stream = self.clone();
      let sink = uv.sink();
      uv.spawn(rid, TaskKind::Write, async move {
        stream.flush_writes(socket, rid, &sink).await;
      });
    }
    Ok(())
  }

  async fn flush_writes(
    &self,
    socket: Rc<StreamSocket>,
    rid: ResourceId,
    sink: &CompletionSink,
  ) {
    loop {
      let next = match self.0.writes.borrow().front() {
        Some(WriteOp::Data(data)) => Some(WriteOp::Data(data.clone())),
        Some(WriteOp::Shutdown) => Some(WriteOp::Shutdown),
        None => None,
      };
      let completion = match next {
        Some(WriteOp::Data(data)) => {
          let status = match socket.write_all(&data).await {
            Ok(()) => 0,
            Err(err) => errno::from_io_error(&err),
          };
          Completion::Write { rid, status }
        }
        Some(WriteOp::Shutdown) => {
          let status = match socket.shutdown() {
            Ok(()) => 0,
            Err(err) => errno::from_io_error(&err),
          };
          self.0.writable.set(false);
          Completion::Shutdown { rid, status }
        }
        None => {
          self.0.writing.set(false);
          return;
        }
      };
      // Pop only once finished so a close while the write is in flight can
      // still cancel it.
      self.0.writes.borrow_mut().pop_front();
      sink.post(completion);
    }
  }

  fn cancel_writes(&self, rid: ResourceId, sink: &CompletionSink) {
    let ops: Vec<_> = self.0.writes.borrow_mut().drain(..).collect();
    self.0.writing.set(false);
    for op in ops {
      let status = errno::UV_ECANCELED;
      sink.post(match op {
        WriteOp::Data(_) => Completion::Write { rid, status },
        WriteOp::Shutdown => Completion::Shutdown { rid, status },
      });
    }
  }

  /// Fails every request still owned by the stream with `ECANCELED`. Called
  /// when the handle starts closing, before its tasks are aborted.
  pub fn cancel_pending(&self, rid: ResourceId, sink: &CompletionSink) {
    if self.0.connecting.replace(false) {
      sink.post(Completion::Connect {
        rid,
        status: errno::UV_ECANCELED,
      });
    }
    self.cancel_writes(rid, sink);
    self.0.readable.set(false);
    self.0.writable.set(false);
    let _ = self.reset_mode();
  }

  pub fn set_nodelay(&self, enable: bool) -> Result<(), i32> {
    self.0.nodelay.set(enable);
    match self.socket().as_deref() {
      Some(StreamSocket::Tcp(s)) => {
        s.set_nodelay(enable).map_err(|e| errno::from_io_error(&e))
      }
      _ => Ok(()),
    }
  }

  pub fn set_keepalive(&self, enable: bool, delay: u32) -> Result<(), i32> {
    let socket = self.socket().ok_or(errno::UV_ENOTCONN)?;
    let StreamSocket::Tcp(s) = &*socket else {
      return Err(errno::UV_ENOTSUP);
    };
    let sock = SockRef::from(s);
    let result = if enable {
      sock.set_tcp_keepalive(
        &TcpKeepalive::new().with_time(Duration::from_secs(delay as u64)),
      )
    } else {
      sock.set_keepalive(false)
    };
    result.map_err(|e| errno::from_io_error(&e))
  }

  pub fn local_addr(&self) -> Result<SocketAddr, i32> {
    if let Some(socket) = self.socket() {
      return match &*socket {
        StreamSocket::Tcp(s) => s.local_addr(),
        _ => return Err(errno::UV_ENOTSUP),
      }
      .map_err(|e| errno::from_io_error(&e));
    }
    if let Some(listener) = self.0.listener.borrow().as_ref() {
      return match &**listener {
        Listener::Tcp(l) => l.local_addr(),
        Listener::Unix(_) => return Err(errno::UV_ENOTSUP),
      }
      .map_err(|e| errno::from_io_error(&e));
    }
    match self.0.bound.borrow().as_ref() {
      Some(Bound::Tcp(s)) => s.local_addr().map_err(|e| errno::from_io_error(&e)),
      Some(Bound::Pipe(_)) => Err(errno::UV_ENOTSUP),
      None => Err(errno::UV_EBADF),
    }
  }

  pub fn peer_addr(&self) -> Result<SocketAddr, i32> {
    let socket = self.socket().ok_or(errno::UV_ENOTCONN)?;
    match &*socket {
      StreamSocket::Tcp(s) => s.peer_addr().map_err(|e| errno::from_io_error(&e)),
      _ => Err(errno::UV_ENOTSUP),
    }
  }

  fn tty_fd(&self) -> Result<RawFd, i32> {
    if self.0.tty.borrow().is_none() {
      return Err(errno::UV_EINVAL);
    }
    self
      .socket()
      .map(|socket| socket.raw_fd())
      .ok_or(errno::UV_EBADF)
  }

  pub fn get_winsize(&self) -> Result<(i32, i32), i32> {
    let fd = self.tty_fd()?;
    // SAFETY: winsize is plain data and TIOCGWINSZ only writes into it.
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    // SAFETY: fd is a descriptor owned by this handle.
    if unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) } != 0 {
      return Err(errno::last_os_error());
    }
    Ok((ws.ws_col as i32, ws.ws_row as i32))
  }

  pub fn set_mode(&self, mode: i32) -> Result<(), i32> {
    let fd = self.tty_fd()?;
    // SAFETY: termios is plain data filled in by tcgetattr.
    let mut current: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: fd is a descriptor owned by this handle.
    if unsafe { libc::tcgetattr(fd, &mut current) } != 0 {
      return Err(errno::last_os_error());
    }
    let original = {
      let mut tty = self.0.tty.borrow_mut();
      let state = tty.as_mut().ok_or(errno::UV_EINVAL)?;
      *state.original.get_or_insert(current)
    };
    let mut next = original;
    match mode {
      TTY_MODE_NORMAL => {}
      TTY_MODE_RAW => {
        next.c_iflag &= !(libc::BRKINT
          | libc::ICRNL
          | libc::INPCK
          | libc::ISTRIP
          | libc::IXON);
        next.c_oflag |= libc::ONLCR;
        next.c_cflag |= libc::CS8;
        next.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
        next.c_cc[libc::VMIN] = 1;
        next.c_cc[libc::VTIME] = 0;
      }
      TTY_MODE_IO => {
        // SAFETY: next is a valid termios value.
        unsafe { libc::cfmakeraw(&mut next) };
      }
      _ => return Err(errno::UV_EINVAL),
    }
    // SAFETY: fd is a descriptor owned by this handle.
    if unsafe { libc::tcsetattr(fd, libc::TCSADRAIN, &next) } != 0 {
      return Err(errno::last_os_error());
    }
    Ok(())
  }

  pub fn reset_mode(&self) -> Result<(), i32> {
    let original = self
      .0
      .tty
      .borrow_mut()
      .as_mut()
      .and_then(|state| state.original.take());
    let Some(original) = original else {
      return Ok(());
    };
    let fd = self.tty_fd()?;
    // SAFETY: fd is a descriptor owned by this handle.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &original) } != 0 {
      return Err(errno::last_os_error());
    }
    Ok(())
  }

  pub fn kind(&self) -> HandleKind {
    self.0.kind
  }
}

fn set_nonblocking(fd: RawFd) -> Result<(), i32> {
  // SAFETY: fcntl on a valid descriptor with integer arguments.
  let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
  if flags < 0 {
    return Err(errno::last_os_error());
  }
  // SAFETY: as above.
  if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
    return Err(errno::last_os_error());
  }
  Ok(())
}
