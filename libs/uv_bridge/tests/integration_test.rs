// Copyright 2018-2026 the Deno authors. MIT license.

mod helpers;

use std::cell::Cell;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::rc::Rc;

use bytes::Bytes;
use helpers::Calls;
use helpers::bridge;
use pretty_assertions::assert_eq;
use uv_bridge::BridgeError;
use uv_bridge::HandleKind;
use uv_bridge::HandleState;
use uv_bridge::HostCallback;
use uv_bridge::HostValue;
use uv_bridge::ProcessOptions;
use uv_bridge::RunMode;
use uv_bridge::StdioMode;
use uv_bridge::errno;

#[test]
fn timer_fires_once_and_returns_its_reference() {
  let bridge = bridge();
  let rid = bridge.create(HandleKind::Timer).unwrap();
  assert_eq!(bridge.refcount(rid), Some(1));

  let calls = Calls::default();
  bridge.timer_start(rid, 10, 0, Some(calls.callback())).unwrap();
  assert_eq!(bridge.refcount(rid), Some(2));
  assert!(bridge.is_active(rid));

  let started = bridge.now();
  assert!(!bridge.run(RunMode::Default));
  assert!(bridge.now() >= started + 10);
  assert_eq!(
    calls.take(),
    vec![vec![HostValue::Handle(rid), HostValue::Int(0)]]
  );
  assert_eq!(bridge.refcount(rid), Some(1));
  assert!(!bridge.is_active(rid));
  assert_eq!(bridge.lookup(rid).unwrap().state(), HandleState::Active);
}

#[test]
fn connect_then_close_cancels_the_connect() {
  let bridge = bridge();
  let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();

  let order = Rc::new(RefCell::new(Vec::new()));
  let rid = bridge.create(HandleKind::Tcp).unwrap();
  let seen = order.clone();
  bridge
    .tcp_connect(
      rid,
      addr,
      Some(HostCallback::new(move |_, args| {
        seen.borrow_mut().push(("connect", args[1].as_int()));
      })),
    )
    .unwrap();
  let seen = order.clone();
  bridge
    .close(
      rid,
      Some(HostCallback::new(move |_, args| {
        assert_eq!(args, &[HostValue::Handle(rid)]);
        seen.borrow_mut().push(("close", None));
      })),
    )
    .unwrap();
  assert!(bridge.is_closing(rid));
  assert!(matches!(
    bridge.write(rid, Bytes::from_static(b"late"), None),
    Err(BridgeError::InvalidHandleState {
      state: HandleState::Closing,
      ..
    })
  ));

  bridge.run(RunMode::Default);
  assert_eq!(
    *order.borrow(),
    vec![
      ("connect", Some(errno::UV_ECANCELED as i64)),
      ("close", None)
    ]
  );
  assert!(bridge.lookup(rid).is_err());
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn writes_complete_in_order_before_close() {
  let bridge = bridge();
  let server = bridge.create(HandleKind::Tcp).unwrap();
  bridge
    .tcp_bind(server, "127.0.0.1:0".parse().unwrap())
    .unwrap();
  let addr: SocketAddr = bridge.tcp_getsockname(server).unwrap();

  let received = Rc::new(RefCell::new(Vec::new()));
  let sink = received.clone();
  bridge
    .listen(
      server,
      0,
      Some(HostCallback::new(move |bridge, args| {
        assert_eq!(args[1], HostValue::Int(0));
        let conn = bridge.create(HandleKind::Tcp).unwrap();
        bridge.accept(server, conn).unwrap();
        let sink = sink.clone();
        bridge
          .read_start(
            conn,
            Some(HostCallback::new(move |bridge, args| {
              match args[2].as_bytes() {
                Some(data) => sink.borrow_mut().extend_from_slice(data),
                None => {
                  bridge.close(conn, None).unwrap();
                  bridge.close(server, None).unwrap();
                }
              }
            })),
          )
          .unwrap();
      })),
    )
    .unwrap();

  let client = bridge.create(HandleKind::Tcp).unwrap();
  let writes = Calls::default();
  let closed = Rc::new(Cell::new(false));
  let done = closed.clone();
  let write_calls = writes.clone();
  bridge
    .tcp_connect(
      client,
      addr,
      Some(HostCallback::new(move |bridge, args| {
        assert_eq!(args[1], HostValue::Int(0));
        let peer = bridge.tcp_getpeername(client).unwrap();
        assert_eq!(peer, addr);
        for chunk in [&b"one"[..], b"two", b"three"] {
          bridge
            .write(
              client,
              Bytes::copy_from_slice(chunk),
              Some(write_calls.callback()),
            )
            .unwrap();
        }
        // The handle's own reference, the connect still being delivered
        // and three writes in flight.
        assert_eq!(bridge.refcount(client), Some(5));
        let done = done.clone();
        bridge
          .shutdown(
            client,
            Some(HostCallback::new(move |bridge, args| {
              assert_eq!(args[1], HostValue::Int(0));
              let done = done.clone();
              bridge
                .close(
                  client,
                  Some(HostCallback::new(move |_, _| done.set(true))),
                )
                .unwrap();
            })),
          )
          .unwrap();
      })),
    )
    .unwrap();

  bridge.run(RunMode::Default);

  assert_eq!(&received.borrow()[..], b"onetwothree");
  assert_eq!(
    writes.take(),
    vec![vec![HostValue::Handle(client), HostValue::Int(0)]; 3]
  );
  assert!(closed.get());
  assert_eq!(bridge.resource_count(), 0);
}

fn listening_server(bridge: &uv_bridge::UvBridge) -> (u32, SocketAddr) {
  let server = bridge.create(HandleKind::Tcp).unwrap();
  bridge
    .tcp_bind(server, "127.0.0.1:0".parse().unwrap())
    .unwrap();
  let addr = bridge.tcp_getsockname(server).unwrap();
  (server, addr)
}

fn close_after(bridge: &uv_bridge::UvBridge, timeout: u64, rid: u32) {
  let timer = bridge.create(HandleKind::Timer).unwrap();
  bridge
    .timer_start(
      timer,
      timeout,
      0,
      Some(HostCallback::new(move |bridge, _| {
        bridge.close(rid, None).unwrap();
        bridge.close(timer, None).unwrap();
      })),
    )
    .unwrap();
}

#[test]
fn unaccepted_connection_pauses_the_listener() {
  let bridge = bridge();
  let (server, addr) = listening_server(&bridge);
  let calls = Calls::default();
  bridge.listen(server, 0, Some(calls.callback())).unwrap();
  let _clients = (0..20)
    .map(|_| std::net::TcpStream::connect(addr).unwrap())
    .collect::<Vec<_>>();
  close_after(&bridge, 100, server);

  bridge.run(RunMode::Default);
  assert_eq!(
    calls.take(),
    vec![vec![HostValue::Handle(server), HostValue::Int(0)]]
  );
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn accepting_resumes_the_listener() {
  let bridge = bridge();
  let (server, addr) = listening_server(&bridge);
  let accepted = Rc::new(Cell::new(0));
  let count = accepted.clone();
  bridge
    .listen(
      server,
      0,
      Some(HostCallback::new(move |bridge, _| {
        let conn = bridge.create(HandleKind::Tcp).unwrap();
        let spare = bridge.create(HandleKind::Tcp).unwrap();
        bridge.accept(server, conn).unwrap();
        assert!(matches!(
          bridge.accept(server, spare),
          Err(BridgeError::Setup { .. })
        ));
        bridge.close(conn, None).unwrap();
        bridge.close(spare, None).unwrap();
        count.set(count.get() + 1);
      })),
    )
    .unwrap();
  let _clients = (0..3)
    .map(|_| std::net::TcpStream::connect(addr).unwrap())
    .collect::<Vec<_>>();
  close_after(&bridge, 100, server);

  bridge.run(RunMode::Default);
  assert_eq!(accepted.get(), 3);
  assert_eq!(bridge.resource_count(), 0);
}

/// Counts how often the value it is captured in gets dropped.
struct DropCounter(Rc<Cell<usize>>);

impl Drop for DropCounter {
  fn drop(&mut self) {
    self.0.set(self.0.get() + 1);
  }
}

#[test]
fn second_close_is_rejected() {
  let bridge = bridge();
  let rid = bridge.create(HandleKind::Timer).unwrap();
  let reentrant = Rc::new(RefCell::new(None));
  let result = reentrant.clone();
  let drops = Rc::new(Cell::new(0));
  let counter = DropCounter(drops.clone());
  bridge
    .close(
      rid,
      Some(HostCallback::new(move |bridge, args| {
        let _counter = &counter;
        let rid = args[0].as_handle().unwrap();
        *result.borrow_mut() = Some(bridge.close(rid, None));
      })),
    )
    .unwrap();
  assert!(matches!(
    bridge.close(rid, None),
    Err(BridgeError::InvalidHandleState {
      state: HandleState::Closing,
      ..
    })
  ));
  assert_eq!(drops.get(), 0);
  bridge.run(RunMode::Default);

  assert!(matches!(
    reentrant.borrow_mut().take(),
    Some(Err(BridgeError::InvalidHandleState { .. }))
  ));
  // The record and the close callback it owns are released exactly once.
  assert_eq!(drops.get(), 1);
  assert!(matches!(
    bridge.close(rid, None),
    Err(BridgeError::NotFound(_))
  ));
  bridge.run(RunMode::Default);
  assert_eq!(drops.get(), 1);
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn completions_without_callbacks_keep_refcounts_balanced() {
  let bridge = bridge();
  let timer = bridge.create(HandleKind::Timer).unwrap();
  let idle = bridge.create(HandleKind::Idle).unwrap();

  bridge.timer_start(timer, 0, 0, None).unwrap();
  bridge.idle_start(idle, None).unwrap();
  bridge.idle_start(idle, None).unwrap();
  assert_eq!(bridge.refcount(idle), Some(2));
  bridge.run(RunMode::NoWait);
  assert_eq!(bridge.refcount(timer), Some(1));

  bridge.idle_stop(idle).unwrap();
  bridge.idle_stop(idle).unwrap();
  assert_eq!(bridge.refcount(idle), Some(1));
  assert!(!bridge.run(RunMode::NoWait));
}

#[test]
fn unref_timer_does_not_keep_the_loop_alive() {
  let bridge = bridge();
  let rid = bridge.create(HandleKind::Timer).unwrap();
  let calls = Calls::default();
  bridge
    .timer_start(rid, 60_000, 0, Some(calls.callback()))
    .unwrap();
  bridge.unref_handle(rid).unwrap();
  assert!(!bridge.has_ref(rid));
  assert!(!bridge.run(RunMode::Default));
  assert_eq!(calls.len(), 0);
  // ref/unref never touch the resource table.
  assert_eq!(bridge.refcount(rid), Some(2));

  bridge.ref_handle(rid).unwrap();
  bridge.close(rid, None).unwrap();
  bridge.run(RunMode::Default);
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn pipe_over_socketpair() {
  let bridge = bridge();
  let (local, remote) = std::os::unix::net::UnixStream::pair().unwrap();
  let rid = bridge.pipe_init(false).unwrap();
  bridge.pipe_open(rid, OwnedFd::from(local)).unwrap();
  assert!(bridge.is_readable(rid));
  assert!(bridge.is_writable(rid));
  assert!(matches!(
    bridge.read2_start(rid, None),
    Err(BridgeError::InvalidArgument(_))
  ));

  let reads = Calls::default();
  bridge.read_start(rid, Some(reads.callback())).unwrap();
  {
    use std::io::Write;
    let mut remote = remote;
    remote.write_all(b"ping").unwrap();
  }
  let read_calls = reads.clone();
  let check = bridge.create(HandleKind::Check).unwrap();
  bridge
    .check_start(
      check,
      Some(HostCallback::new(move |bridge, _| {
        if read_calls.len() >= 2 {
          bridge.close(rid, None).unwrap();
          bridge.close(check, None).unwrap();
        }
      })),
    )
    .unwrap();
  bridge.run(RunMode::Default);

  let reads = reads.take();
  assert_eq!(
    reads[0],
    vec![
      HostValue::Handle(rid),
      HostValue::Int(4),
      HostValue::Bytes(Bytes::from_static(b"ping"))
    ]
  );
  assert_eq!(
    reads[1],
    vec![
      HostValue::Handle(rid),
      HostValue::Int(errno::UV_EOF as i64),
      HostValue::Null
    ]
  );
}

fn run_fs(
  bridge: &uv_bridge::UvBridge,
  start: impl FnOnce(HostCallback) -> Result<u32, BridgeError>,
) -> Vec<HostValue> {
  let calls = Calls::default();
  start(calls.callback()).unwrap();
  bridge.run(RunMode::Default);
  let mut calls = calls.take();
  assert_eq!(calls.len(), 1);
  calls.remove(0)
}

#[test]
fn file_system_requests() {
  let bridge = bridge();
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("a.txt");

  let opened = run_fs(&bridge, |cb| {
    bridge.fs_open(&file, libc::O_CREAT | libc::O_RDWR, 0o644, Some(cb))
  });
  let fd = opened[0].as_int().unwrap() as i32;
  assert!(fd >= 0);

  let written = run_fs(&bridge, |cb| {
    bridge.fs_write(fd, Bytes::from_static(b"hello"), 0, Some(cb))
  });
  assert_eq!(written, vec![HostValue::Int(5)]);

  let read = run_fs(&bridge, |cb| bridge.fs_read(fd, 1, None, Some(cb)));
  assert_eq!(
    read,
    vec![HostValue::Int(4), HostValue::Bytes(Bytes::from_static(b"ello"))]
  );

  let stat = run_fs(&bridge, |cb| bridge.fs_fstat(fd, Some(cb)));
  assert_eq!(stat[0], HostValue::Int(0));
  assert_eq!(stat[1].as_map().unwrap()["size"], HostValue::Int(5));

  let closed = run_fs(&bridge, |cb| bridge.fs_close(fd, Some(cb)));
  assert_eq!(closed, vec![HostValue::Int(0)]);

  let link = dir.path().join("link");
  run_fs(&bridge, |cb| bridge.fs_symlink(&file, &link, 0, Some(cb)));
  let target = run_fs(&bridge, |cb| bridge.fs_readlink(&link, Some(cb)));
  assert_eq!(
    target[1],
    HostValue::Str(file.to_string_lossy().into_owned())
  );

  let sub = dir.path().join("sub");
  run_fs(&bridge, |cb| bridge.fs_mkdir(&sub, 0o755, Some(cb)));
  let entries = run_fs(&bridge, |cb| bridge.fs_readdir(dir.path(), Some(cb)));
  assert_eq!(
    entries[1],
    HostValue::List(vec!["a.txt".into(), "link".into(), "sub".into()])
  );

  let moved = dir.path().join("b.txt");
  run_fs(&bridge, |cb| bridge.fs_rename(&file, &moved, Some(cb)));
  let missing = run_fs(&bridge, |cb| bridge.fs_stat(&file, Some(cb)));
  assert_eq!(missing, vec![HostValue::Int(errno::UV_ENOENT as i64)]);

  let removed = run_fs(&bridge, |cb| bridge.fs_rmdir(&sub, Some(cb)));
  assert_eq!(removed, vec![HostValue::Int(0)]);
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn failed_read_still_passes_a_buffer_argument() {
  let bridge = bridge();
  let read = run_fs(&bridge, |cb| bridge.fs_read(9999, 0, Some(4), Some(cb)));
  assert_eq!(
    read,
    vec![HostValue::Int(errno::UV_EBADF as i64), HostValue::Null]
  );
  let stat = run_fs(&bridge, |cb| bridge.fs_fstat(9999, Some(cb)));
  assert_eq!(stat, vec![HostValue::Int(errno::UV_EBADF as i64)]);
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn localhost_resolves() {
  let bridge = bridge();
  let calls = Calls::default();
  bridge
    .getaddrinfo("localhost", None, Some(calls.callback()))
    .unwrap();
  bridge.run(RunMode::Default);
  let calls = calls.take();
  assert_eq!(calls[0][0], HostValue::Int(0));
  let addrs = calls[0][1].as_list().unwrap();
  assert!(
    addrs
      .iter()
      .any(|a| a.as_str() == Some("127.0.0.1") || a.as_str() == Some("::1"))
  );
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn work_posts_a_semaphore() {
  let bridge = bridge();
  let sem = bridge.sem_init(0);
  let lock = bridge.lock_handle(sem).unwrap();
  let after = Calls::default();
  let work = bridge
    .queue_work(move || lock.post().unwrap(), Some(after.callback()))
    .unwrap();
  bridge.run(RunMode::Default);
  assert_eq!(
    after.take(),
    vec![vec![HostValue::Handle(work), HostValue::Int(0)]]
  );
  assert!(bridge.sem_trywait(sem).unwrap());
  assert!(bridge.lookup(work).is_err());
  bridge.lock_destroy(sem).unwrap();
}

#[test]
fn killed_child_reports_signal() {
  let bridge = bridge();
  let options = ProcessOptions {
    file: "sleep".into(),
    args: vec!["30".into()],
    stdio: [StdioMode::Ignore, StdioMode::Ignore, StdioMode::Inherit],
    ..Default::default()
  };
  let exits = Calls::default();
  let rid = bridge.spawn(&options, Some(exits.callback())).unwrap();
  assert_eq!(bridge.refcount(rid), Some(2));
  bridge.process_kill(rid, libc::SIGTERM).unwrap();
  bridge.run(RunMode::Default);
  let exits = exits.take();
  assert_eq!(exits[0][0], HostValue::Handle(rid));
  assert_eq!(exits[0][2], HostValue::Int(libc::SIGTERM as i64));
  assert_eq!(bridge.refcount(rid), Some(1));
  bridge.close(rid, None).unwrap();
  bridge.run(RunMode::Default);
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn fs_event_sees_new_file() {
  let bridge = bridge();
  let dir = tempfile::tempdir().unwrap();
  let events = Rc::new(RefCell::new(Vec::new()));
  let sink = events.clone();
  let watcher = bridge
    .fs_event_init(
      dir.path(),
      Some(HostCallback::new(move |bridge, args| {
        sink.borrow_mut().push(args[1].clone());
        let rid = args[0].as_handle().unwrap();
        if !bridge.is_closing(rid) {
          bridge.close(rid, None).unwrap();
        }
      })),
    )
    .unwrap();
  assert_eq!(
    bridge.fs_event_path(watcher).unwrap().as_deref(),
    Some(dir.path())
  );
  std::fs::write(dir.path().join("created"), b"x").unwrap();
  bridge.run(RunMode::Default);
  assert_eq!(events.borrow()[0], HostValue::from("created"));
  assert_eq!(bridge.resource_count(), 0);
}

#[test]
fn default_bridge_is_per_thread() {
  let first = uv_bridge::default_bridge().unwrap();
  let second = uv_bridge::default_bridge().unwrap();
  assert!(Rc::ptr_eq(&first, &second));
  let other = std::thread::spawn(|| {
    let bridge = uv_bridge::default_bridge().unwrap();
    bridge.create(HandleKind::Timer).unwrap()
  })
  .join()
  .unwrap();
  assert_eq!(other, 1);
}

#[test]
fn error_names() {
  assert_eq!(errno::err_name(errno::UV_ECONNREFUSED), "ECONNREFUSED");
  assert_eq!(errno::strerror(errno::UV_EOF), "end of file");
}
