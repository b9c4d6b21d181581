// Copyright 2018-2026 the Deno authors. MIT license.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::lock_api::RawMutex as _;
use parking_lot::lock_api::RawRwLock as _;

use crate::error::BridgeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LockKind {
  Mutex,
  RwLock,
  Semaphore,
}

enum LockInner {
  Mutex(parking_lot::RawMutex),
  RwLock(parking_lot::RawRwLock),
  Semaphore { count: Mutex<u32>, ready: Condvar },
}

/// A lock shared between the loop thread and work callbacks. Unlocking a lock
/// that is not held is reported instead of being undefined.
pub struct HostLock {
  inner: LockInner,
  exclusive: AtomicBool,
  readers: AtomicUsize,
}

impl HostLock {
  pub fn mutex() -> Self {
    Self::with(LockInner::Mutex(parking_lot::RawMutex::INIT))
  }

  pub fn rwlock() -> Self {
    Self::with(LockInner::RwLock(parking_lot::RawRwLock::INIT))
  }

  pub fn semaphore(value: u32) -> Self {
    Self::with(LockInner::Semaphore {
      count: Mutex::new(value),
      ready: Condvar::new(),
    })
  }

  fn with(inner: LockInner) -> Self {
    Self {
      inner,
      exclusive: AtomicBool::new(false),
      readers: AtomicUsize::new(0),
    }
  }

  pub fn kind(&self) -> LockKind {
    match self.inner {
      LockInner::Mutex(_) => LockKind::Mutex,
      LockInner::RwLock(_) => LockKind::RwLock,
      LockInner::Semaphore { .. } => LockKind::Semaphore,
    }
  }

  fn unsupported(&self, op: &'static str) -> BridgeError {
    log::debug!("{op} called on a {} lock", self.kind());
    BridgeError::InvalidArgument(op)
  }

  /// Mutex lock, or exclusive lock of a rwlock.
  pub fn lock(&self) -> Result<(), BridgeError> {
    match &self.inner {
      LockInner::Mutex(raw) => raw.lock(),
      LockInner::RwLock(raw) => raw.lock_exclusive(),
      LockInner::Semaphore { .. } => return Err(self.unsupported("lock")),
    }
    self.exclusive.store(true, Ordering::Release);
    Ok(())
  }

  pub fn try_lock(&self) -> Result<bool, BridgeError> {
    let locked = match &self.inner {
      LockInner::Mutex(raw) => raw.try_lock(),
      LockInner::RwLock(raw) => raw.try_lock_exclusive(),
      LockInner::Semaphore { .. } => return Err(self.unsupported("trylock")),
    };
    if locked {
      self.exclusive.store(true, Ordering::Release);
    }
    Ok(locked)
  }

  pub fn unlock(&self) -> Result<(), BridgeError> {
    if matches!(self.inner, LockInner::Semaphore { .. }) {
      return Err(self.unsupported("unlock"));
    }
    if !self.exclusive.swap(false, Ordering::AcqRel) {
      return Err(BridgeError::NotLocked("lock"));
    }
    match &self.inner {
      // SAFETY: the flag above proves the lock is held.
      LockInner::Mutex(raw) => unsafe { raw.unlock() },
      // SAFETY: as above, held exclusively.
      LockInner::RwLock(raw) => unsafe { raw.unlock_exclusive() },
      LockInner::Semaphore { .. } => {}
    }
    Ok(())
  }

  pub fn read_lock(&self) -> Result<(), BridgeError> {
    let LockInner::RwLock(raw) = &self.inner else {
      return Err(self.unsupported("rdlock"));
    };
    raw.lock_shared();
    self.readers.fetch_add(1, Ordering::AcqRel);
    Ok(())
  }

  pub fn try_read_lock(&self) -> Result<bool, BridgeError> {
    let LockInner::RwLock(raw) = &self.inner else {
      return Err(self.unsupported("tryrdlock"));
    };
    let locked = raw.try_lock_shared();
    if locked {
      self.readers.fetch_add(1, Ordering::AcqRel);
    }
    Ok(locked)
  }

  pub fn read_unlock(&self) -> Result<(), BridgeError> {
    let LockInner::RwLock(raw) = &self.inner else {
      return Err(self.unsupported("rdunlock"));
    };
    self
      .readers
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
      .map_err(|_| BridgeError::NotLocked("read lock"))?;
    // SAFETY: the reader count above proves a shared lock is held.
    unsafe { raw.unlock_shared() };
    Ok(())
  }

  pub fn post(&self) -> Result<(), BridgeError> {
    let LockInner::Semaphore { count, ready } = &self.inner else {
      return Err(self.unsupported("post"));
    };
    *count.lock() += 1;
    ready.notify_one();
    Ok(())
  }

  pub fn wait(&self) -> Result<(), BridgeError> {
    let LockInner::Semaphore { count, ready } = &self.inner else {
      return Err(self.unsupported("wait"));
    };
    let mut count = count.lock();
    while *count == 0 {
      ready.wait(&mut count);
    }
    *count -= 1;
    Ok(())
  }

  pub fn try_wait(&self) -> Result<bool, BridgeError> {
    let LockInner::Semaphore { count, .. } = &self.inner else {
      return Err(self.unsupported("trywait"));
    };
    let mut count = count.lock();
    if *count == 0 {
      return Ok(false);
    }
    *count -= 1;
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;

  #[test]
  fn mutex_double_unlock_is_reported() {
    let lock = HostLock::mutex();
    lock.lock().unwrap();
    assert!(!lock.try_lock().unwrap());
    lock.unlock().unwrap();
    assert!(matches!(lock.unlock(), Err(BridgeError::NotLocked(_))));
    assert!(lock.try_lock().unwrap());
    lock.unlock().unwrap();
  }

  #[test]
  fn rwlock_readers_share() {
    let lock = HostLock::rwlock();
    lock.read_lock().unwrap();
    assert!(lock.try_read_lock().unwrap());
    assert!(!lock.try_lock().unwrap());
    lock.read_unlock().unwrap();
    lock.read_unlock().unwrap();
    assert!(lock.read_unlock().is_err());
    assert!(lock.try_lock().unwrap());
    lock.unlock().unwrap();
  }

  #[test]
  fn semaphore_across_threads() {
    let sem = Arc::new(HostLock::semaphore(0));
    assert!(!sem.try_wait().unwrap());
    let poster = sem.clone();
    let handle = std::thread::spawn(move || poster.post().unwrap());
    sem.wait().unwrap();
    handle.join().unwrap();
    assert!(!sem.try_wait().unwrap());
    assert!(sem.lock().is_err());
  }
}
