// Copyright 2018-2026 the Deno authors. MIT license.

use std::sync::Arc;

use crate::bridge::UvBridge;
use crate::error::BridgeError;
use crate::handle::HandleKind;
use crate::native::NativeHandle;
use crate::native::lock::HostLock;
use crate::resources::ResourceId;

impl UvBridge {
  pub fn mutex_init(&self) -> ResourceId {
    self.lock_init(HostLock::mutex())
  }

  pub fn rwlock_init(&self) -> ResourceId {
    self.lock_init(HostLock::rwlock())
  }

  pub fn sem_init(&self, value: u32) -> ResourceId {
    self.lock_init(HostLock::semaphore(value))
  }

  fn lock_init(&self, lock: HostLock) -> ResourceId {
    self.register(HandleKind::Lock, NativeHandle::Lock(Arc::new(lock)))
  }

  /// The lock itself, for handing to work running on other threads.
  pub fn lock_handle(
    &self,
    rid: ResourceId,
  ) -> Result<Arc<HostLock>, BridgeError> {
    let record = self.lookup_kind(rid, HandleKind::Lock, "lock_handle")?;
    record.native().lock().ok_or(BridgeError::InvalidHandleState {
      rid,
      state: record.state(),
    })
  }

  /// Drops the bridge's reference. Clones handed out by `lock_handle` stay
  /// usable.
  pub fn lock_destroy(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lookup_kind(rid, HandleKind::Lock, "lock_destroy")?;
    self.delete(rid);
    Ok(())
  }

  pub fn mutex_lock(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.lock()
  }

  pub fn mutex_trylock(&self, rid: ResourceId) -> Result<bool, BridgeError> {
    self.lock_handle(rid)?.try_lock()
  }

  pub fn mutex_unlock(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.unlock()
  }

  pub fn rwlock_rdlock(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.read_lock()
  }

  pub fn rwlock_tryrdlock(
    &self,
    rid: ResourceId,
  ) -> Result<bool, BridgeError> {
    self.lock_handle(rid)?.try_read_lock()
  }

  pub fn rwlock_rdunlock(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.read_unlock()
  }

  pub fn rwlock_wrlock(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.lock()
  }

  pub fn rwlock_trywrlock(
    &self,
    rid: ResourceId,
  ) -> Result<bool, BridgeError> {
    self.lock_handle(rid)?.try_lock()
  }

  pub fn rwlock_wrunlock(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.unlock()
  }

  pub fn sem_post(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.post()
  }

  pub fn sem_wait(&self, rid: ResourceId) -> Result<(), BridgeError> {
    self.lock_handle(rid)?.wait()
  }

  pub fn sem_trywait(&self, rid: ResourceId) -> Result<bool, BridgeError> {
    self.lock_handle(rid)?.try_wait()
  }
}
