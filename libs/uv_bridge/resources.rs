// Copyright 2018-2026 the Deno authors. MIT license.

// Think of a ResourceId as the host's reference to a handle record. Native
// completions carry the id, never the record itself, so a completion that
// arrives after the record is gone simply fails the lookup.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::BridgeError;
use crate::handle::HandleRecord;

/// ResourceId is the bridge's version of a file descriptor. Ids start at 1
/// and are never reused within a table.
pub type ResourceId = u32;

struct Entry {
  record: Rc<HandleRecord>,
  refcount: usize,
}

/// Maps ids to live handle records together with their reference count.
/// Tearing a record down is left to the caller, after the table borrow has
/// been released, because teardown can drop host closures.
pub struct ResourceTable {
  index: BTreeMap<ResourceId, Entry>,
  next_rid: ResourceId,
}

impl Default for ResourceTable {
  fn default() -> Self {
    Self {
      index: BTreeMap::new(),
      next_rid: 1,
    }
  }
}

impl ResourceTable {
  /// Inserts `record` with a reference count of 1 and returns its new id.
  pub fn register(&mut self, record: Rc<HandleRecord>) -> ResourceId {
    let rid = self.next_rid;
    self.next_rid += 1;
    record.set_rid(rid);
    let removed = self.index.insert(
      rid,
      Entry {
        record,
        refcount: 1,
      },
    );
    debug_assert!(removed.is_none());
    rid
  }

  pub fn retain(&mut self, rid: ResourceId) -> Result<usize, BridgeError> {
    let entry = self
      .index
      .get_mut(&rid)
      .ok_or(BridgeError::NotFound(rid))?;
    entry.refcount += 1;
    Ok(entry.refcount)
  }

  /// Drops one reference. When the count reaches zero the entry is removed
  /// and its record returned so the caller can tear it down. Unknown ids are
  /// ignored.
  pub fn release(&mut self, rid: ResourceId) -> Option<Rc<HandleRecord>> {
    let entry = self.index.get_mut(&rid)?;
    entry.refcount = entry.refcount.saturating_sub(1);
    if entry.refcount > 0 {
      return None;
    }
    self.index.remove(&rid).map(|entry| entry.record)
  }

  pub fn lookup(
    &self,
    rid: ResourceId,
  ) -> Result<Rc<HandleRecord>, BridgeError> {
    self.get(rid).ok_or(BridgeError::NotFound(rid))
  }

  pub fn get(&self, rid: ResourceId) -> Option<Rc<HandleRecord>> {
    self.index.get(&rid).map(|entry| entry.record.clone())
  }

  /// Removes the entry regardless of its reference count.
  pub fn remove(&mut self, rid: ResourceId) -> Option<Rc<HandleRecord>> {
    self.index.remove(&rid).map(|entry| entry.record)
  }

  pub fn refcount(&self, rid: ResourceId) -> Option<usize> {
    self.index.get(&rid).map(|entry| entry.refcount)
  }

  pub fn len(&self) -> usize {
    self.index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.index.is_empty()
  }

  /// Returns an iterator of (id, kind name) pairs, ordered by id.
  pub fn names(&self) -> impl Iterator<Item = (ResourceId, &'static str)> {
    self
      .index
      .iter()
      .map(|(rid, entry)| (*rid, entry.record.kind().into()))
  }
}
