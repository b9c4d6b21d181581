// Copyright 2018-2026 the Deno authors. MIT license.

use std::fs::Metadata;
use std::net::SocketAddr;
use std::os::unix::fs::MetadataExt;

use bytes::Bytes;
use indexmap::IndexMap;

use crate::resources::ResourceId;

/// A value handed to a host closure. Handles travel as their resource id so
/// the host can look the record up again.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
  Null,
  Bool(bool),
  Int(i64),
  Str(String),
  Bytes(Bytes),
  Handle(ResourceId),
  List(Vec<HostValue>),
  Map(IndexMap<String, HostValue>),
}

impl HostValue {
  pub fn is_null(&self) -> bool {
    matches!(self, HostValue::Null)
  }

  pub fn as_int(&self) -> Option<i64> {
    match self {
      HostValue::Int(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      HostValue::Bool(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      HostValue::Str(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_bytes(&self) -> Option<&Bytes> {
    match self {
      HostValue::Bytes(v) => Some(v),
      _ => None,
    }
  }

  pub fn as_handle(&self) -> Option<ResourceId> {
    match self {
      HostValue::Handle(rid) => Some(*rid),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[HostValue]> {
    match self {
      HostValue::List(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&IndexMap<String, HostValue>> {
    match self {
      HostValue::Map(map) => Some(map),
      _ => None,
    }
  }
}

impl From<i32> for HostValue {
  fn from(v: i32) -> Self {
    HostValue::Int(v as i64)
  }
}

impl From<i64> for HostValue {
  fn from(v: i64) -> Self {
    HostValue::Int(v)
  }
}

impl From<bool> for HostValue {
  fn from(v: bool) -> Self {
    HostValue::Bool(v)
  }
}

impl From<String> for HostValue {
  fn from(v: String) -> Self {
    HostValue::Str(v)
  }
}

impl From<&str> for HostValue {
  fn from(v: &str) -> Self {
    HostValue::Str(v.to_string())
  }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
  fn from(v: Option<T>) -> Self {
    v.map(Into::into).unwrap_or(HostValue::Null)
  }
}

impl From<Bytes> for HostValue {
  fn from(v: Bytes) -> Self {
    HostValue::Bytes(v)
  }
}

impl From<SocketAddr> for HostValue {
  fn from(addr: SocketAddr) -> Self {
    let mut map = IndexMap::new();
    map.insert(
      "family".to_string(),
      HostValue::from(if addr.is_ipv4() { "IPv4" } else { "IPv6" }),
    );
    map.insert("address".to_string(), HostValue::from(addr.ip().to_string()));
    map.insert("port".to_string(), HostValue::from(addr.port() as i64));
    HostValue::Map(map)
  }
}

/// Snapshot of file metadata in the shape libuv reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStat {
  pub dev: u64,
  pub ino: u64,
  pub mode: u32,
  pub nlink: u64,
  pub uid: u32,
  pub gid: u32,
  pub rdev: u64,
  pub size: u64,
  pub blksize: u64,
  pub blocks: u64,
  pub atime: i64,
  pub mtime: i64,
  pub ctime: i64,
}

impl From<&Metadata> for FsStat {
  fn from(m: &Metadata) -> Self {
    FsStat {
      dev: m.dev(),
      ino: m.ino(),
      mode: m.mode(),
      nlink: m.nlink(),
      uid: m.uid(),
      gid: m.gid(),
      rdev: m.rdev(),
      size: m.size(),
      blksize: m.blksize(),
      blocks: m.blocks(),
      atime: m.atime(),
      mtime: m.mtime(),
      ctime: m.ctime(),
    }
  }
}

impl From<&FsStat> for HostValue {
  fn from(s: &FsStat) -> Self {
    let fields = [
      ("dev", s.dev as i64),
      ("ino", s.ino as i64),
      ("mode", s.mode as i64),
      ("nlink", s.nlink as i64),
      ("uid", s.uid as i64),
      ("gid", s.gid as i64),
      ("rdev", s.rdev as i64),
      ("size", s.size as i64),
      ("blksize", s.blksize as i64),
      ("blocks", s.blocks as i64),
      ("atime", s.atime),
      ("mtime", s.mtime),
      ("ctime", s.ctime),
    ];
    HostValue::Map(
      fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), HostValue::Int(v)))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn optional_values_become_null() {
    assert_eq!(HostValue::from(None::<Bytes>), HostValue::Null);
    assert_eq!(
      HostValue::from(Some(Bytes::from_static(b"hi"))),
      HostValue::Bytes(Bytes::from_static(b"hi"))
    );
  }

  #[test]
  fn stat_map_keeps_field_order() {
    let stat = FsStat {
      size: 12,
      mode: 0o100644,
      ..Default::default()
    };
    let value = HostValue::from(&stat);
    let map = value.as_map().unwrap();
    assert_eq!(map.keys().next().map(String::as_str), Some("dev"));
    assert_eq!(map["size"], HostValue::Int(12));
    assert_eq!(map["mode"], HostValue::Int(0o100644));
    assert_eq!(map.len(), 13);
  }

  #[test]
  fn socket_addr_shape() {
    let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
    let value = HostValue::from(addr);
    let map = value.as_map().unwrap();
    assert_eq!(map["family"].as_str(), Some("IPv4"));
    assert_eq!(map["address"].as_str(), Some("127.0.0.1"));
    assert_eq!(map["port"].as_int(), Some(8080));
  }
}
