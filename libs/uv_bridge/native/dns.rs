// Copyright 2018-2026 the Deno authors. MIT license.

use std::net::IpAddr;

use crate::errno;
use crate::resources::ResourceId;
use crate::uv::Completion;
use crate::uv::TaskKind;
use crate::uv::UvLoop;

/// Resolves `node` on the blocking pool. IPv4 results come first, then IPv6,
/// each without duplicates.
pub(crate) fn getaddrinfo(
  uv: &UvLoop,
  rid: ResourceId,
  node: String,
  port: u16,
) {
  let sink = uv.sink();
  uv.spawn(rid, TaskKind::Request, async move {
    let (status, addrs) =
      match tokio::net::lookup_host((node.as_str(), port)).await {
        Ok(found) => (0, order_addrs(found.map(|addr| addr.ip()))),
        Err(err) => {
          log::debug!("getaddrinfo {node} failed: {err}");
          let status = match err.raw_os_error() {
            Some(code) => -code,
            None => errno::UV_EAI_NONAME,
          };
          (status, Vec::new())
        }
      };
    sink.post(Completion::GetAddrInfo { rid, status, addrs });
  });
}

fn order_addrs(found: impl Iterator<Item = IpAddr>) -> Vec<IpAddr> {
  let mut v4 = Vec::new();
  let mut v6 = Vec::new();
  for ip in found {
    let list = if ip.is_ipv4() { &mut v4 } else { &mut v6 };
    if !list.contains(&ip) {
      list.push(ip);
    }
  }
  v4.extend(v6);
  v4
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ipv4_first_without_duplicates() {
    let found: Vec<IpAddr> = vec![
      "::1".parse().unwrap(),
      "127.0.0.1".parse().unwrap(),
      "::1".parse().unwrap(),
      "127.0.0.1".parse().unwrap(),
      "10.0.0.1".parse().unwrap(),
    ];
    let ordered = order_addrs(found.into_iter());
    let expected: Vec<IpAddr> = vec![
      "127.0.0.1".parse().unwrap(),
      "10.0.0.1".parse().unwrap(),
      "::1".parse().unwrap(),
    ];
    assert_eq!(ordered, expected);
  }
}
