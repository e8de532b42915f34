//! Outbound address policy.
//!
//! Queries may not target loopback, link-local, multicast, broadcast or unspecified
//! addresses, including their IPv4-mapped IPv6 forms. Private ranges are allowed
//! since lab instruments normally live on them. A host that does not resolve is
//! blocked.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::warn;

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    // fe80::/10
    let link_local = (ip.segments()[0] & 0xffc0) == 0xfe80;
    ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || link_local
}

/// Whether queries to `ip` are refused.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

/// Resolve `host` and block it if any address it resolves to is blocked.
pub async fn is_blocked_host(host: &str, port: u16) -> bool {
    let host = host.trim();
    if host.is_empty() {
        return true;
    }
    match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => {
            let addrs: Vec<_> = addrs.collect();
            addrs.is_empty() || addrs.iter().any(|a| is_blocked_ip(a.ip()))
        }
        Err(e) => {
            warn!(host, "Could not resolve host, blocking: {}", e);
            true
        }
    }
}
