//! Best-effort socket addresses for tunnelled connections.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::config::validation::split_port;

/// `0.0.0.0:0`, reported when no better address is known.
pub fn unspecified() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
}

/// Parse a configured `host:port` into a remote address.
///
/// IP hosts are used as-is. A DNS name keeps its port on the unspecified
/// address; malformed input yields `0.0.0.0:0`.
pub fn parse_remote(address: &str) -> SocketAddr {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return addr;
    }
    match split_port(address) {
        Some((host, port)) => match host.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, port),
            Err(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        },
        None => unspecified(),
    }
}
