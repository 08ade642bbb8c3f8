use std::net::{SocketAddr, TcpListener};

/// First port at or above this one that can be bound is used for the
/// consensus transport when none is configured.
pub const FREE_PORT_START: u16 = 17070;

/// `IP:port` with a literal IP.
pub fn is_host_addr(addr: &str) -> bool {
    addr.parse::<SocketAddr>().is_ok()
}

/// Host part of `host:port`.
pub fn host_of(addr: &str) -> &str {
    addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr)
}

pub fn free_port_from(start: u16) -> Option<u16> {
    (start..=u16::MAX).find(|port| TcpListener::bind(("0.0.0.0", *port)).is_ok())
}

pub fn free_port() -> Option<u16> {
    free_port_from(FREE_PORT_START)
}
