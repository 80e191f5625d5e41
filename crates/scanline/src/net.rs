// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket construction and interface enumeration.
//!
//! Everything here is plain blocking UDP. `socket2` is used only where
//! `std` has no knob: enabling broadcast and requesting a large receive
//! buffer. Receive sockets bind an OS-chosen ephemeral port on
//! `INADDR_ANY`; the port is what gets advertised to the scan head in the
//! broadcast connect message.

use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Requested OS receive buffer for data sockets. Best effort; at full
/// rate a head can burst far faster than a stalled consumer drains.
const RECV_SOCKET_BUFFER_SIZE: usize = 256 * 1024 * 1024;

/// Receiver readiness wait; bounds how long shutdown can lag.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Destination for discovery datagrams. Overridable for bench setups and
/// tests that stand in a simulated scan head on loopback.
pub fn broadcast_address() -> Ipv4Addr {
    std::env::var("SCANLINE_BROADCAST_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Ipv4Addr::BROADCAST)
}

/// All usable local IPv4 addresses; loopback and unspecified excluded.
pub fn active_ipv4_addresses() -> io::Result<Vec<Ipv4Addr>> {
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let mut addrs = Vec::new();
    for (name, ip) in interfaces {
        if let std::net::IpAddr::V4(ipv4) = ip {
            if ipv4.is_loopback() || ipv4.is_unspecified() {
                continue;
            }
            log::debug!("[net] interface {} at {}", name, ipv4);
            addrs.push(ipv4);
        }
    }

    Ok(addrs)
}

/// Broadcast-capable socket bound to one interface address.
pub fn broadcast_socket(interface: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    let bind: SocketAddr = SocketAddrV4::new(interface, 0).into();
    socket.bind(&bind.into())?;
    Ok(socket.into())
}

/// Data receive socket: ephemeral port on INADDR_ANY, large receive
/// buffer, read timeout so the owning task can observe state changes.
/// Returns the socket and the chosen port.
pub fn recv_socket() -> io::Result<(UdpSocket, u16)> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(e) = socket.set_recv_buffer_size(RECV_SOCKET_BUFFER_SIZE) {
        log::warn!("[net] SO_RCVBUF {} rejected: {}", RECV_SOCKET_BUFFER_SIZE, e);
    }
    let bind: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(RECV_TIMEOUT))?;
    let port = socket.local_addr()?.port();
    Ok((socket, port))
}

/// Command send socket shared by all heads.
pub fn send_socket() -> io::Result<UdpSocket> {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_socket_gets_an_ephemeral_port() {
        let (_socket, port) = recv_socket().expect("bind should succeed");
        assert_ne!(port, 0);
    }

    #[test]
    fn two_recv_sockets_get_distinct_ports() {
        let (_a, port_a) = recv_socket().unwrap();
        let (_b, port_b) = recv_socket().unwrap();
        assert_ne!(port_a, port_b);
    }

    #[test]
    fn broadcast_address_defaults_to_limited_broadcast() {
        if std::env::var("SCANLINE_BROADCAST_ADDR").is_err() {
            assert_eq!(broadcast_address(), Ipv4Addr::BROADCAST);
        }
    }
}
