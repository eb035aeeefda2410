// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Listener construction and whole-packet send/recv operations (§4.4).
//!
//! The single-call-recv, 1024-byte-cap contract here is deliberate: it
//! is the reason the HTTP handler must assume a whole request arrives
//! in one read (§4.4, §9 open question (a)).

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use mio::net::{TcpListener, TcpStream, UdpSocket};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use crate::net::endpoint::Endpoint;

/// Fixed per-operation staging buffer size (§4.4).
pub const BUFF_SIZE: usize = 1024;
/// Backlog passed to `listen(2)` for the HTTP listener.
const TCP_BACKLOG: i32 = 5;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("short send: sent {sent} of {total} bytes")]
    ShortSend { sent: usize, total: usize },
    #[error("non-IPv4 peer address: {0}")]
    NonIpv4(SocketAddr),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn reuseaddr_socket(ty: Type, protocol: Protocol) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, ty, Some(protocol))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Creates, binds, and marks non-blocking a UDP listening socket.
pub fn bind_udp_listener(ip: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
    let socket = reuseaddr_socket(Type::DGRAM, Protocol::UDP)?;
    let addr = SocketAddrV4::new(ip, port);
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into()))
}

/// Creates, binds, marks non-blocking, and starts listening on a TCP
/// socket with a backlog of 5.
pub fn bind_tcp_listener(ip: Ipv4Addr, port: u16) -> io::Result<TcpListener> {
    let socket = reuseaddr_socket(Type::STREAM, Protocol::TCP)?;
    let addr = SocketAddrV4::new(ip, port);
    socket.bind(&addr.into())?;
    socket.listen(TCP_BACKLOG)?;
    Ok(TcpListener::from_std(socket.into()))
}

fn to_endpoint(addr: SocketAddr) -> Result<Endpoint, TransportError> {
    match addr {
        SocketAddr::V4(v4) => Ok(v4.into()),
        SocketAddr::V6(_) => Err(TransportError::NonIpv4(addr)),
    }
}

/// Sends one whole datagram to `peer`.
pub fn udp_send(socket: &UdpSocket, peer: Endpoint, payload: &[u8]) -> Result<(), TransportError> {
    let sent = socket.send_to(payload, SocketAddrV4::from(peer).into())?;
    if sent < payload.len() {
        return Err(TransportError::ShortSend { sent, total: payload.len() });
    }
    Ok(())
}

/// Receives one datagram, up to [`BUFF_SIZE`] bytes. An empty payload
/// is a legal outcome.
pub fn udp_recv(socket: &UdpSocket) -> Result<(Endpoint, Vec<u8>), TransportError> {
    let mut buf = [0u8; BUFF_SIZE];
    let (n, from) = socket.recv_from(&mut buf)?;
    Ok((to_endpoint(from)?, buf[..n].to_vec()))
}

/// Sends the whole payload over a connected stream.
pub fn tcp_send(stream: &mut TcpStream, payload: &[u8]) -> Result<(), TransportError> {
    let sent = stream.write(payload)?;
    if sent < payload.len() {
        return Err(TransportError::ShortSend { sent, total: payload.len() });
    }
    Ok(())
}

/// Reads up to [`BUFF_SIZE`] bytes from a connected stream. An empty
/// read is legal (connection drained for this tick).
pub fn tcp_recv(stream: &mut TcpStream) -> Result<Vec<u8>, TransportError> {
    let mut buf = [0u8; BUFF_SIZE];
    let n = stream.read(&mut buf)?;
    Ok(buf[..n].to_vec())
}

/// Accepts one pending connection on `listener`, returning the new
/// non-blocking stream and the peer's endpoint.
pub fn accept(listener: &TcpListener) -> Result<(TcpStream, Endpoint), TransportError> {
    let (stream, addr) = listener.accept()?;
    Ok((stream, to_endpoint(addr)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_round_trip_on_loopback() {
        let a = bind_udp_listener(Ipv4Addr::LOCALHOST, 0).expect("bind a");
        let b = bind_udp_listener(Ipv4Addr::LOCALHOST, 0).expect("bind b");

        let a_addr: Endpoint = match a.local_addr().expect("local addr") {
            SocketAddr::V4(v4) => v4.into(),
            _ => panic!("expected IPv4"),
        };
        let b_addr: Endpoint = match b.local_addr().expect("local addr") {
            SocketAddr::V4(v4) => v4.into(),
            _ => panic!("expected IPv4"),
        };

        udp_send(&b, a_addr, b"hello").expect("send");
        std::thread::sleep(std::time::Duration::from_millis(20));
        let (from, payload) = udp_recv(&a).expect("recv");
        assert_eq!(from, b_addr);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn empty_udp_datagram_is_allowed() {
        let a = bind_udp_listener(Ipv4Addr::LOCALHOST, 0).expect("bind a");
        let b = bind_udp_listener(Ipv4Addr::LOCALHOST, 0).expect("bind b");
        let a_addr: Endpoint = match a.local_addr().expect("local addr") {
            SocketAddr::V4(v4) => v4.into(),
            _ => panic!("expected IPv4"),
        };
        udp_send(&b, a_addr, b"").expect("send empty");
        std::thread::sleep(std::time::Duration::from_millis(20));
        let (_, payload) = udp_recv(&a).expect("recv");
        assert!(payload.is_empty());
    }
}
