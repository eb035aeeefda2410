// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The single-threaded cooperative reactor (§4.5): owns the registrar,
//! the two listening sockets, and the map of accepted HTTP client
//! connections, and moves bytes between sockets and the four SPSC
//! queues.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use mio::{Interest, Token};
use tracing::{debug, info, warn};

use crate::net::endpoint::Endpoint;
use crate::net::packet::Packet;
use crate::net::registrar::Registrar;
use crate::net::socket;
use crate::queue::SpscQueue;

const UDP_TOKEN: Token = Token(0);
const HTTP_LISTENER_TOKEN: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

/// The four SPSC queues the worker feeds and drains, bundled so `run`
/// doesn't need a five-argument signature repeated everywhere.
pub struct Queues {
    pub udp_in: SpscQueue<Packet>,
    pub udp_out: SpscQueue<Packet>,
    pub http_in: SpscQueue<Packet>,
    pub http_out: SpscQueue<Packet>,
}

/// Shutdown takes 10 additional loop iterations after `stop` is first
/// observed set, to flush in-flight outbound packets (§4.5).
const SHUTDOWN_DRAIN_ITERATIONS: usize = 10;

pub struct IoWorker {
    registrar: Registrar,
    udp_socket: mio::net::UdpSocket,
    http_listener: mio::net::TcpListener,
    connections: HashMap<Token, (Endpoint, mio::net::TcpStream)>,
    next_token: usize,
    pending_http_out: Option<Packet>,
}

impl IoWorker {
    /// Creates the registrar and both listeners. Any failure here is
    /// fatal at startup (§4.5, §7).
    pub fn new(udp_ip: Ipv4Addr, udp_port: u16, http_ip: Ipv4Addr, http_port: u16) -> Result<Self> {
        let registrar = Registrar::new().context("failed to create readiness registrar")?;

        let mut udp_socket =
            socket::bind_udp_listener(udp_ip, udp_port).context("failed to bind UDP listener")?;
        let mut http_listener = socket::bind_tcp_listener(http_ip, http_port)
            .context("failed to bind HTTP listener")?;

        registrar
            .register(&mut http_listener, HTTP_LISTENER_TOKEN, Interest::READABLE)
            .context("failed to register HTTP listener")?;
        registrar
            .register(
                &mut udp_socket,
                UDP_TOKEN,
                Interest::READABLE.add(Interest::WRITABLE),
            )
            .context("failed to register UDP listener")?;

        Ok(Self {
            registrar,
            udp_socket,
            http_listener,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            pending_http_out: None,
        })
    }

    /// Runs the reactor loop until `stop` has been observed set for
    /// [`SHUTDOWN_DRAIN_ITERATIONS`] iterations.
    pub fn run(&mut self, stop: &AtomicBool, queues: &Queues) {
        let mut shutdown_ticks = 0usize;

        while shutdown_ticks < SHUTDOWN_DRAIN_ITERATIONS {
            if stop.load(Ordering::Relaxed) {
                shutdown_ticks += 1;
            }

            let events = match self.registrar.wait() {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "registrar wait failed");
                    continue;
                },
            };

            for event in events {
                if event.token == HTTP_LISTENER_TOKEN {
                    if event.readable {
                        self.accept_http_client();
                    }
                    continue;
                }

                if event.token == UDP_TOKEN {
                    if event.readable {
                        self.handle_udp_readable(&queues.udp_in);
                    }
                    if event.writable {
                        self.handle_udp_writable(&queues.udp_out);
                    }
                    continue;
                }

                if !self.connections.contains_key(&event.token) {
                    debug!(token = event.token.0, "readiness for unregistered token");
                    continue;
                }

                if event.readable {
                    self.handle_client_readable(event.token, &queues.http_in);
                }
                if event.writable {
                    self.handle_client_writable(event.token, &queues.http_out);
                }
                if event.read_closed || event.write_closed {
                    self.deregister_client(event.token);
                }
            }
        }

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.deregister_client(token);
        }
    }

    fn accept_http_client(&mut self) {
        match socket::accept(&self.http_listener) {
            Ok((mut stream, peer)) => {
                let token = Token(self.next_token);
                self.next_token += 1;

                match self
                    .registrar
                    .register(&mut stream, token, Interest::READABLE.add(Interest::WRITABLE))
                {
                    Ok(()) => {
                        self.connections.insert(token, (peer, stream));
                    },
                    Err(e) => {
                        warn!(error = %e, %peer, "failed to register accepted client");
                    },
                }
            },
            Err(e) => {
                warn!(error = %e, "failed to accept HTTP client");
            },
        }
    }

    fn handle_udp_readable(&mut self, udp_in: &SpscQueue<Packet>) {
        match socket::udp_recv(&self.udp_socket) {
            Ok((peer, payload)) => {
                if payload.is_empty() {
                    return;
                }
                if !udp_in.push(Packet::udp(peer, payload)) {
                    warn!(%peer, "udp_in queue full, dropping packet");
                }
            },
            Err(e) => warn!(error = %e, "error receiving UDP packet"),
        }
    }

    fn handle_udp_writable(&mut self, udp_out: &SpscQueue<Packet>) {
        if let Some(packet) = udp_out.pop()
            && let Err(e) = socket::udp_send(&self.udp_socket, packet.peer, &packet.payload)
        {
            warn!(error = %e, peer = %packet.peer, "error sending UDP packet");
        }
    }

    fn handle_client_readable(&mut self, token: Token, http_in: &SpscQueue<Packet>) {
        let Some((peer, stream)) = self.connections.get_mut(&token) else {
            return;
        };
        let peer = *peer;

        match socket::tcp_recv(stream) {
            Ok(payload) => {
                if payload.is_empty() {
                    return;
                }
                if !http_in.push(Packet::http(peer, payload)) {
                    warn!(%peer, "http_in queue full, dropping packet");
                }
            },
            Err(e) => warn!(error = %e, %peer, "error receiving HTTP packet"),
        }
    }

    fn handle_client_writable(&mut self, token: Token, http_out: &SpscQueue<Packet>) {
        if self.pending_http_out.is_none() {
            self.pending_http_out = http_out.pop();
        }

        let Some(pending) = &self.pending_http_out else {
            return;
        };

        let Some((peer, stream)) = self.connections.get_mut(&token) else {
            return;
        };

        if pending.peer != *peer {
            return;
        }

        let packet = self.pending_http_out.take().expect("checked above");
        match socket::tcp_send(stream, &packet.payload) {
            Ok(()) => debug!(peer = %packet.peer, "sent HTTP response"),
            Err(e) => warn!(error = %e, peer = %packet.peer, "error sending HTTP packet"),
        }
    }

    fn deregister_client(&mut self, token: Token) {
        if let Some((peer, mut stream)) = self.connections.remove(&token) {
            if let Err(e) = self.registrar.deregister(&mut stream) {
                info!(error = %e, %peer, "failed to deregister client socket");
            } else {
                debug!(%peer, "deregistered client socket");
            }
        }
    }
}

impl Drop for IoWorker {
    fn drop(&mut self) {
        if let Err(e) = self.registrar.deregister(&mut self.udp_socket) {
            info!(error = %e, "failed to deregister UDP listener");
        }
        if let Err(e) = self.registrar.deregister(&mut self.http_listener) {
            info!(error = %e, "failed to deregister HTTP listener");
        }
    }
}
