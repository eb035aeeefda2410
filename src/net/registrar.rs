// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Thin wrapper over a level-triggered readiness facility (`mio::Poll`
//! on top of epoll/kqueue/IOCP).
//!
//! The registrar itself knows nothing about sockets or packets — it is
//! an interest set of `(Token, Interest)` pairs plus a bounded event
//! buffer, exactly as described in §4.3.

use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

/// Maximum readiness events drained per `wait` call.
pub const MAX_EVENTS: usize = 32;
/// Upper bound on how long `wait` blocks with no ready fds.
pub const WAIT_TIMEOUT_MS: u64 = 1000;

/// A single readiness notification: which token became ready, and
/// which of the READ/WRITE/HUP/RDHUP edges fired.
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub read_closed: bool,
    pub write_closed: bool,
}

pub struct Registrar {
    poll: Poll,
    events: Events,
}

impl Registrar {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(MAX_EVENTS),
        })
    }

    /// Inserts `source` into the interest set under `token`. Fails if
    /// `token` is already registered.
    pub fn register<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        self.poll.registry().register(source, token, interests)
    }

    /// Removes `source` from the interest set. Does not close the
    /// underlying fd — callers own that lifecycle (dropping the mio
    /// type closes it).
    pub fn deregister<S: Source + ?Sized>(&self, source: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Blocks up to [`WAIT_TIMEOUT_MS`], returning the ready events
    /// (at most [`MAX_EVENTS`]). An empty `Vec` means the wait timed
    /// out with nothing ready.
    pub fn wait(&mut self) -> io::Result<Vec<ReadyEvent>> {
        self.events.clear();
        self.poll
            .poll(&mut self.events, Some(Duration::from_millis(WAIT_TIMEOUT_MS)))?;

        Ok(self
            .events
            .iter()
            .map(|e| ReadyEvent {
                token: e.token(),
                readable: e.is_readable(),
                writable: e.is_writable(),
                read_closed: e.is_read_closed(),
                write_closed: e.is_write_closed(),
            })
            .collect())
    }
}
