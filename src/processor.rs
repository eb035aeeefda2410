// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The processor thread (§4.10): pops from `udp_in`/`http_in`,
//! dispatches each packet to its handler, and pushes the response onto
//! `udp_out`/`http_out`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::handlers::{http, udp};
use crate::net::Queues;
use crate::session::SessionStore;

/// Brief backoff when both input queues were empty, so the thread
/// doesn't spin a core at 100% while idle.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Exits as soon as `stop` is observed set — draining whatever is left
/// in the input queues is the I/O worker's job, not this thread's
/// (§4.10, §5).
pub fn run(stop: &Arc<AtomicBool>, queues: &Queues, store: &Arc<dyn SessionStore>) {
    while !stop.load(Ordering::Relaxed) {
        let mut did_work = false;

        if let Some(packet) = queues.udp_in.pop() {
            did_work = true;
            let response = udp::handle(packet, store);
            if !queues.udp_out.push(response) {
                warn!("udp_out queue full, dropping response");
            }
        }

        if let Some(packet) = queues.http_in.pop() {
            did_work = true;
            let response = http::handle(packet, store, stop);
            if !queues.http_out.push(response) {
                warn!("http_out queue full, dropping response");
            }
        }

        if !did_work {
            thread::sleep(IDLE_SLEEP);
        }
    }
}
