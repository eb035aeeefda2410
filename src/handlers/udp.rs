// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! UDP attach-request handler (§4.8): decodes an IMSI IE and maps it
//! onto a create/update against the session store.

use std::sync::Arc;

use tracing::debug;

use crate::ie::Imsi;
use crate::net::Packet;
use crate::session::SessionStore;

/// Decodes `packet`'s payload as an IMSI IE and dispatches it against
/// `store`, replacing the payload with the plain-text response the
/// original sender expects.
pub fn handle(packet: Packet, store: &Arc<dyn SessionStore>) -> Packet {
    let imsi = match Imsi::from_ie(&packet.payload) {
        Ok(imsi) => imsi,
        Err(e) => {
            debug!(error = %e, "received message without IMSI IE");
            return packet.respond_with(b"rejected, not IMSI IE".to_vec());
        },
    };

    if store.read(&imsi).is_some() {
        let response = if store.update(&imsi) {
            "updated"
        } else {
            "rejected, the last update was too recent"
        };
        return packet.respond_with(response.as_bytes().to_vec());
    }

    let response = if store.create(imsi) {
        "created"
    } else {
        "rejected, IMSI blacklisted or error creating session"
    };
    packet.respond_with(response.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU64};

    use tempfile::tempdir;

    use super::*;
    use crate::cdr::CdrJournal;
    use crate::net::Endpoint;
    use crate::session::ShardedSessionStore;

    fn test_store() -> Arc<dyn SessionStore> {
        let dir = tempdir().expect("tempdir");
        let cdr = Arc::new(CdrJournal::open(dir.path().join("cdr.csv"), 1000).expect("open cdr"));
        ShardedSessionStore::new(
            Arc::new(AtomicU64::new(3600)),
            Arc::new(AtomicU64::new(10)),
            cdr,
            HashSet::new(),
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn first_attach_creates_a_session() {
        let store = test_store();
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        let packet = Packet::udp(Endpoint::unspecified(), imsi.to_ie());
        let response = handle(packet, &store);
        assert_eq!(response.payload, b"created");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let store = test_store();
        let packet = Packet::udp(Endpoint::unspecified(), vec![0xAA, 0xBB]);
        let response = handle(packet, &store);
        assert_eq!(response.payload, b"rejected, not IMSI IE");
    }
}
