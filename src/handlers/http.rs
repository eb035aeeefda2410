// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! HTTP control-plane handler (§4.9): a two-route HTTP/1.x server —
//! `/check_subscriber` queries the session store, `/stop` begins
//! shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::ie::Imsi;
use crate::net::Packet;
use crate::session::SessionStore;

/// Single-shot request size cap (§4.9, §9 open question (a)): a
/// request split across reads is never reassembled.
const MAX_HTTP_SIZE: usize = 8192;
const MAX_HEADERS: usize = 16;

/// Parses `packet`'s payload as one whole HTTP/1.x request and
/// replaces its payload with the full response (status line, headers,
/// body).
pub fn handle(packet: Packet, store: &Arc<dyn SessionStore>, stop: &Arc<AtomicBool>) -> Packet {
    if packet.payload.len() > MAX_HTTP_SIZE {
        warn!("the received HTTP packet was too long");
        return packet.respond_with(error_response(400, "Bad Request"));
    }

    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut header_storage);

    let parsed = match request.parse(&packet.payload) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) | Err(_) => {
            warn!("the received HTTP packet could not be processed");
            return packet.respond_with(error_response(400, "Bad Request"));
        },
    };
    let _ = parsed;

    let method = request.method.unwrap_or("");
    let path = request.path.unwrap_or("");
    let version = request.version.unwrap_or(1);

    debug!(method, path, version, "parsed HTTP request");

    let response = process_request(path, request.headers, store, stop);
    packet.respond_with(response)
}

fn process_request(
    path: &str,
    headers: &[httparse::Header<'_>],
    store: &Arc<dyn SessionStore>,
    stop: &Arc<AtomicBool>,
) -> Vec<u8> {
    let mut status_line = "HTTP/1.1 200 OK\r\n".to_string();
    let mut content = String::new();

    match path {
        "/check_subscriber" => {
            status_line = "HTTP/1.1 400 Bad Request\r\n".to_string();

            let imsi_header = headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("IMSI"))
                .and_then(|h| std::str::from_utf8(h.value).ok())
                .map(|v| match v.find('\\') {
                    Some(idx) => &v[..idx],
                    None => v,
                });

            if let Some(imsi_str) = imsi_header
                && let Ok(imsi) = Imsi::from_str_digits(imsi_str)
            {
                debug!(%imsi, "check session existence");
                content = if store.read(&imsi).is_some() {
                    "active".to_string()
                } else {
                    "not active".to_string()
                };
                status_line = "HTTP/1.1 200 OK\r\n".to_string();
            }
        },
        "/stop" => {
            stop.store(true, Ordering::SeqCst);
            debug!("start offload");
            content = "offload started".to_string();
        },
        _ => {},
    }

    let mut response = status_line.into_bytes();
    response.extend_from_slice(b"Content-Type: text/plain\r\n");
    response.extend_from_slice(format!("Content-Length: {}\r\n\r\n", content.len()).as_bytes());
    response.extend_from_slice(content.as_bytes());
    response
}

fn error_response(status_code: u16, message: &str) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 {status_code} {message}\r\n").into_bytes();
    response.extend_from_slice(format!("Content-Length: {}\r\n\r\n", message.len()).as_bytes());
    response.extend_from_slice(message.as_bytes());
    response
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU64;

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
    fn check_subscriber_reports_not_active_for_unknown_imsi() {
        let store = test_store();
        let stop = Arc::new(AtomicBool::new(false));
        let request = b"GET /check_subscriber HTTP/1.1\r\nIMSI: 001010000000001\r\n\r\n".to_vec();
        let packet = Packet::http(Endpoint::unspecified(), request);
        let response = handle(packet, &store, &stop);
        let text = String::from_utf8_lossy(&response.payload);
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.ends_with("not active"));
    }

    #[test]
    fn check_subscriber_reports_active_for_known_imsi() {
        let store = test_store();
        let stop = Arc::new(AtomicBool::new(false));
        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        store.create(imsi);
        let request = b"GET /check_subscriber HTTP/1.1\r\nIMSI: 001010000000001\r\n\r\n".to_vec();
        let packet = Packet::http(Endpoint::unspecified(), request);
        let response = handle(packet, &store, &stop);
        let text = String::from_utf8_lossy(&response.payload);
        assert!(text.ends_with("active"));
    }

    #[test]
    fn check_subscriber_without_header_is_bad_request() {
        let store = test_store();
        let stop = Arc::new(AtomicBool::new(false));
        let request = b"GET /check_subscriber HTTP/1.1\r\n\r\n".to_vec();
        let packet = Packet::http(Endpoint::unspecified(), request);
        let response = handle(packet, &store, &stop);
        let text = String::from_utf8_lossy(&response.payload);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[test]
    fn stop_route_sets_stop_flag() {
        let store = test_store();
        let stop = Arc::new(AtomicBool::new(false));
        let request = b"GET /stop HTTP/1.1\r\n\r\n".to_vec();
        let packet = Packet::http(Endpoint::unspecified(), request);
        let response = handle(packet, &store, &stop);
        assert!(stop.load(Ordering::SeqCst));
        assert!(String::from_utf8_lossy(&response.payload).ends_with("offload started"));
    }

    #[test]
    fn malformed_request_is_bad_request() {
        let store = test_store();
        let stop = Arc::new(AtomicBool::new(false));
        let packet = Packet::http(Endpoint::unspecified(), b"not an http request at all".to_vec());
        let response = handle(packet, &store, &stop);
        assert!(String::from_utf8_lossy(&response.payload).starts_with("HTTP/1.1 400 Bad Request"));
    }
}
