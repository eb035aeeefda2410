// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Test client (§5): attaches `-N` sequential IMSIs starting at `-M`
//! against a running server and reports how many responses matched
//! the expected set.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pgw::cfg::cli::{ClientCli, resolve_config_path};
use pgw::cfg::client_config::ClientConfig;
use pgw::cfg::logger;
use pgw::ie::Imsi;
use pgw::net::{Endpoint, IoWorker, Packet, Queues};
use pgw::queue::SpscQueue;
use tracing::{debug, info, warn};

const UDP_IN_CAPACITY: usize = 10_000;
const UDP_OUT_CAPACITY: usize = 10_000;
const HTTP_IN_CAPACITY: usize = 1;
const HTTP_OUT_CAPACITY: usize = 1;
const IDLE_SLEEP: Duration = Duration::from_millis(5);

const EXPECTED_RESPONSES: [&str; 3] = ["created", "updated", "rejected, IMSI blacklisted or error creating session"];

fn main() -> Result<()> {
    let cli = ClientCli::parse();
    let config_path = resolve_config_path(&cli.config)?;
    let client_config = ClientConfig::load(&config_path)?;

    let (_guard, _filter_handle) = logger::init_logger(&client_config.log_file, client_config.log_level)?;

    let start_imsi = match Imsi::from_str_digits(&cli.imsi) {
        Ok(imsi) => imsi,
        Err(e) => {
            tracing::error!(error = %e, imsi = %cli.imsi, "wrong IMSI in arguments");
            return Err(e.into());
        },
    };

    let imsi_amount = if cli.count == 0 {
        info!("wrong number of IMSI to generate, use N = 1");
        1
    } else {
        cli.count
    };

    debug!(imsi = %start_imsi, "start with IMSI");
    debug!(imsi_amount, "number of IMSI to generate");

    let stop = Arc::new(AtomicBool::new(false));
    let mut io_worker = IoWorker::new(Ipv4Addr::UNSPECIFIED, 0, Ipv4Addr::UNSPECIFIED, 0)?;
    debug!("IO worker object created");

    let queues = Queues {
        udp_in: SpscQueue::new(UDP_IN_CAPACITY),
        udp_out: SpscQueue::new(UDP_OUT_CAPACITY),
        http_in: SpscQueue::new(HTTP_IN_CAPACITY),
        http_out: SpscQueue::new(HTTP_OUT_CAPACITY),
    };

    let server_endpoint = Endpoint::new(client_config.server_udp_ip, client_config.server_udp_port);

    let imsis = generate_sequential_imsis(&start_imsi, imsi_amount);
    let mut sent = Vec::with_capacity(imsis.len());
    for imsi in imsis {
        let packet = Packet::udp(server_endpoint, imsi.to_ie());
        if queues.udp_out.push(packet) {
            info!(%imsi, "send IE with IMSI");
            sent.push(imsi);
        } else {
            warn!(%imsi, "can't send IMSI IE, queue is full");
        }
    }

    thread::scope(|scope| {
        scope.spawn(|| io_worker.run(&stop, &queues));

        let mut amount_of_responses = 0usize;
        let mut amount_of_unexpected_responses = 0usize;

        while amount_of_responses < sent.len() {
            match queues.udp_in.pop() {
                Some(packet) => {
                    let text = String::from_utf8_lossy(&packet.payload);
                    println!(
                        "For IMSI {} response [{amount_of_responses}]: {text}",
                        sent[amount_of_responses].as_str()
                    );
                    info!(imsi = %sent[amount_of_responses], amount_of_responses, %text, "receive UDP response");

                    if !EXPECTED_RESPONSES.contains(&text.as_ref()) {
                        warn!("server sent unexpected response");
                        amount_of_unexpected_responses += 1;
                    }
                    amount_of_responses += 1;
                },
                None => thread::sleep(IDLE_SLEEP),
            }
        }

        if amount_of_responses > 0 {
            let expected = amount_of_responses - amount_of_unexpected_responses;
            debug!(
                expected,
                amount_of_responses,
                ratio = expected as f64 / amount_of_responses as f64,
                "response summary"
            );
        }

        stop.store(true, Ordering::SeqCst);
    });

    Ok(())
}

/// Builds `count` sequential IMSIs starting at `start`'s numeric
/// value, zero-padded to `start`'s digit width. IMSIs that overflow
/// that width (and so would exceed 15 digits) are skipped with a
/// warning rather than silently truncated.
fn generate_sequential_imsis(start: &Imsi, count: u32) -> Vec<Imsi> {
    let width = start.as_str().len();
    let Ok(start_value) = start.as_str().parse::<u64>() else {
        return vec![start.clone()];
    };

    let mut out = Vec::with_capacity(count as usize);
    for offset in 0..u64::from(count) {
        let value = start_value + offset;
        let candidate = format!("{value:0width$}");
        match Imsi::from_str_digits(&candidate) {
            Ok(imsi) => out.push(imsi),
            Err(e) => warn!(error = %e, candidate, "can't create IMSI"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_sequential_zero_padded_imsis() {
        let start = Imsi::from_str_digits("001010000000001").expect("imsi");
        let generated = generate_sequential_imsis(&start, 3);
        assert_eq!(generated.len(), 3);
        assert_eq!(generated[0].as_str(), "001010000000001");
        assert_eq!(generated[1].as_str(), "001010000000002");
        assert_eq!(generated[2].as_str(), "001010000000003");
    }
}
