// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use pgw::cdr::CdrJournal;
use pgw::cfg::cli::{ServerCli, resolve_config_path};
use pgw::cfg::logger;
use pgw::cfg::server_config::ServerConfig;
use pgw::ie::Imsi;
use pgw::net::{IoWorker, Queues};
use pgw::processor;
use pgw::queue::SpscQueue;
use pgw::session::{SessionStore, ShardedSessionStore};
use tracing::{debug, error, info};

const UDP_IN_CAPACITY: usize = 10_000;
const UDP_OUT_CAPACITY: usize = 10_000;
const HTTP_IN_CAPACITY: usize = 1_000;
const HTTP_OUT_CAPACITY: usize = 1_000;
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let cli = ServerCli::parse();
    let config_path = resolve_config_path(&cli.config)?;
    let mut server_config = ServerConfig::load(&config_path)?;

    let (_guard, filter_handle) =
        logger::init_logger(&server_config.fixed.log_file, server_config.reloadable.log_level)?;

    let blacklist: HashSet<Imsi> = server_config
        .fixed
        .blacklist
        .iter()
        .filter_map(|s| match Imsi::from_str_digits(s) {
            Ok(imsi) => Some(imsi),
            Err(_) => {
                info!(imsi = %s, "invalid IMSI in blacklist will be skipped");
                None
            },
        })
        .collect();

    let session_timeout = Arc::new(AtomicU64::new(server_config.reloadable.session_timeout_sec));
    let graceful_shutdown_rate = Arc::new(AtomicU64::new(server_config.reloadable.graceful_shutdown_rate));
    let stop = Arc::new(AtomicBool::new(false));

    let cdr = Arc::new(CdrJournal::open(
        &server_config.fixed.cdr_file,
        server_config.fixed.cdr_file_max_lines,
    )?);

    let store: Arc<dyn SessionStore> = ShardedSessionStore::new(
        Arc::clone(&session_timeout),
        Arc::clone(&graceful_shutdown_rate),
        Arc::clone(&cdr),
        blacklist,
        Arc::clone(&stop),
    );

    let mut io_worker = IoWorker::new(
        server_config.fixed.udp_ip,
        server_config.fixed.udp_port,
        server_config.fixed.http_ip,
        server_config.fixed.http_port,
    )?;
    debug!("IO worker created");

    let queues = Queues {
        udp_in: SpscQueue::new(UDP_IN_CAPACITY),
        udp_out: SpscQueue::new(UDP_OUT_CAPACITY),
        http_in: SpscQueue::new(HTTP_IN_CAPACITY),
        http_out: SpscQueue::new(HTTP_OUT_CAPACITY),
    };

    thread::scope(|scope| {
        scope.spawn(|| io_worker.run(&stop, &queues));
        scope.spawn(|| processor::run(&stop, &queues, &store));

        while !stop.load(Ordering::Relaxed) {
            match server_config.try_reload() {
                Ok(true) => {
                    session_timeout.store(server_config.reloadable.session_timeout_sec, Ordering::Relaxed);
                    graceful_shutdown_rate
                        .store(server_config.reloadable.graceful_shutdown_rate, Ordering::Relaxed);
                    if let Err(e) = logger::set_level(&filter_handle, server_config.reloadable.log_level) {
                        error!(error = %e, "failed to apply reloaded log level");
                    }
                    debug!(
                        session_timeout_sec = server_config.reloadable.session_timeout_sec,
                        graceful_shutdown_rate = server_config.reloadable.graceful_shutdown_rate,
                        log_level = %server_config.reloadable.log_level,
                        "configuration reloaded"
                    );
                },
                Ok(false) => {},
                Err(e) => error!(error = %e, "config reload failed"),
            }

            thread::sleep(CONFIG_POLL_INTERVAL);
        }
    });

    Ok(())
}
