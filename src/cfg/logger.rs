// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Logging setup: a non-blocking file writer plus a hot-reloadable
//! filter, so `log_level` in the reloadable config section (§6) can
//! change without restarting the process.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use crate::cfg::enums::LogLevel;

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Initializes the global subscriber, writing to `log_file` (created
/// if missing, appended to if present). Returns the appender's
/// [`WorkerGuard`] (drop it only at process exit, or buffered lines
/// are lost) and a handle for hot-reloading the level.
pub fn init_logger(log_file: &Path, level: LogLevel) -> Result<(WorkerGuard, FilterHandle)> {
    let dir = log_file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let file_name = log_file.file_name().context("log_file has no file name component")?;

    std::fs::create_dir_all(dir).with_context(|| format!("failed to create log directory {dir:?}"))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing().to_string()));
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    let fmt_layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);

    Registry::default().with(filter_layer).with(fmt_layer).try_init().context("failed to install global tracing subscriber")?;

    Ok((guard, handle))
}

/// Swaps the active level filter, used when a config reload (§6)
/// changes `log_level`.
pub fn set_level(handle: &FilterHandle, level: LogLevel) -> Result<()> {
    handle
        .reload(EnvFilter::new(level.to_tracing().to_string()))
        .context("failed to reload log level")
}
