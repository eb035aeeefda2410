// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

/// Resolves a possibly-relative path against the current working
/// directory and canonicalizes it, so config reload can compare
/// mtimes against a stable absolute path.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir().context("cannot get current working dir")?.join(p)
    };

    abs.canonicalize().with_context(|| format!("failed to canonicalize path {abs:?}"))
}

#[derive(Debug, Parser)]
#[command(name = "pgw_server", about = "PGW-style session gateway")]
pub struct ServerCli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "pgw_server_config.json")]
    pub config: String,
}

#[derive(Debug, Parser)]
#[command(name = "pgw_client", about = "Test client driving attach requests at a PGW server")]
pub struct ClientCli {
    /// Path to the JSON configuration file.
    #[arg(short = 'c', long, default_value = "pgw_client_config.json")]
    pub config: String,

    /// Starting IMSI, as a decimal string.
    #[arg(short = 'M', long = "imsi")]
    pub imsi: String,

    /// Number of sequential IMSIs to attach, starting from `-M`.
    #[arg(short = 'N', long = "count", default_value_t = 1)]
    pub count: u32,
}
