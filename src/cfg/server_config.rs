// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server configuration (§6): a JSON file split into an unreloadable
//! part (sockets, CDR, blacklist) read once at startup, and a
//! reloadable part (session timeout, shutdown rate, log level)
//! re-read whenever the file's mtime changes.

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail, ensure};
use serde::Deserialize;

use crate::cfg::enums::LogLevel;

const MIN_CDR_MAX_LINES: usize = 1000;
const MAX_SESSION_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct RawConfig {
    udp_ip: String,
    udp_port: u16,
    http_ip: String,
    http_port: u16,
    cdr_file: String,
    cdr_file_max_lines: usize,
    log_file: String,
    #[serde(default)]
    blacklist: Vec<String>,
    session_timeout_sec: u64,
    gracefull_shutdown_rate: u64,
    log_level: LogLevel,
}

/// The unreloadable half of the config: read once, fixed for the
/// process lifetime.
#[derive(Debug, Clone)]
pub struct Fixed {
    pub udp_ip: Ipv4Addr,
    pub udp_port: u16,
    pub http_ip: Ipv4Addr,
    pub http_port: u16,
    pub cdr_file: PathBuf,
    pub cdr_file_max_lines: usize,
    pub log_file: PathBuf,
    pub blacklist: Vec<String>,
}

/// The reloadable half: re-read on every detected mtime change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reloadable {
    pub session_timeout_sec: u64,
    pub graceful_shutdown_rate: u64,
    pub log_level: LogLevel,
}

pub struct ServerConfig {
    path: PathBuf,
    last_modified: SystemTime,
    pub fixed: Fixed,
    pub reloadable: Reloadable,
}

impl ServerConfig {
    /// Loads and validates both halves from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let last_modified = fs::metadata(&path)?.modified()?;
        let raw = read_raw(&path)?;

        let fixed = parse_fixed(&raw)?;
        let reloadable = parse_reloadable(&raw)?;

        Ok(Self { path, last_modified, fixed, reloadable })
    }

    /// Re-reads the reloadable section if the file's mtime changed
    /// since the last successful load, returning `true` if the
    /// reloadable values actually changed.
    pub fn try_reload(&mut self) -> Result<bool> {
        let current_modified = fs::metadata(&self.path)?.modified()?;
        if current_modified == self.last_modified {
            return Ok(false);
        }

        let raw = read_raw(&self.path)?;
        let reloadable = parse_reloadable(&raw)?;

        self.last_modified = current_modified;
        if reloadable != self.reloadable {
            self.reloadable = reloadable;
            return Ok(true);
        }

        Ok(false)
    }
}

fn read_raw(path: &Path) -> Result<RawConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("can't open config file {path:?}"))?;
    serde_json::from_str(&contents).with_context(|| format!("invalid config JSON in {path:?}"))
}

fn parse_fixed(raw: &RawConfig) -> Result<Fixed> {
    let udp_ip: Ipv4Addr = raw.udp_ip.parse().context("udp_ip invalid")?;
    let http_ip: Ipv4Addr = raw.http_ip.parse().context("http_ip invalid")?;

    ensure!(
        raw.cdr_file_max_lines >= MIN_CDR_MAX_LINES,
        "CDR journal too short (min {MIN_CDR_MAX_LINES} lines)"
    );

    Ok(Fixed {
        udp_ip,
        udp_port: raw.udp_port,
        http_ip,
        http_port: raw.http_port,
        cdr_file: PathBuf::from(&raw.cdr_file),
        cdr_file_max_lines: raw.cdr_file_max_lines,
        log_file: PathBuf::from(&raw.log_file),
        blacklist: raw.blacklist.clone(),
    })
}

fn parse_reloadable(raw: &RawConfig) -> Result<Reloadable> {
    if raw.session_timeout_sec == 0 {
        bail!("zero session timeout");
    }
    if raw.session_timeout_sec > MAX_SESSION_TIMEOUT_SECS {
        bail!("session timeout too long (max 1 day)");
    }
    if raw.gracefull_shutdown_rate == 0 {
        bail!("zero shutdown rate");
    }

    Ok(Reloadable {
        session_timeout_sec: raw.session_timeout_sec,
        graceful_shutdown_rate: raw.gracefull_shutdown_rate,
        log_level: raw.log_level,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(file, "{contents}").expect("write");
        file
    }

    const VALID: &str = r#"{
        "udp_ip": "0.0.0.0",
        "udp_port": 9000,
        "http_ip": "0.0.0.0",
        "http_port": 8080,
        "cdr_file": "cdr.csv",
        "cdr_file_max_lines": 1000,
        "log_file": "pgw.log",
        "blacklist": ["001010000000009"],
        "session_timeout_sec": 3600,
        "gracefull_shutdown_rate": 10,
        "log_level": "DEBUG"
    }"#;

    #[test]
    fn loads_valid_config() {
        let file = write_config(VALID);
        let cfg = ServerConfig::load(file.path()).expect("load");
        assert_eq!(cfg.fixed.udp_port, 9000);
        assert_eq!(cfg.reloadable.session_timeout_sec, 3600);
    }

    #[test]
    fn rejects_short_cdr_journal() {
        let file = write_config(VALID.replace("1000", "10").as_str());
        assert!(ServerConfig::load(file.path()).is_err());
    }

    #[test]
    fn rejects_zero_session_timeout() {
        let file = write_config(VALID.replace("3600", "0").as_str());
        assert!(ServerConfig::load(file.path()).is_err());
    }

    #[test]
    fn reload_detects_no_change_without_mtime_bump() {
        let file = write_config(VALID);
        let mut cfg = ServerConfig::load(file.path()).expect("load");
        assert!(!cfg.try_reload().expect("reload"));
    }
}
