// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Test client configuration: just enough to find the server and set
//! up logging, no reload support (the client is short-lived).

use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cfg::enums::LogLevel;

#[derive(Debug, Deserialize)]
struct RawConfig {
    server_udp_ip: String,
    server_udp_port: u16,
    log_file: String,
    log_level: LogLevel,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_udp_ip: Ipv4Addr,
    pub server_udp_port: u16,
    pub log_file: PathBuf,
    pub log_level: LogLevel,
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).with_context(|| format!("can't open config file {path:?}"))?;
        let raw: RawConfig = serde_json::from_str(&contents).with_context(|| format!("invalid config JSON in {path:?}"))?;

        let server_udp_ip: Ipv4Addr = raw.server_udp_ip.parse().context("server_udp_ip invalid")?;

        Ok(Self {
            server_udp_ip,
            server_udp_port: raw.server_udp_port,
            log_file: PathBuf::from(raw.log_file),
            log_level: raw.log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn loads_valid_config() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{"server_udp_ip": "127.0.0.1", "server_udp_port": 9000, "log_file": "client.log", "log_level": "INFO"}}"#
        )
        .expect("write");

        let cfg = ClientConfig::load(file.path()).expect("load");
        assert_eq!(cfg.server_udp_port, 9000);
        assert_eq!(cfg.server_udp_ip, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn rejects_invalid_ip() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{"server_udp_ip": "not-an-ip", "server_udp_port": 9000, "log_file": "client.log", "log_level": "INFO"}}"#
        )
        .expect("write");

        assert!(ClientConfig::load(file.path()).is_err());
    }
}
