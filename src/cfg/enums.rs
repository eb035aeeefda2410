// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Log verbosity configured through the reloadable section of
/// [`crate::cfg::server_config::ServerConfig`] (§6).
///
/// Maps onto [`tracing::Level`]; `Critical` has no `tracing` analogue
/// and is treated as `Error`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    #[serde(rename = "DEBUG", alias = "Debug", alias = "debug")]
    Debug,
    #[serde(rename = "INFO", alias = "Info", alias = "info")]
    Info,
    #[serde(rename = "WARNING", alias = "Warning", alias = "warning")]
    Warning,
    #[serde(rename = "ERROR", alias = "Error", alias = "error")]
    Error,
    #[serde(rename = "CRITICAL", alias = "Critical", alias = "critical")]
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        })
    }
}

impl LogLevel {
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}
