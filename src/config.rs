//! CLI/environment configuration, kept separate from the core so the
//! core never sees argv.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

/// Implementation-chosen default listen address.
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5000";

/// Typical request log capacity.
const DEFAULT_REQUEST_LOG_CAPACITY: usize = 100;

#[derive(Debug, Parser)]
#[command(name = "shamd", about = "A programmable HTTP mock server")]
pub struct Settings {
    /// Directory of registration files (JSON or YAML), loaded at startup
    /// in directory-listing order. All files must be present and valid
    /// for the process to start.
    #[arg(long, env = "SHAM_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Bounded request-log capacity; 0 means unbounded.
    #[arg(long, env = "SHAM_REQUEST_LOG_CAPACITY", default_value_t = DEFAULT_REQUEST_LOG_CAPACITY)]
    pub request_log_capacity: usize,

    /// Address to bind the HTTP listener to.
    #[arg(long, env = "SHAM_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,
}

impl Settings {
    pub fn parsed_listen_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::StartupIoFailure(format!("invalid listen address: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_apply_when_no_flags_given() {
        let settings = Settings::parse_from(["shamd"]);
        assert_eq!(settings.request_log_capacity, DEFAULT_REQUEST_LOG_CAPACITY);
        assert_eq!(settings.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(settings.config_dir.is_none());
    }

    #[test]
    fn invalid_listen_addr_is_a_startup_failure() {
        let settings = Settings::parse_from(["shamd", "--listen-addr", "not-an-addr"]);
        assert!(settings.parsed_listen_addr().is_err());
    }
}
