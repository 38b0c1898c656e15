//! Runtime configuration for a pcommon-based service: listen address,
//! socket timeouts, HTTP identity strings, and journal storage
//! location. Grounded on `yaleman-goatns`'s `ConfigFile` — a plain
//! `serde`-derived struct loaded through the `config` crate with
//! environment-variable overrides, falling back to built-in defaults
//! when no file is found.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Address the HTTP server listens on, e.g. `0.0.0.0`.
    pub listen_address: String,
    /// Port the HTTP server listens on.
    pub listen_port: u16,
    /// Connect/accept timeout, in microseconds (spec §5 "N" timeouts).
    pub connect_timeout_us: u64,
    /// Read/write timeout, in milliseconds (spec §5 "H" framing).
    pub io_timeout_ms: u64,
    /// `Server:`/`User-Agent:` identity string stamped on messages.
    pub identity: String,
    /// Directory holding journal operation logs and checkpoints.
    pub journal_dir: PathBuf,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        ConfigFile {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 8080,
            connect_timeout_us: 5_000_000,
            io_timeout_ms: 30_000,
            identity: "pcommon/0.1".to_string(),
            journal_dir: PathBuf::from("./journal"),
            log_level: "info".to_string(),
        }
    }
}

impl ConfigFile {
    /// Loads configuration from `path` if given, else from
    /// `./pcommon.json`, overlaying `PCOMMON_`-prefixed environment
    /// variables, falling back to [`ConfigFile::default`] if nothing
    /// is found.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        let candidate = path
            .map(str::to_string)
            .unwrap_or_else(|| "./pcommon.json".to_string());

        if !std::path::Path::new(&candidate).exists() {
            return Ok(Self::default());
        }

        let builder = config::Config::builder()
            .add_source(config::File::new(&candidate, config::FileFormat::Json))
            .add_source(config::Environment::with_prefix("pcommon"));

        let loaded = builder
            .build()
            .map_err(|e| format!("failed to load config from {candidate}: {e}"))?;

        loaded
            .try_deserialize()
            .map_err(|e| format!("failed to parse config from {candidate}: {e}"))
    }

    pub fn listen_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.listen_address, self.listen_port)
            .parse()
            .map_err(|e| format!("invalid listen address: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = ConfigFile::load(Some("/nonexistent/pcommon.json")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn listen_addr_parses_host_and_port() {
        let config = ConfigFile::default();
        let addr = config.listen_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
