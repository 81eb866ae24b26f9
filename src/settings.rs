//! Runtime settings, layered as: built-in defaults, then an optional TOML
//! file, then `FACE_API_*` environment variables.

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File read when no path is given, if it exists
pub const DEFAULT_CONFIG_FILE: &str = "face-api.toml";

/// Prefix of environment overrides, e.g. `FACE_API_WORKERS=4`
pub const ENV_PREFIX: &str = "FACE_API";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Listen address
    pub bind: String,
    /// Number of HTTP worker threads
    pub workers: usize,
    pub keep_alive_secs: u64,
    /// Grace period for in-flight requests on shutdown
    pub shutdown_timeout_secs: u64,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub max_payload_bytes: usize,
    /// Timeout for downloading URL inputs
    pub fetch_timeout_secs: u64,
    /// Where temporary images go; the OS temp directory when unset
    pub temp_dir: Option<PathBuf>,
    /// Face engine program and its arguments, whitespace separated
    pub engine_command: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            bind: "0.0.0.0:8000".into(),
            workers: 2,
            keep_alive_secs: 5,
            shutdown_timeout_secs: 30,
            log_level: crate::config::RUST_LOG.into(),
            max_payload_bytes: crate::config::MAX_PAYLOAD_BYTES,
            fetch_timeout_secs: 30,
            temp_dir: None,
            engine_command: "face-engine".into(),
        }
    }
}

impl Settings {
    /// Load settings. An explicit `file` must exist; otherwise
    /// [`DEFAULT_CONFIG_FILE`] is used when present.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(source)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.bind, "0.0.0.0:8000");
        assert_eq!(s.workers, 2);
        assert_eq!(s.shutdown_timeout_secs, 30);
        assert_eq!(s.keep_alive(), Duration::from_secs(5));
        assert_eq!(s.temp_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
bind = "127.0.0.1:9000"
workers = 8
temp_dir = "/var/tmp/faces"
engine_command = "python3 /opt/face/bridge.py"
"#
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.bind, "127.0.0.1:9000");
        assert_eq!(s.workers, 8);
        assert_eq!(s.temp_dir(), PathBuf::from("/var/tmp/faces"));
        assert_eq!(s.engine_command, "python3 /opt/face/bridge.py");
        // untouched keys keep their defaults
        assert_eq!(s.fetch_timeout_secs, 30);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/face-api.toml"))).is_err());
    }
}
