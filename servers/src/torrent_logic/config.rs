use anyhow::{Context, Result};
use clap::Parser;
use lib_common::configs::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up when `--config-path` isn't given.
const DEFAULT_CONFIG_FILE: &str = "server_torrent.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Torrent daemon live-state server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "TORRENT_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "TORRENT_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "TORRENT_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "TORRENT_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "TORRENT_CLIENT_URL", help = "Base URL of the torrent daemon's JSON bridge.")]
    pub client_url: Option<String>,

    #[clap(long, env = "TORRENT_CLIENT_TOKEN", help = "Bearer token for the JSON bridge.")]
    pub client_token: Option<String>,

    #[clap(long, env = "TORRENT_CLIENT_TIMEOUT_MS", help = "Per-request timeout towards the bridge, in milliseconds.")]
    pub client_timeout_ms: Option<u64>,

    /// Poll, history and rollup settings. File only.
    #[clap(skip)]
    pub engine: Option<EngineConfig>,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub client_url: String,
    pub client_token: Option<String>,
    pub client_timeout: Duration,
    pub engine: EngineConfig,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            client_url: other.client_url.or(self.client_url),
            client_token: other.client_token.or(self.client_token),
            client_timeout_ms: other.client_timeout_ms.or(self.client_timeout_ms),
            engine: other.engine.or(self.engine),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(3000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            client_url: Some("http://127.0.0.1:3001/api/".to_string()),
            client_timeout_ms: Some(10_000),
            engine: Some(EngineConfig::default()),
            ..Default::default()
        }
    }

    fn resolve(self) -> Result<Settings> {
        let engine = self.engine.unwrap_or_default();
        engine.validate().context("invalid engine section")?;

        Ok(Settings {
            port: self.port.unwrap_or(3000),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.unwrap_or_else(|| "info".to_string()),
            client_url: self.client_url.context("no torrent client URL configured")?,
            client_token: self.client_token,
            client_timeout: Duration::from_millis(self.client_timeout_ms.unwrap_or(10_000)),
            engine,
        })
    }
}

/// Reads a config file. A missing file is not an error; an unreadable or
/// malformed one is.
fn read_config_file(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config = serde_json::from_str::<Config>(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(config))
}

/// Candidate config file paths, in lookup order.
fn config_candidates(cli: &Config) -> Vec<PathBuf> {
    if let Some(path) = &cli.config_path {
        return vec![path.clone()];
    }
    let mut candidates = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("server_torrent").join(DEFAULT_CONFIG_FILE));
    }
    candidates
}

/// Defaults, then the config file, then environment variables and CLI flags.
pub fn load_from(cli: Config) -> Result<Settings> {
    let mut current = Config::defaults();

    let mut found = false;
    for path in config_candidates(&cli) {
        if let Some(file_config) = read_config_file(&path)? {
            tracing::info!(path = %path.display(), "loaded config file");
            current = current.merge(file_config);
            found = true;
            break;
        }
    }
    if !found {
        tracing::info!("no config file found, using defaults and environment/CLI values");
    }

    current.merge(cli).resolve()
}

/// [`load_from`] with the process's arguments and environment.
pub fn load_config() -> Result<Settings> {
    load_from(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let cli = Config {
            config_path: Some(PathBuf::from("/nonexistent/server_torrent.conf")),
            ..Default::default()
        };
        let settings = load_from(cli).unwrap();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.engine, EngineConfig::default());
    }

    #[test]
    fn test_file_then_cli_precedence() {
        let file = file_with(
            r#"{"port": 4000, "logLevel": "debug", "clientUrl": "http://bridge:9/api/",
                "engine": {"pollIntervalMs": 500}}"#,
        );
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(5000),
            ..Default::default()
        };

        let settings = load_from(cli).unwrap();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.client_url, "http://bridge:9/api/");
        assert_eq!(settings.engine.poll_interval_ms, 500);
        assert_eq!(settings.engine.max_history_states, 30);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = file_with("{ not json");
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(load_from(cli).is_err());
    }

    #[test]
    fn test_invalid_engine_is_rejected() {
        let file = file_with(r#"{"engine": {"historyEras": []}}"#);
        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(load_from(cli).is_err());
    }
}
