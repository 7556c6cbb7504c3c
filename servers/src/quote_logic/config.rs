use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use lib_pollbus::retrieve::HttpFetcher;

const DEFAULT_CONFIG_FILE: &str = "quote_servers.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Stock quote proxy and polling publisher", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "QUOTE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "EXPRESS_HOST", help = "Interface to listen on.")]
    pub host: Option<String>,

    #[clap(long, env = "EXPRESS_PORT", help = "Port to listen on.")]
    pub port: Option<u16>,

    #[clap(long, env = "IEX_CLOUD_BASE_ENDPOINT", help = "Upstream quote API base URL.")]
    pub upstream_base_endpoint: Option<String>,

    #[clap(long, env = "IEX_CLOUD_SECRET_TOKEN", hide_env_values = true, help = "Token passed to the upstream API as ?token=.")]
    pub upstream_token: Option<String>,

    #[clap(long, env = "BROKER_URL", help = "Message bus URL (redis://, rediss:// or memory://).")]
    pub broker_url: Option<String>,

    #[clap(long, env = "FETCH_TIMEOUT_MS", help = "Per-request upstream timeout in milliseconds; 0 disables it.")]
    pub fetch_timeout_ms: Option<u64>,

    #[clap(long, env = "STOP_GRACE_MS", help = "Milliseconds a stopping session waits for in-flight polls.")]
    pub stop_grace_ms: Option<u64>,

    #[clap(long, env = "LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

impl Config {
    fn defaults() -> Config {
        Config {
            host: Some("0.0.0.0".to_string()),
            port: Some(8080),
            upstream_base_endpoint: Some("https://cloud.iexapis.com/stable".to_string()),
            broker_url: Some("redis://127.0.0.1/".to_string()),
            fetch_timeout_ms: Some(10_000),
            stop_grace_ms: Some(5000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            upstream_base_endpoint: other.upstream_base_endpoint.or(self.upstream_base_endpoint),
            upstream_token: other.upstream_token.or(self.upstream_token),
            broker_url: other.broker_url.or(self.broker_url),
            fetch_timeout_ms: other.fetch_timeout_ms.or(self.fetch_timeout_ms),
            stop_grace_ms: other.stop_grace_ms.or(self.stop_grace_ms),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }
}

/// Fully resolved server settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub upstream_base_endpoint: String,
    pub upstream_token: Option<String>,
    pub broker_url: String,
    pub fetch_timeout: Option<Duration>,
    pub stop_grace: Duration,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Settings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upstream fetcher carrying the token and timeout.
    pub fn fetcher(&self) -> Result<HttpFetcher> {
        let fetcher = HttpFetcher::new(None, self.upstream_token.clone())?;
        Ok(match self.fetch_timeout {
            Some(timeout) => fetcher.with_timeout(timeout)?,
            None => fetcher,
        })
    }
}

/// Loads `.env`, parses CLI/env and merges: defaults < config file < env/CLI.
pub fn load_config() -> Result<Settings> {
    // .env must be in the process env before clap reads `env = ...`
    dotenvy::dotenv().ok();
    resolve(Config::parse())
}

pub fn resolve(cli_args: Config) -> Result<Settings> {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();

    if config_file_path.exists() {
        let config_str = fs::read_to_string(&config_file_path)
            .with_context(|| format!("reading config file {}", config_file_path.display()))?;
        let file_config: Config = serde_json::from_str(&config_str)
            .with_context(|| format!("parsing config file {}", config_file_path.display()))?;
        current_config = current_config.merge(file_config);
    }

    current_config = current_config.merge(cli_args);

    // Every field below has a default, so these only trip on a broken defaults().
    Ok(Settings {
        host: current_config.host.context("host is not set")?,
        port: current_config.port.context("port is not set")?,
        upstream_base_endpoint: current_config
            .upstream_base_endpoint
            .context("upstream base endpoint is not set")?,
        upstream_token: current_config.upstream_token.filter(|t| !t.is_empty()),
        broker_url: current_config.broker_url.context("broker url is not set")?,
        fetch_timeout: current_config
            .fetch_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis),
        stop_grace: Duration::from_millis(current_config.stop_grace_ms.unwrap_or(5000)),
        log_dir: current_config.log_dir.context("log dir is not set")?,
        log_level: current_config.log_level.unwrap_or_else(|| "info".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_file() -> Config {
        Config {
            config_path: Some(PathBuf::from("/nonexistent/quote_servers.conf")),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let settings = resolve(no_file()).unwrap();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
        assert_eq!(settings.broker_url, "redis://127.0.0.1/");
        assert_eq!(settings.stop_grace, Duration::from_secs(5));
        assert_eq!(settings.fetch_timeout, Some(Duration::from_secs(10)));
        assert!(settings.upstream_token.is_none());
    }

    #[test]
    fn zero_fetch_timeout_disables_it() {
        let cli = Config {
            fetch_timeout_ms: Some(0),
            ..no_file()
        };
        let settings = resolve(cli).unwrap();
        assert!(settings.fetch_timeout.is_none());
        assert!(settings.fetcher().is_ok());

        let cli = Config {
            fetch_timeout_ms: Some(250),
            ..no_file()
        };
        assert_eq!(resolve(cli).unwrap().fetch_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn file_overrides_defaults_and_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.conf");
        fs::write(
            &path,
            r#"{ "port": 9100, "brokerUrl": "memory://", "upstreamToken": "from-file" }"#,
        )
        .unwrap();

        let cli = Config {
            config_path: Some(path),
            port: Some(9200),
            ..Default::default()
        };
        let settings = resolve(cli).unwrap();
        assert_eq!(settings.port, 9200);
        assert_eq!(settings.broker_url, "memory://");
        assert_eq!(settings.upstream_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.conf");
        fs::write(&path, "{ not json").unwrap();
        let cli = Config {
            config_path: Some(path),
            ..Default::default()
        };
        assert!(resolve(cli).is_err());
    }
}
