//! uptrack.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid duration {value:?} for {field}")]
    InvalidDuration { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UptrackConfig {
    pub monitor: MonitorConfig,
    pub probe: ProbeConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sweep cadence, e.g. "60s".
    pub interval: String,
    /// Maximum in-flight probes per sweep.
    pub concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: "60s".to_string(),
            concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    #[default]
    Tcp,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    pub timeout: String,
    /// Port used when an endpoint url does not name one.
    pub default_port: u16,
    /// Request path for HTTP probes.
    pub path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::Tcp,
            timeout: "2s".to_string(),
            default_port: 80,
            path: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// How long to wait for the database while another process holds it.
    pub lock_wait: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/uptrack"),
            lock_wait: "5s".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl UptrackConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: UptrackConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check durations and counts up front so the daemon fails at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor_interval()?;
        self.probe_timeout()?;
        self.storage_lock_wait()?;
        if self.monitor.concurrency == 0 {
            return Err(ConfigError::Zero("monitor.concurrency"));
        }
        if self.probe.default_port == 0 {
            return Err(ConfigError::Zero("probe.default_port"));
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Result<Duration, ConfigError> {
        non_zero_duration("monitor.interval", &self.monitor.interval)
    }

    pub fn probe_timeout(&self) -> Result<Duration, ConfigError> {
        non_zero_duration("probe.timeout", &self.probe.timeout)
    }

    pub fn storage_lock_wait(&self) -> Result<Duration, ConfigError> {
        non_zero_duration("storage.lock_wait", &self.storage.lock_wait)
    }

    /// Database file inside the data directory.
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join("uptrack.redb")
    }
}

fn non_zero_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }),
    }
}

/// Parse a duration string like "5s", "500ms", "1m". Bare numbers are seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = UptrackConfig::default();
        config.validate().unwrap();
        assert_eq!(config.monitor_interval().unwrap(), Duration::from_secs(60));
        assert_eq!(config.probe_timeout().unwrap(), Duration::from_secs(2));
        assert_eq!(config.probe.kind, ProbeKind::Tcp);
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/uptrack/uptrack.redb")
        );
    }

    #[test]
    fn parse_partial_file() {
        let config = UptrackConfig::from_toml_str(
            r#"
[monitor]
interval = "30s"

[probe]
kind = "http"
path = "/healthz"
"#,
        )
        .unwrap();
        assert_eq!(config.monitor_interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.monitor.concurrency, 16);
        assert_eq!(config.probe.kind, ProbeKind::Http);
        assert_eq!(config.probe.path, "/healthz");
        assert_eq!(config.probe.timeout, "2s");
    }

    #[test]
    fn parse_empty_file_uses_defaults() {
        let config = UptrackConfig::from_toml_str("").unwrap();
        assert_eq!(config, UptrackConfig::default());
    }

    #[test]
    fn rejects_bad_interval() {
        let err = UptrackConfig::from_toml_str("[monitor]\ninterval = \"soon\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "monitor.interval",
                ..
            }
        ));
        assert!(UptrackConfig::from_toml_str("[probe]\ntimeout = \"0s\"\n").is_err());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let err = UptrackConfig::from_toml_str("[monitor]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Zero("monitor.concurrency")));
    }

    #[test]
    fn renders_back_to_toml() {
        let rendered = UptrackConfig::default().to_toml_string().unwrap();
        assert!(rendered.contains("interval = \"60s\""));
        let reparsed = UptrackConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, UptrackConfig::default());
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uptrack.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/tmp/uptrack\"\n").unwrap();
        let config = UptrackConfig::from_file(&path).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/uptrack"));

        let missing = UptrackConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("fast"), None);
    }

    #[test]
    fn huge_minute_count_is_rejected() {
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
        assert_eq!(
            parse_duration(&format!("{}m", u64::MAX / 60)),
            Some(Duration::from_secs(u64::MAX / 60 * 60))
        );

        let toml = format!("[monitor]\ninterval = \"{}m\"\n", u64::MAX);
        let err = UptrackConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "monitor.interval",
                ..
            }
        ));
    }

    #[test]
    fn lock_wait_defaults_and_validates() {
        let config = UptrackConfig::default();
        assert_eq!(config.storage_lock_wait().unwrap(), Duration::from_secs(5));
        let err = UptrackConfig::from_toml_str("[storage]\nlock_wait = \"0s\"\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                field: "storage.lock_wait",
                ..
            }
        ));
    }
}
