//! Curator settings, loaded from a TOML or YAML file.
//!
//! ```toml
//! subscriptions = ["https://raw.githubusercontent.com/owner/repo/main/vmess.txt"]
//!
//! [output]
//! dir = "./proxies"
//! ports = [80, 443]
//! rewrite_server = "104.26.6.171"
//!
//! [probe]
//! enabled = true
//! timeout_secs = 5
//!
//! [logs]
//! test_log = "/var/log/clash/test.log"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CuratorError, Result};
use crate::liveness::{ProbeAddress, ProbeConfig};

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_ports() -> Vec<u16> {
    vec![80, 443]
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_retry_delay() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CuratorSettings {
    /// Subscription feed URLs, processed in order
    #[serde(default)]
    pub subscriptions: Vec<String>,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub logs: LogSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Ports to split the curated set by
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Address written into the per-port copies; no copies when unset
    #[serde(default)]
    pub rewrite_server: Option<String>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            ports: default_ports(),
            rewrite_server: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub pacing_ms: u64,
    #[serde(default)]
    pub address: ProbeAddress,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: default_probe_timeout(),
            retry_delay_secs: default_retry_delay(),
            pacing_ms: 0,
            address: ProbeAddress::default(),
        }
    }
}

impl ProbeSettings {
    pub fn to_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            pacing: Duration::from_millis(self.pacing_ms),
            address: self.address,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSettings {
    /// Client log with delay-test results
    #[serde(default)]
    pub test_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    /// Upstream proxy for fetching subscriptions, e.g. `socks5://127.0.0.1:1080`
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

impl CuratorSettings {
    /// Parse settings text, TOML first and YAML otherwise.
    pub fn load_from_content(content: &str) -> Result<Self> {
        if toml::from_str::<toml::Value>(content).is_ok() {
            return toml::from_str(content).map_err(|e| CuratorError::Settings(e.to_string()));
        }

        match serde_yaml::from_str::<Option<CuratorSettings>>(content) {
            Ok(settings) => Ok(settings.unwrap_or_default()),
            Err(e) => Err(CuratorError::Settings(format!(
                "neither valid TOML nor YAML: {}",
                e
            ))),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CuratorError::io(path.display().to_string(), e))?;
        Self::load_from_content(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_settings() {
        let content = r#"
subscriptions = ["https://example.com/a/b/vmess.txt"]

[output]
dir = "out"
rewrite_server = "104.26.6.171"

[probe]
enabled = true
timeout_secs = 3
address = "servername"

[logs]
test_log = "test.log"
"#;
        let settings = CuratorSettings::load_from_content(content).unwrap();

        assert_eq!(settings.subscriptions.len(), 1);
        assert_eq!(settings.output.dir, PathBuf::from("out"));
        assert_eq!(settings.output.ports, vec![80, 443]);
        assert_eq!(settings.output.rewrite_server.as_deref(), Some("104.26.6.171"));
        assert!(settings.probe.enabled);
        assert_eq!(settings.probe.retry_delay_secs, 5);
        assert_eq!(settings.logs.test_log, Some(PathBuf::from("test.log")));

        let config = settings.probe.to_config();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.address, ProbeAddress::Servername);
    }

    #[test]
    fn test_yaml_settings() {
        let content = r#"
subscriptions:
  - https://example.com/a/b/vmess.txt
output:
  ports: [8080]
http:
  proxy: socks5://127.0.0.1:1080
"#;
        let settings = CuratorSettings::load_from_content(content).unwrap();

        assert_eq!(settings.output.ports, vec![8080]);
        assert_eq!(settings.http.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(settings.http.timeout_secs, 15);
        assert!(!settings.probe.enabled);
    }

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = CuratorSettings::load_from_content("").unwrap();
        assert!(settings.subscriptions.is_empty());
        assert_eq!(settings.output.ports, vec![80, 443]);
        assert_eq!(settings.probe.timeout_secs, 5);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let err = CuratorSettings::load_from_content("output: [unclosed").unwrap_err();
        assert!(matches!(err, CuratorError::Settings(_)));
    }
}
