use obridge_core::Fixture;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/obridge.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub tls: TlsConfig,
    pub metrics: MetricsConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub plain_listen_addr: Option<String>,
    pub tls_listen_addr: Option<String>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            plain_listen_addr: Some("0.0.0.0:3855".into()),
            tls_listen_addr: Some("0.0.0.0:4012".into()),
            log_level: "info".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub enable_full_proxy: bool,
    pub enable_compression: bool,
    /// Zero disables the per-query deadline.
    pub query_timeout_secs: u64,
    /// Statements run on every freshly opened upstream connection.
    pub session_init: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enable_full_proxy: true,
            enable_compression: true,
            query_timeout_secs: 0,
            session_init: vec!["ALTER SESSION SET TIME_ZONE = 'UTC'".into()],
        }
    }
}

impl GatewayConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: Some("certs/server.pem".into()),
            key_path: Some("certs/server.key".into()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9898".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub driver: String,
    /// Connection strings the memory driver accepts; empty accepts any.
    pub accept: Vec<String>,
    pub fixtures: Vec<Fixture>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            driver: "memory".into(),
            accept: Vec::new(),
            fixtures: Vec::new(),
        }
    }
}

impl Config {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let plain = self.server.plain_listen_addr.as_deref().unwrap_or_default();
        let tls = self.server.tls_listen_addr.as_deref().unwrap_or_default();
        if plain.is_empty() && (tls.is_empty() || !self.tls.enabled) {
            return Err(anyhow::anyhow!("no listener configured"));
        }
        if self.tls.enabled {
            if self.tls.cert_path.is_none() || self.tls.key_path.is_none() {
                return Err(anyhow::anyhow!("tls enabled but cert_path or key_path missing"));
            }
            if tls.is_empty() {
                return Err(anyhow::anyhow!("tls enabled but tls_listen_addr missing"));
            }
        }
        if self.upstream.driver != "memory" {
            return Err(anyhow::anyhow!(format!(
                "unsupported upstream driver {}",
                self.upstream.driver
            )));
        }
        Ok(())
    }
}
