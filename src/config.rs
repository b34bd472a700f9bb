//! Layered configuration: defaults, then an optional file, then environment
//! variables prefixed `CONTROL__`. Mirrors the teacher's `ClusterConfig::load`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsulConfig {
    pub base_url: String,
    pub acl_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8500".to_string(),
            acl_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl ConsulConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "certs/client.crt".to_string(),
            key_path: "certs/client.key".to_string(),
            ca_path: "certs/ca.crt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub refresh_interval_secs: u64,
    pub error_backoff_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
            error_backoff_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    Stdout,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub output: LogOutput,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            output: LogOutput::Stdout,
            filter: "info".to_string(),
        }
    }
}

/// Bootstrap source for the default [`crate::ip_pool::StaticIpPool`].
/// Production deployments are expected to supply their own `IpPool` (only
/// its `allocate` contract is consumed per spec.md §1); this is enough to
/// run the reconciliation engine standalone against a fixed address block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IpPoolConfig {
    pub addresses: Vec<String>,
}

impl Default for IpPoolConfig {
    fn default() -> Self {
        Self { addresses: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub consul: ConsulConfig,
    pub tls: TlsConfig,
    pub sensor: SensorConfig,
    pub logging: LoggingConfig,
    pub ip_pool: IpPoolConfig,
    pub call_timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            consul: ConsulConfig::default(),
            tls: TlsConfig::default(),
            sensor: SensorConfig::default(),
            logging: LoggingConfig::default(),
            ip_pool: IpPoolConfig::default(),
            call_timeout_secs: 30,
        }
    }
}

impl ControlPlaneConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Loads configuration the same way the teacher's cluster crate does:
    /// dotenv, then defaults, then the first config file found on a small
    /// search path, then `CONTROL__`-prefixed environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ControlPlaneConfig::default())?);

        for path in ["/etc/tarantoolctl/control", "config/control"] {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let built = builder
            .add_source(
                config::Environment::with_prefix("CONTROL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tls.cert_path.is_empty() {
            anyhow::bail!("tls.cert_path must not be empty");
        }
        for (label, path) in [
            ("tls.cert_path", &self.tls.cert_path),
            ("tls.key_path", &self.tls.key_path),
            ("tls.ca_path", &self.tls.ca_path),
        ] {
            if !Path::new(path).exists() {
                anyhow::bail!("{label} does not exist: {path}");
            }
        }
        Ok(())
    }
}
