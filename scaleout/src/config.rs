use cluster::ClusterConfig;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error(transparent)]
    Cluster(#[from] cluster::config::ValidationError),

    #[error("Cluster TLS and listener TLS must be enabled together")]
    TlsMismatch,

    #[error("Local backend URL must be http with a host: {0}")]
    InvalidBackendUrl(String),

    #[error("Search path must start with '/': {0}")]
    InvalidSearchPath(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Registry API listener. Its `host:port` is this node's member address.
    pub listener: Listener,
    /// Health and cluster status endpoints.
    pub admin_listener: Listener,
    /// The storage engine serving this node's repositories.
    pub local_backend: LocalBackendConfig,
    /// Absent when the node runs on its own.
    #[serde(default)]
    pub cluster: Option<ClusterConfig>,
    pub search: SearchConfig,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Self = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.local_backend.validate()?;
        self.search.validate()?;

        if let Some(cluster) = &self.cluster {
            cluster.validate()?;

            if cluster.tls.is_some() != self.listener.tls.is_some() {
                return Err(ValidationError::TlsMismatch);
            }
        }

        Ok(())
    }

    /// The address other members use for this node.
    pub fn local_member(&self) -> String {
        format!("{}:{}", self.listener.host, self.listener.port)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: Option<ListenerTlsConfig>,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ListenerTlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LocalBackendConfig {
    pub url: Url,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

fn default_backend_timeout() -> u64 {
    30
}

impl LocalBackendConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.authority() {
            Some(_) if self.url.scheme() == "http" => Ok(()),
            _ => Err(ValidationError::InvalidBackendUrl(self.url.to_string())),
        }
    }

    /// `host:port` of the backend, with the scheme's default port filled in.
    pub fn authority(&self) -> Option<String> {
        let host = self.url.host_str()?;
        let port = self.url.port_or_known_default()?;
        Some(format!("{host}:{port}"))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SearchConfig {
    #[serde(default = "default_search_path")]
    pub path: String,
    /// GraphQL SDL describing the search API.
    pub schema: PathBuf,
}

fn default_search_path() -> String {
    "/v2/_zot/ext/search".into()
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.path.starts_with('/') {
            return Err(ValidationError::InvalidSearchPath(self.path.clone()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
