use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// SipHash keys are exactly 128 bits.
pub const HASH_KEY_LEN: usize = 16;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Cluster member list cannot be empty")]
    EmptyMembers,

    #[error("Empty cluster member address")]
    EmptyMember,

    #[error("Duplicate cluster member: {0}")]
    DuplicateMember(String),

    #[error("Cluster hash key must be 16 bytes long, got {0}")]
    InvalidHashKeyLength(usize),

    #[error("Cluster TLS client certificate and key must be configured together")]
    IncompleteClientIdentity,
}

/// Static cluster topology as written in the config file.
#[derive(Clone, Deserialize, PartialEq)]
pub struct ClusterConfig {
    /// Member addresses as `host:port`, compared literally against the local listener.
    pub members: Vec<String>,
    /// Seed for the keyed hash used to pick the owning member.
    pub hash_key: String,
    /// Every member sees the full metadata store.
    #[serde(default)]
    pub shared_storage: bool,
    /// Every member uses the same blob cache.
    #[serde(default)]
    pub shared_cache: bool,
    /// Upper bound on a forwarded exchange. Unbounded when unset.
    pub timeout_secs: Option<u64>,
    /// Enables https between members.
    pub tls: Option<ClusterTlsConfig>,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("members", &self.members)
            .field("hash_key", &"<redacted>")
            .field("shared_storage", &self.shared_storage)
            .field("shared_cache", &self.shared_cache)
            .field("timeout_secs", &self.timeout_secs)
            .field("tls", &self.tls)
            .finish()
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.members.is_empty() {
            return Err(ValidationError::EmptyMembers);
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if member.is_empty() {
                return Err(ValidationError::EmptyMember);
            }
            if !seen.insert(member) {
                return Err(ValidationError::DuplicateMember(member.clone()));
            }
        }

        if self.hash_key.len() != HASH_KEY_LEN {
            return Err(ValidationError::InvalidHashKeyLength(self.hash_key.len()));
        }

        if let Some(tls) = &self.tls {
            tls.validate()?;
        }

        Ok(())
    }
}

/// Key material for member-to-member https.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClusterTlsConfig {
    /// Root CA bundle used to verify peers.
    pub ca_cert: PathBuf,
    /// Client certificate presented to peers (mutual TLS).
    pub cert: Option<PathBuf>,
    /// Private key for `cert`.
    pub key: Option<PathBuf>,
}

impl ClusterTlsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match (&self.cert, &self.key) {
            (Some(_), None) | (None, Some(_)) => Err(ValidationError::IncompleteClientIdentity),
            _ => Ok(()),
        }
    }

    pub fn client_identity(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.cert.as_ref().zip(self.key.as_ref())
    }
}

/// Runtime view of the cluster topology.
///
/// Built once at startup and shared read-only between all request tasks.
/// With zero or one member clustering is off and every request is local.
#[derive(Clone)]
pub struct Membership {
    members: Vec<String>,
    hash_key: [u8; HASH_KEY_LEN],
    shared_storage: bool,
    shared_cache: bool,
}

impl fmt::Debug for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membership")
            .field("members", &self.members)
            .field("shared_storage", &self.shared_storage)
            .field("shared_cache", &self.shared_cache)
            .finish_non_exhaustive()
    }
}

impl Membership {
    /// A single-node deployment without a `cluster` section.
    pub fn disabled() -> Self {
        Self {
            members: Vec::new(),
            hash_key: [0; HASH_KEY_LEN],
            shared_storage: false,
            shared_cache: false,
        }
    }

    pub fn from_config(config: Option<&ClusterConfig>) -> Result<Self, ValidationError> {
        let Some(config) = config else {
            return Ok(Self::disabled());
        };
        config.validate()?;

        let hash_key = config
            .hash_key
            .as_bytes()
            .try_into()
            .map_err(|_| ValidationError::InvalidHashKeyLength(config.hash_key.len()))?;

        Ok(Self {
            members: config.members.clone(),
            hash_key,
            shared_storage: config.shared_storage,
            shared_cache: config.shared_cache,
        })
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn hash_key(&self) -> &[u8; HASH_KEY_LEN] {
        &self.hash_key
    }

    pub fn is_clustering_enabled(&self) -> bool {
        self.members.len() > 1
    }

    pub fn is_shared_storage_enabled(&self) -> bool {
        self.shared_storage
    }

    pub fn is_shared_cache_enabled(&self) -> bool {
        self.shared_cache
    }
}
