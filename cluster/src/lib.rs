//! Routing of repository requests across the members of a registry cluster.
//!
//! Each member owns the metadata of the repositories that hash to it. The
//! [`ClusterProxy`] middleware keeps requests for owned repositories local and
//! proxies everything else, exactly one hop, to the owner.

pub mod body;
pub mod config;
pub mod errors;
pub mod forwarder;
pub mod hash_router;
pub mod hop;
pub mod metrics_defs;
pub mod middleware;
pub mod routes;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use config::{ClusterConfig, ClusterTlsConfig, Membership};
pub use errors::{ClusterError, Result};
pub use forwarder::Forwarder;
pub use middleware::ClusterProxy;

/// Everything a request task needs to make routing decisions.
///
/// Constructed once at startup and shared behind an `Arc`; nothing in it is
/// mutated afterwards.
pub struct ClusterContext {
    pub membership: Membership,
    /// This node's own `host:port`, compared literally against the member list.
    pub local_member: String,
    pub forwarder: Forwarder,
}

impl ClusterContext {
    pub fn new(config: Option<&ClusterConfig>, local_member: String) -> Result<Self> {
        Ok(Self {
            membership: Membership::from_config(config)?,
            local_member,
            forwarder: Forwarder::new(config)?,
        })
    }
}
