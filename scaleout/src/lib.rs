pub mod backend;
pub mod config;
pub mod router;

use backend::LocalBackend;
use cluster::{ClusterContext, ClusterError};
use config::Config;
use gql_proxy::{GqlProxyError, QuerySchema};
use router::Router;
use serde::Serialize;
use shared::admin_service::AdminService;
use shared::handler::HandlerService;
use shared::http::{ServeError, run_http_service};
use shared::tls::{TlsError, server_config};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ScaleoutError {
    #[error("cluster setup failed: {0}")]
    Cluster(#[from] ClusterError),
    #[error("search schema could not be loaded: {0}")]
    Schema(#[from] GqlProxyError),
    #[error("listener TLS setup failed: {0}")]
    Tls(#[from] TlsError),
    #[error("could not render cluster status: {0}")]
    Status(#[from] serde_json::Error),
    #[error("listener failed: {0}")]
    Serve(#[from] ServeError),
}

/// Topology as reported on the admin listener.
#[derive(Serialize)]
struct ClusterStatus<'a> {
    local_member: &'a str,
    members: &'a [String],
    clustering_enabled: bool,
    shared_storage: bool,
    shared_cache: bool,
}

fn cluster_status(cluster: &ClusterContext) -> Result<Vec<u8>, serde_json::Error> {
    let membership = &cluster.membership;
    serde_json::to_vec(&ClusterStatus {
        local_member: &cluster.local_member,
        members: membership.members(),
        clustering_enabled: membership.is_clustering_enabled(),
        shared_storage: membership.is_shared_storage_enabled(),
        shared_cache: membership.is_shared_cache_enabled(),
    })
}

/// Builds both pipelines and serves them until a listener fails.
pub async fn run(config: Config) -> Result<(), ScaleoutError> {
    let cluster = Arc::new(ClusterContext::new(
        config.cluster.as_ref(),
        config.local_member(),
    )?);
    tracing::info!(
        local_member = %cluster.local_member,
        members = ?cluster.membership.members(),
        clustering = cluster.membership.is_clustering_enabled(),
        shared_storage = cluster.membership.is_shared_storage_enabled(),
        "cluster membership loaded"
    );

    let schema = QuerySchema::load(&config.search.schema)?;
    let backend = LocalBackend::new(&config.local_backend)?;
    let router = Router::new(cluster.clone(), schema, config.search.path.clone(), backend);

    let tls = match &config.listener.tls {
        Some(tls) => Some(Arc::new(server_config(&tls.cert, &tls.key)?)),
        None => None,
    };

    // Everything the admin endpoints report is loaded by now.
    let admin = AdminService::new(|| true, cluster_status(&cluster)?);

    let main_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        tls,
        HandlerService::new(router),
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        None,
        HandlerService::new(admin),
    );

    tokio::try_join!(main_task, admin_task)?;
    Ok(())
}
