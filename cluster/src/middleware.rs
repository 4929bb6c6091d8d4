use crate::ClusterContext;
use crate::errors::error_chain;
use crate::hash_router::select_owner;
use crate::hop::has_hopped;
use crate::metrics_defs::{CLUSTER_REQUESTS, FORWARD_ERRORS};
use crate::routes::repository_name;
use async_trait::async_trait;
use hyper::{Request, Response, StatusCode};
use shared::handler::{Handler, HandlerBody, into_handler_response};
use shared::http::{make_error_response, make_error_response_with_message};
use std::sync::Arc;

/// Sends repository requests to the member that owns the repository.
///
/// Requests stay local when clustering is off, when they were already forwarded
/// once, or when this node owns the repository. Everything else is proxied to
/// the owner and its response relayed as-is. A failed proxy attempt is reported
/// as a 500; the local node never answers in its place.
pub struct ClusterProxy<H> {
    next: H,
    cluster: Arc<ClusterContext>,
}

impl<H: Handler> ClusterProxy<H> {
    pub fn new(cluster: Arc<ClusterContext>, next: H) -> Self {
        Self { next, cluster }
    }

    async fn handle_locally(&self, request: Request<HandlerBody>) -> Response<HandlerBody> {
        shared::counter!(CLUSTER_REQUESTS, "decision" => "local").increment(1);
        self.next.handle(request).await
    }
}

#[async_trait]
impl<H: Handler> Handler for ClusterProxy<H> {
    fn name(&self) -> &'static str {
        "cluster_proxy"
    }

    async fn handle(&self, mut request: Request<HandlerBody>) -> Response<HandlerBody> {
        let membership = &self.cluster.membership;

        if !membership.is_clustering_enabled() {
            return self.next.handle(request).await;
        }

        if has_hopped(request.headers()) {
            tracing::debug!(path = %request.uri().path(), "request already proxied, handling locally");
            return self.handle_locally(request).await;
        }

        let Some(name) = repository_name(request.uri().path()).map(str::to_owned) else {
            tracing::debug!(path = %request.uri().path(), "no repository name in route");
            return make_error_response(StatusCode::NOT_FOUND);
        };

        let Some(owner) = select_owner(&name, membership) else {
            return self.handle_locally(request).await;
        };

        tracing::debug!(
            repository = %name,
            local_member = %self.cluster.local_member,
            target_member = %owner,
            "computed owning member"
        );

        if owner == self.cluster.local_member {
            tracing::debug!(repository = %name, "handling the request locally");
            return self.handle_locally(request).await;
        }

        tracing::debug!(repository = %name, target_member = %owner, "proxying the request");
        shared::counter!(CLUSTER_REQUESTS, "decision" => "remote").increment(1);

        match self.cluster.forwarder.forward(&mut request, owner).await {
            Ok(response) => into_handler_response(response),
            Err(e) => {
                let reason = error_chain(&e);
                tracing::error!(repository = %name, target_member = %owner, error = %reason, "error while proxying request");
                shared::counter!(FORWARD_ERRORS).increment(1);
                make_error_response_with_message(StatusCode::INTERNAL_SERVER_ERROR, reason)
            }
        }
    }
}
