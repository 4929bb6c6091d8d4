use crate::config::LocalBackendConfig;
use async_trait::async_trait;
use cluster::body::tee_body;
use cluster::errors::error_chain;
use cluster::forwarder::{ForwardClient, build_client, outbound_request, send_buffered};
use http::uri::Scheme;
use hyper::{Request, Response, StatusCode};
use shared::handler::{Handler, HandlerBody, into_handler_response};
use shared::http::{make_error_response, make_error_response_with_message};
use std::time::Duration;

/// Relays requests to the storage engine co-located with this node.
///
/// This is the end of every pipeline: whatever the cluster layers decide to
/// answer locally is answered here.
pub struct LocalBackend {
    client: ForwardClient,
    authority: String,
    timeout: Duration,
}

impl LocalBackend {
    pub fn new(config: &LocalBackendConfig) -> cluster::Result<Self> {
        let authority = config.authority().ok_or_else(|| {
            cluster::ClusterError::InvalidUri(config.url.to_string(), "missing host".into())
        })?;

        Ok(Self {
            client: build_client(None)?,
            authority,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl Handler for LocalBackend {
    fn name(&self) -> &'static str {
        "local_backend"
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Response<HandlerBody> {
        let (parts, body) = request.into_parts();
        let body = match tee_body(body).await {
            Ok(teed) => teed.remote,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                return make_error_response(StatusCode::BAD_REQUEST);
            }
        };

        let template = Request::from_parts(parts, ());
        let result = match outbound_request(&template, body, Scheme::HTTP, &self.authority) {
            Ok(outbound) => {
                send_buffered(&self.client, outbound, &self.authority, Some(self.timeout)).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => into_handler_response(response),
            Err(e) => {
                let reason = error_chain(&e);
                tracing::error!(backend = %self.authority, error = %reason, "local backend unavailable");
                make_error_response_with_message(StatusCode::BAD_GATEWAY, reason)
            }
        }
    }
}
