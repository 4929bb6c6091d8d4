use crate::body::{ForwardBody, tee_request};
use crate::config::{ClusterConfig, ClusterTlsConfig};
use crate::errors::{ClusterError, Result, error_chain};
use crate::hop::mark_hopped;
use crate::metrics_defs::FORWARD_DURATION;
use bytes::Bytes;
use http::HeaderValue;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::uri::{Scheme, Uri};
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use shared::handler::HandlerBody;
use shared::http::{add_via_header, filter_hop_by_hop};
use shared::tls::{TLS_MIN_VERSION, crypto_provider, load_certs, load_private_key, load_root_store};
use std::time::{Duration, Instant};

pub type ForwardClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Sends requests to other members and buffers their responses.
///
/// The underlying client pools connections and is shared by every request task.
#[derive(Clone)]
pub struct Forwarder {
    client: ForwardClient,
    scheme: Scheme,
    timeout: Option<Duration>,
}

impl Forwarder {
    pub fn new(config: Option<&ClusterConfig>) -> Result<Self> {
        let tls = config.and_then(|c| c.tls.as_ref());
        let scheme = match tls {
            Some(_) => Scheme::HTTPS,
            None => Scheme::HTTP,
        };

        Ok(Self {
            client: build_client(tls)?,
            scheme,
            timeout: config
                .and_then(|c| c.timeout_secs)
                .map(Duration::from_secs),
        })
    }

    /// Proxies `request` to `target` and returns the member's response.
    ///
    /// The inbound body is drained once; `request` keeps a readable copy of it.
    /// Any status the member answers with is a successful forward; only failing
    /// to complete the exchange is an error. Dropping the returned future aborts
    /// the outbound call.
    pub async fn forward(
        &self,
        request: &mut Request<HandlerBody>,
        target: &str,
    ) -> Result<Response<Bytes>> {
        let body = tee_request(request).await?;
        let outbound = self.prepare(request, body, target)?;
        self.send(outbound, target).await
    }

    /// Builds the request for `target` from `template`, marked as hopped.
    pub fn prepare<B>(
        &self,
        template: &Request<B>,
        body: ForwardBody,
        target: &str,
    ) -> Result<Request<Full<Bytes>>> {
        let mut outbound = outbound_request(template, body, self.scheme.clone(), target)?;
        mark_hopped(outbound.headers_mut());
        Ok(outbound)
    }

    pub async fn send(&self, request: Request<Full<Bytes>>, target: &str) -> Result<Response<Bytes>> {
        let start = Instant::now();
        let result = send_buffered(&self.client, request, target, self.timeout).await;
        shared::histogram!(FORWARD_DURATION).record(start.elapsed().as_secs_f64());
        result
    }
}

fn client_tls_config(tls: Option<&ClusterTlsConfig>) -> Result<ClientConfig> {
    let roots = match tls {
        Some(tls) => load_root_store(&tls.ca_cert)?,
        None => RootCertStore::empty(),
    };

    let builder = ClientConfig::builder_with_provider(crypto_provider())
        .with_protocol_versions(TLS_MIN_VERSION)?
        .with_root_certificates(roots);

    let config = match tls.and_then(ClusterTlsConfig::client_identity) {
        Some((cert, key)) => {
            builder.with_client_auth_cert(load_certs(cert)?, load_private_key(key)?)?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}

/// Client for member traffic. Plain http goes through the same connector, so one
/// client type serves both cluster modes.
pub fn build_client(tls: Option<&ClusterTlsConfig>) -> Result<ForwardClient> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(client_tls_config(tls)?)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Copies method, path, query and headers of `template` into a request for
/// `scheme://authority`.
///
/// Hop-by-hop headers are dropped, `Host` names the new authority and
/// `Content-Length` always states the length of the buffered body, zero included.
pub fn outbound_request<B>(
    template: &Request<B>,
    body: ForwardBody,
    scheme: Scheme,
    authority: &str,
) -> Result<Request<Full<Bytes>>> {
    let invalid = |e: &dyn std::fmt::Display| ClusterError::InvalidUri(authority.to_string(), e.to_string());

    let path_and_query = template
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri = Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| invalid(&e))?;

    let mut headers = template.headers().clone();
    filter_hop_by_hop(&mut headers, template.version());
    headers.remove(TRANSFER_ENCODING);
    headers.insert(HOST, HeaderValue::from_str(authority).map_err(|e| invalid(&e))?);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    add_via_header(&mut headers, template.version());

    let mut outbound = Request::new(body.into_full());
    *outbound.method_mut() = template.method().clone();
    *outbound.uri_mut() = uri;
    *outbound.headers_mut() = headers;

    Ok(outbound)
}

/// Performs one exchange with `peer` and buffers the whole response.
///
/// The connection's body stream is drained and released before returning, so
/// the caller only ever holds memory. The optional timeout covers the complete
/// exchange including the body.
pub async fn send_buffered<C>(
    client: &Client<C, Full<Bytes>>,
    request: Request<Full<Bytes>>,
    peer: &str,
    timeout: Option<Duration>,
) -> Result<Response<Bytes>>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let exchange = async {
        let response = client.request(request).await.map_err(|e| {
            ClusterError::UpstreamRequestFailed(peer.to_string(), error_chain(&e))
        })?;

        let (mut parts, body) = response.into_parts();
        filter_hop_by_hop(&mut parts.headers, parts.version);

        let body = body
            .collect()
            .await
            .map_err(|e| ClusterError::ResponseBodyError(peer.to_string(), e.to_string()))?
            .to_bytes();

        Ok::<_, ClusterError>(Response::from_parts(parts, body))
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| ClusterError::UpstreamTimeout(peer.to_string()))?,
        None => exchange.await,
    }
}
