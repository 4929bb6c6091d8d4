use crate::handler::{Handler, HandlerBody, full_body};
use crate::http::make_error_response;
use async_trait::async_trait;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};

/// Operational endpoints served on the admin listener.
///
/// `/cluster` serves a status document rendered once at startup; the topology
/// never changes while the process runs.
pub struct AdminService<F> {
    is_ready: F,
    cluster_status: Bytes,
}

impl<F> AdminService<F>
where
    F: Fn() -> bool,
{
    pub fn new(is_ready: F, cluster_status: impl Into<Bytes>) -> Self {
        Self {
            is_ready,
            cluster_status: cluster_status.into(),
        }
    }
}

#[async_trait]
impl<F> Handler for AdminService<F>
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "admin"
    }

    async fn handle(&self, req: Request<HandlerBody>) -> Response<HandlerBody> {
        if req.method() != Method::GET {
            return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        let ok = || Response::new(full_body(Bytes::from_static(b"ok\n")));

        match req.uri().path() {
            "/health" => ok(),
            "/ready" => match (self.is_ready)() {
                true => ok(),
                false => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
            },
            "/cluster" => {
                let mut res = Response::new(full_body(self.cluster_status.clone()));
                res.headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                res
            }
            _ => make_error_response(StatusCode::NOT_FOUND),
        }
    }
}
