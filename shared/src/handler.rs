use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BodyError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerBody = BoxBody<Bytes, BodyError>;

/// A single step in the request pipeline.
///
/// Middlewares implement this trait and own the next `Handler` they delegate to,
/// so a pipeline is assembled explicitly by nesting values at startup. A handler
/// never fails: every error is turned into a response at the step that hit it.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request<HandlerBody>) -> Response<HandlerBody>;
}

#[async_trait]
impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Response<HandlerBody> {
        (**self).handle(request).await
    }
}

pub fn full_body(bytes: impl Into<Bytes>) -> HandlerBody {
    Full::new(bytes.into()).map_err(|e| match e {}).boxed()
}

pub fn empty_body() -> HandlerBody {
    Empty::<Bytes>::new().map_err(|e| match e {}).boxed()
}

/// Converts a fully buffered response into one the pipeline can return.
pub fn into_handler_response(response: Response<Bytes>) -> Response<HandlerBody> {
    response.map(full_body)
}

/// Exposes a `Handler` pipeline as a hyper service.
pub struct HandlerService<H> {
    handler: Arc<H>,
}

impl<H: Handler> HandlerService<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H: Handler> Service<Request<Incoming>> for HandlerService<H> {
    type Response = Response<HandlerBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.handler.clone();
        let req = req.map(|body| body.map_err(BodyError::from).boxed());

        // hyper drops this future when the client goes away, which also drops any
        // outbound call the pipeline has in flight.
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}
