use async_trait::async_trait;
use cluster::routes::is_repository_route;
use cluster::{ClusterContext, ClusterProxy};
use gql_proxy::{GqlProxy, QuerySchema};
use hyper::{Request, Response};
use shared::handler::{Handler, HandlerBody};
use std::sync::Arc;

/// Picks the pipeline for a request by its path.
///
/// The search endpoint goes through the query middleware, repository routes
/// through the ownership middleware and everything else (`/v2/`, catalog,
/// extensions) straight to the local backend.
pub struct Router<H> {
    search_path: String,
    search: GqlProxy<Arc<H>>,
    repositories: ClusterProxy<Arc<H>>,
    local: Arc<H>,
}

impl<H: Handler> Router<H> {
    pub fn new(
        cluster: Arc<ClusterContext>,
        schema: QuerySchema,
        search_path: String,
        local: H,
    ) -> Self {
        let local = Arc::new(local);
        Self {
            search_path,
            search: GqlProxy::new(cluster.clone(), schema, local.clone()),
            repositories: ClusterProxy::new(cluster, local.clone()),
            local,
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for Router<H> {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Response<HandlerBody> {
        let path = request.uri().path();

        let handler: &dyn Handler = if path == self.search_path {
            &self.search
        } else if is_repository_route(path) {
            &self.repositories
        } else {
            &self.local
        };

        tracing::trace!(path, handler = handler.name(), "routing request");
        handler.handle(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster::ClusterConfig;
    use http_body_util::BodyExt;
    use hyper::StatusCode;
    use shared::handler::{empty_body, full_body};

    const SCHEMA: &str = "type Query { GlobalSearch(query: String!): String ImageList: String }";

    struct Local;

    #[async_trait]
    impl Handler for Local {
        fn name(&self) -> &'static str {
            "local"
        }

        async fn handle(&self, _request: Request<HandlerBody>) -> Response<HandlerBody> {
            Response::new(full_body("local"))
        }
    }

    fn router() -> Router<Local> {
        let config = ClusterConfig {
            members: vec!["127.0.0.1:5000".into(), "127.0.0.1:5001".into()],
            hash_key: "loremipsumdolors".into(),
            shared_storage: false,
            shared_cache: false,
            timeout_secs: Some(1),
            tls: None,
        };
        let cluster =
            Arc::new(ClusterContext::new(Some(&config), "127.0.0.1:5000".into()).unwrap());
        let schema = QuerySchema::parse(SCHEMA).unwrap();
        Router::new(cluster, schema, "/v2/_zot/ext/search".into(), Local)
    }

    async fn call(router: &Router<Local>, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(empty_body()).unwrap();
        let response = router.handle(request).await;
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_routes() {
        let router = router();

        // not a repository route
        assert_eq!(call(&router, "/v2/").await, (StatusCode::OK, "local".into()));
        assert_eq!(
            call(&router, "/v2/_catalog").await,
            (StatusCode::OK, "local".into())
        );

        // repository route without a name is rejected by the ownership middleware
        let (status, _) = call(&router, "/v2//manifests/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // "alpine" is owned by index 1 of two members, "busybox" by index 0 (this node)
        assert_eq!(
            call(&router, "/v2/busybox/manifests/latest").await,
            (StatusCode::OK, "local".into())
        );

        // the search endpoint classifies the query first
        let (status, _) = call(&router, "/v2/_zot/ext/search?query=%7B").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            call(&router, "/v2/_zot/ext/search?query=%7BImageList%7D").await,
            (StatusCode::OK, "local".into())
        );
    }
}
