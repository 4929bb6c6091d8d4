use crate::classifier::QuerySchema;
use crate::dispatch::{Dispatch, DispatchTable};
use crate::errors::GqlProxyError;
use crate::metrics_defs::GQL_DISPATCH;
use async_trait::async_trait;
use cluster::ClusterContext;
use cluster::hop::has_hopped;
use http::Uri;
use hyper::{Request, Response};
use shared::handler::{Handler, HandlerBody};
use shared::http::make_error_response_with_message;
use std::sync::Arc;
use url::form_urlencoded;

/// URL parameter carrying the query text.
pub const QUERY_PARAM: &str = "query";

/// Sends search queries that need every member's metadata to a cluster-aware
/// handler and everything else to `next`.
///
/// Only active while clustering is enabled and members keep separate metadata.
/// With shared storage any member can answer any query on its own.
pub struct GqlProxy<H> {
    next: H,
    cluster: Arc<ClusterContext>,
    schema: QuerySchema,
    table: DispatchTable,
}

impl<H: Handler> GqlProxy<H> {
    pub fn new(cluster: Arc<ClusterContext>, schema: QuerySchema, next: H) -> Self {
        let table = DispatchTable::new(cluster.clone());
        Self::with_table(cluster, schema, table, next)
    }

    pub fn with_table(
        cluster: Arc<ClusterContext>,
        schema: QuerySchema,
        table: DispatchTable,
        next: H,
    ) -> Self {
        Self {
            next,
            cluster,
            schema,
            table,
        }
    }

    fn is_active(&self) -> bool {
        let membership = &self.cluster.membership;
        membership.is_clustering_enabled() && !membership.is_shared_storage_enabled()
    }
}

fn query_text(uri: &Uri) -> Option<String> {
    form_urlencoded::parse(uri.query()?.as_bytes())
        .find(|(key, _)| key == QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}

#[async_trait]
impl<H: Handler> Handler for GqlProxy<H> {
    fn name(&self) -> &'static str {
        "gql_proxy"
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Response<HandlerBody> {
        if !self.is_active() || has_hopped(request.headers()) {
            return self.next.handle(request).await;
        }

        let classified = query_text(request.uri())
            .ok_or(GqlProxyError::MissingQuery)
            .and_then(|query| {
                self.schema.classify(&query).inspect_err(|e| {
                    tracing::warn!(query = %query, error = %e, "failed to process search query");
                })
            });

        let operation = match classified {
            Ok(operation) => operation,
            Err(e) => return make_error_response_with_message(e.status(), e.to_string()),
        };

        match self.table.lookup(&operation) {
            Dispatch::Cluster(op, handler) => {
                tracing::debug!(operation = op.as_str(), handler = handler.name(), "dispatching query to the cluster");
                shared::counter!(GQL_DISPATCH, "operation" => op.as_str(), "handler" => "fan_out")
                    .increment(1);
                handler.handle(request).await
            }
            Dispatch::Local => {
                tracing::debug!(operation = %operation, "query answered locally");
                shared::counter!(GQL_DISPATCH, "operation" => operation, "handler" => "local")
                    .increment(1);
                self.next.handle(request).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Operation;
    use cluster::ClusterConfig;
    use cluster::hop::HOP_COUNT_HEADER;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use shared::handler::{empty_body, full_body};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SCHEMA: &str = r#"
        type Query {
            GlobalSearch(query: String!): GlobalSearchResult!
            ImageList(repo: String!): PaginatedImagesResult!
        }
    "#;

    const GLOBAL_SEARCH: &str = r#"{ GlobalSearch(query: "alpine") { Page { TotalCount } } }"#;
    const IMAGE_LIST: &str = r#"{ ImageList(repo: "alpine") { Page { TotalCount } } }"#;

    #[derive(Clone)]
    struct Recorder {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Recorder {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Handler for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, _request: Request<HandlerBody>) -> Response<HandlerBody> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Response::new(full_body(self.name))
        }
    }

    fn cluster(members: usize, shared_storage: bool) -> Arc<ClusterContext> {
        let config = ClusterConfig {
            members: (0..members).map(|i| format!("127.0.0.1:{}", 5000 + i)).collect(),
            hash_key: "loremipsumdolors".into(),
            shared_storage,
            shared_cache: shared_storage,
            timeout_secs: None,
            tls: None,
        };
        Arc::new(ClusterContext::new(Some(&config), "127.0.0.1:5000".into()).unwrap())
    }

    /// Builds the middleware with a recording fan-out handler and a recording
    /// local resolver.
    fn proxy(cluster: Arc<ClusterContext>) -> (GqlProxy<Recorder>, Recorder, Recorder) {
        let fan_out = Recorder::new("fan_out");
        let local = Recorder::new("local");

        let mut table = DispatchTable::empty();
        table.insert(Operation::GlobalSearch, fan_out.clone());

        let schema = QuerySchema::parse(SCHEMA).unwrap();
        let proxy = GqlProxy::with_table(cluster, schema, table, local.clone());
        (proxy, fan_out, local)
    }

    fn search(query: &str) -> Request<HandlerBody> {
        let encoded: String = form_urlencoded::Serializer::new(String::new())
            .append_pair(QUERY_PARAM, query)
            .finish();
        Request::builder()
            .uri(format!("/v2/_zot/ext/search?{encoded}"))
            .body(empty_body())
            .unwrap()
    }

    async fn text(response: Response<HandlerBody>) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_global_search_fans_out() {
        let (proxy, fan_out, local) = proxy(cluster(3, false));

        let response = proxy.handle(search(GLOBAL_SEARCH)).await;
        assert_eq!(text(response).await, "fan_out");
        assert_eq!(fan_out.calls(), 1);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_shared_storage_is_local() {
        let (proxy, fan_out, local) = proxy(cluster(3, true));

        proxy.handle(search(GLOBAL_SEARCH)).await;
        assert_eq!(fan_out.calls(), 0);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_member_is_local() {
        let (proxy, fan_out, local) = proxy(cluster(1, false));

        // not even classified: a malformed query still reaches the resolver
        proxy.handle(search(GLOBAL_SEARCH)).await;
        proxy.handle(search("{ GlobalSearch(")).await;
        assert_eq!(fan_out.calls(), 0);
        assert_eq!(local.calls(), 2);
    }

    #[tokio::test]
    async fn test_hopped_query_is_local() {
        let (proxy, fan_out, local) = proxy(cluster(3, false));

        let mut request = search(GLOBAL_SEARCH);
        request
            .headers_mut()
            .insert(HOP_COUNT_HEADER, http::HeaderValue::from_static("1"));

        proxy.handle(request).await;
        assert_eq!(fan_out.calls(), 0);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn test_other_operations_are_local() {
        let (proxy, fan_out, local) = proxy(cluster(3, false));

        let response = proxy.handle(search(IMAGE_LIST)).await;
        assert_eq!(text(response).await, "local");
        assert_eq!(fan_out.calls(), 0);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_queries_are_rejected() {
        let (proxy, fan_out, local) = proxy(cluster(3, false));

        let bad_requests = [
            search("{ GlobalSearch("),
            search("{ NotInSchema }"),
            search("query { ...F } fragment F on Query { ImageList(repo: \"a\") { Page { TotalCount } } }"),
            Request::builder()
                .uri("/v2/_zot/ext/search")
                .body(empty_body())
                .unwrap(),
        ];

        for request in bad_requests {
            let response = proxy.handle(request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
        assert_eq!(fan_out.calls(), 0);
        assert_eq!(local.calls(), 0);
    }

    #[tokio::test]
    async fn test_error_message_is_returned() {
        let (proxy, _, _) = proxy(cluster(3, false));

        let response = proxy.handle(search("{ NotInSchema }")).await;
        assert_eq!(
            text(response).await,
            "field NotInSchema is not defined on type Query"
        );
    }
}
