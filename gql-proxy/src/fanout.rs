//! Runs a search on every member and merges the results.
//!
//! Each member only holds metadata for the repositories it owns, so a
//! registry-wide search is the concatenation of all partial answers. The query
//! is sent to every member, this node included, marked as hopped so that no
//! member forwards it again.

use crate::dispatch::Operation;
use crate::errors::{GqlProxyError, Result};
use crate::metrics_defs::FANOUT_DURATION;
use async_trait::async_trait;
use bytes::Bytes;
use cluster::body::tee_body;
use cluster::errors::{ClusterError, error_chain};
use cluster::{ClusterContext, Forwarder};
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use http_body_util::Full;
use hyper::{Request, Response};
use serde_json::map::Entry;
use serde_json::{Map, Value};
use shared::handler::{Handler, HandlerBody, full_body};
use shared::http::make_error_response_with_message;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

const PAGE: &str = "Page";
const SUMMED_PAGE_FIELDS: [&str; 2] = ["TotalCount", "ItemCount"];

pub struct FanOut {
    cluster: Arc<ClusterContext>,
    operation: Operation,
}

impl FanOut {
    pub fn new(cluster: Arc<ClusterContext>, operation: Operation) -> Self {
        Self { cluster, operation }
    }

    async fn fan_out(&self, request: Request<HandlerBody>) -> Result<Value> {
        let (parts, body) = request.into_parts();
        let body = tee_body(body)
            .await
            .map_err(|e| GqlProxyError::RequestBody(e.to_string()))?
            .remote;
        let template = Request::from_parts(parts, ());

        let members = self.cluster.membership.members();
        let mut join_set = JoinSet::new();
        for (index, member) in members.iter().enumerate() {
            let request = self
                .cluster
                .forwarder
                .prepare(&template, body.clone(), member)
                .map_err(|e| member_error(member, &e))?;
            let forwarder = self.cluster.forwarder.clone();
            let member = member.clone();

            join_set.spawn(async move {
                let result = query_member(&forwarder, request, &member).await;
                (index, result)
            });
        }

        // Results arrive in completion order; merging happens in member order.
        // Returning early drops the set, which aborts the calls still running.
        let mut responses = vec![Value::Null; members.len()];
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.map_err(|e| GqlProxyError::Task(e.to_string()))?;
            responses[index] = result?;
        }

        merge_responses(self.operation.as_str(), responses)
    }
}

#[async_trait]
impl Handler for FanOut {
    fn name(&self) -> &'static str {
        "fan_out"
    }

    async fn handle(&self, request: Request<HandlerBody>) -> Response<HandlerBody> {
        let operation = self.operation.as_str();
        let members = self.cluster.membership.members().len();
        tracing::debug!(operation, members, "fanning out query to all members");

        let start = Instant::now();
        let result = self.fan_out(request).await.and_then(|merged| {
            serde_json::to_vec(&merged).map_err(|e| GqlProxyError::Merge(e.to_string()))
        });
        shared::histogram!(FANOUT_DURATION, "operation" => operation)
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(body) => {
                let mut response = Response::new(full_body(body));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(e) => {
                tracing::error!(operation, error = %e, "fan-out failed");
                make_error_response_with_message(e.status(), e.to_string())
            }
        }
    }
}

fn member_error(member: &str, error: &ClusterError) -> GqlProxyError {
    GqlProxyError::Member(member.to_string(), error_chain(error))
}

async fn query_member(
    forwarder: &Forwarder,
    request: Request<Full<Bytes>>,
    member: &str,
) -> Result<Value> {
    let response = forwarder
        .send(request, member)
        .await
        .map_err(|e| member_error(member, &e))?;

    if !response.status().is_success() {
        return Err(GqlProxyError::Member(
            member.to_string(),
            format!("unexpected status {}", response.status()),
        ));
    }

    serde_json::from_slice(response.body()).map_err(|e| {
        GqlProxyError::Member(member.to_string(), format!("invalid JSON response: {e}"))
    })
}

/// Merges `{"data": {"<operation>": {...}}, "errors": [...]}` documents, in
/// member order.
///
/// Lists are concatenated and the page counters are summed. Any other field
/// keeps the value of the first member that returned one.
pub fn merge_responses(operation: &str, responses: Vec<Value>) -> Result<Value> {
    let mut merged: Option<Map<String, Value>> = None;
    let mut errors = Vec::new();

    for response in responses {
        let Value::Object(mut response) = response else {
            return Err(GqlProxyError::Merge("response is not an object".into()));
        };

        match response.remove("errors") {
            Some(Value::Array(member_errors)) => errors.extend(member_errors),
            Some(Value::Null) | None => {}
            Some(_) => return Err(GqlProxyError::Merge("errors is not a list".into())),
        }

        let result = match response.remove("data") {
            Some(Value::Object(mut data)) => data.remove(operation),
            Some(Value::Null) | None => None,
            Some(_) => return Err(GqlProxyError::Merge("data is not an object".into())),
        };

        match result {
            Some(Value::Object(result)) => match merged.as_mut() {
                Some(merged) => merge_result(merged, result),
                None => merged = Some(result),
            },
            Some(Value::Null) | None => {}
            Some(_) => {
                return Err(GqlProxyError::Merge(format!("{operation} is not an object")));
            }
        }
    }

    let mut data = Map::new();
    data.insert(operation.to_string(), merged.map_or(Value::Null, Value::Object));

    let mut document = Map::new();
    document.insert("data".into(), Value::Object(data));
    if !errors.is_empty() {
        document.insert("errors".into(), Value::Array(errors));
    }

    Ok(Value::Object(document))
}

fn merge_result(merged: &mut Map<String, Value>, result: Map<String, Value>) {
    for (key, value) in result {
        match merged.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                let is_page = slot.key() == PAGE;
                match (slot.get_mut(), value) {
                    (Value::Array(items), Value::Array(more)) => items.extend(more),
                    (Value::Object(page), Value::Object(other)) if is_page => sum_page(page, &other),
                    (existing, value) if existing.is_null() => *existing = value,
                    _ => {}
                }
            }
        }
    }
}

fn sum_page(page: &mut Map<String, Value>, other: &Map<String, Value>) {
    for field in SUMMED_PAGE_FIELDS {
        let count = |map: &Map<String, Value>| map.get(field).and_then(Value::as_u64).unwrap_or(0);
        let total = count(&*page).saturating_add(count(other));
        page.insert(field.to_string(), Value::from(total));
    }
}
