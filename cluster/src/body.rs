//! Body handling for requests that may leave this node.
//!
//! An inbound body is a stream that can be read once. `tee_request` drains it in
//! a single pass and yields two readable copies: one put back on the inbound
//! request for any local consumer, one for the peer.

use crate::errors::ClusterError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Request;
use hyper::body::Body;
use shared::handler::{HandlerBody, empty_body, full_body};
use std::fmt::Display;

/// Body of an outbound request.
///
/// `NoBody` is kept distinct from an empty buffer so the outbound request can
/// announce `Content-Length: 0` instead of leaving the length unstated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardBody {
    NoBody,
    Buffered(Bytes),
}

impl ForwardBody {
    pub fn len(&self) -> usize {
        match self {
            ForwardBody::NoBody => 0,
            ForwardBody::Buffered(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_full(self) -> Full<Bytes> {
        match self {
            ForwardBody::NoBody => Full::new(Bytes::new()),
            ForwardBody::Buffered(bytes) => Full::new(bytes),
        }
    }
}

/// Two readable copies of one drained body.
#[derive(Debug)]
pub struct TeedBody {
    /// Copy for the local request path.
    pub local: Bytes,
    /// Copy for the peer.
    pub remote: ForwardBody,
}

/// Drains `body` once and returns both copies.
///
/// `Bytes` is reference counted and immutable, so the copies share one
/// allocation while each can be consumed on its own.
pub async fn tee_body<B>(body: B) -> Result<TeedBody, ClusterError>
where
    B: Body,
    B::Error: Display,
{
    let local = body
        .collect()
        .await
        .map_err(|e| ClusterError::RequestBodyError(e.to_string()))?
        .to_bytes();

    let remote = if local.is_empty() {
        ForwardBody::NoBody
    } else {
        ForwardBody::Buffered(local.clone())
    };

    Ok(TeedBody { local, remote })
}

/// Tees the body of `request` in place and returns the peer's copy.
///
/// On success the request carries a fresh body with the same bytes. If reading
/// fails the request is left with an empty body.
pub async fn tee_request(request: &mut Request<HandlerBody>) -> Result<ForwardBody, ClusterError> {
    let body = std::mem::replace(request.body_mut(), empty_body());
    let teed = tee_body(body).await?;

    *request.body_mut() = if teed.local.is_empty() {
        empty_body()
    } else {
        full_body(teed.local)
    };

    Ok(teed.remote)
}
