use bytes::Bytes;
use cluster::hop::HOP_COUNT_HEADER;
use cluster::testutils::spawn_member;
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderValue};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response};

/// Starts a member that answers every hopped request with `status` and `body`.
///
/// Requests without the hop marker get a 421, so a test fails loudly if the
/// marker went missing on the way.
pub async fn json_member(status: StatusCode, body: &'static str) -> String {
    spawn_member(move |req: Request<Incoming>| async move {
        let hopped = req.headers().get(HOP_COUNT_HEADER).is_some_and(|v| v == "1");
        let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
        *response.status_mut() = if hopped {
            status
        } else {
            StatusCode::MISDIRECTED_REQUEST
        };
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    })
    .await
}
