//! Loop guard for forwarded requests.
//!
//! A request crosses at most one hop: the forwarder marks it before sending and
//! any node that sees the mark handles the request itself.

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};

pub const HOP_COUNT_HEADER: &str = "x-cluster-hop-count";

const SINGLE_HOP: &str = "1";

/// Any non-empty value counts; the number itself is not interpreted.
pub fn has_hopped(headers: &HeaderMap) -> bool {
    headers
        .get(HOP_COUNT_HEADER)
        .is_some_and(|value| !value.is_empty())
}

pub fn mark_hopped(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static(HOP_COUNT_HEADER),
        HeaderValue::from_static(SINGLE_HOP),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_marker() {
        let mut headers = HeaderMap::new();
        assert!(!has_hopped(&headers));

        headers.insert(HOP_COUNT_HEADER, HeaderValue::from_static(""));
        assert!(!has_hopped(&headers));

        mark_hopped(&mut headers);
        assert!(has_hopped(&headers));
        assert_eq!(headers[HOP_COUNT_HEADER], "1");

        // marking twice never counts up
        mark_hopped(&mut headers);
        assert_eq!(headers.get_all(HOP_COUNT_HEADER).iter().count(), 1);
        assert_eq!(headers[HOP_COUNT_HEADER], "1");
    }

    #[test]
    fn test_any_value_counts_as_hopped() {
        let mut headers = HeaderMap::new();
        headers.insert(HOP_COUNT_HEADER, HeaderValue::from_static("7"));
        assert!(has_hopped(&headers));
    }
}
