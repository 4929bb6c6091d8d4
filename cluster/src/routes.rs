//! Recognises the repository-scoped routes of the distribution API and extracts
//! the repository name that decides ownership.
//!
//! Repository names may themselves contain `/`, so the name is whatever precedes
//! the longest matching route tail:
//!
//! ```text
//! /v2/{name}/manifests/{reference}
//! /v2/{name}/blobs/{digest}
//! /v2/{name}/blobs/uploads/
//! /v2/{name}/blobs/uploads/{session}
//! /v2/{name}/tags/list
//! /v2/{name}/referrers/{digest}
//! ```

const API_PREFIX: &str = "/v2/";

fn is_route_tail(tail: &str) -> bool {
    let segments: Vec<&str> = tail.split('/').collect();
    match segments.as_slice() {
        ["blobs", "uploads", _] => true,
        ["tags", "list"] => true,
        ["manifests" | "blobs" | "referrers", reference] => !reference.is_empty(),
        _ => false,
    }
}

/// Splits off the name variable, which may be empty for a malformed path.
fn split_route(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(API_PREFIX)?;

    // Scan from the right so the name captures as many segments as possible.
    rest.char_indices()
        .rev()
        .filter(|(_, c)| *c == '/')
        .map(|(i, _)| (&rest[..i], &rest[i + 1..]))
        .chain(std::iter::once(("", rest)))
        .find(|(_, tail)| is_route_tail(tail))
        .map(|(name, _)| name)
}

/// Whether `path` is a repository-scoped route at all.
pub fn is_repository_route(path: &str) -> bool {
    split_route(path).is_some()
}

/// The repository name of a repository-scoped route, if present and non-empty.
pub fn repository_name(path: &str) -> Option<&str> {
    split_route(path).filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_name() {
        let cases = [
            ("/v2/alpine/manifests/latest", Some("alpine")),
            ("/v2/library/nginx/manifests/1.25", Some("library/nginx")),
            ("/v2/alpine/blobs/sha256:abcd", Some("alpine")),
            ("/v2/alpine/blobs/uploads/", Some("alpine")),
            ("/v2/a/b/c/blobs/uploads/5d0c2d34", Some("a/b/c")),
            ("/v2/alpine/tags/list", Some("alpine")),
            ("/v2/alpine/referrers/sha256:abcd", Some("alpine")),
            ("/v2/org/tags/manifests/latest", Some("org/tags")),
            ("/v2/x/manifests/manifests/latest", Some("x/manifests")),
        ];

        for (path, expected) in cases {
            assert_eq!(repository_name(path), expected, "{path}");
            assert!(is_repository_route(path), "{path}");
        }
    }

    #[test]
    fn test_non_repository_routes() {
        for path in [
            "/v2/",
            "/v2/_catalog",
            "/v2/_zot/ext/search",
            "/v2/alpine",
            "/v2/alpine/manifests/",
            "/v2/alpine/tags/other",
            "/health",
            "/v1/alpine/manifests/latest",
        ] {
            assert!(!is_repository_route(path), "{path}");
            assert_eq!(repository_name(path), None, "{path}");
        }
    }

    #[test]
    fn test_empty_name_is_a_route_without_name() {
        let path = "/v2//manifests/latest";
        assert!(is_repository_route(path));
        assert_eq!(repository_name(path), None);

        let path = "/v2/manifests/latest";
        assert!(is_repository_route(path));
        assert_eq!(repository_name(path), None);
    }
}
