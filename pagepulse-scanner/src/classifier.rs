// Heuristic decision of whether a network event is an API call.

use url::Url;

/// Pluggable predicate deciding whether a captured request counts as an
/// API call. The default implementation is a URL-shape heuristic; swap it
/// out when a site needs site-specific rules.
pub trait ApiClassifier: Send + Sync {
    fn is_api_call(&self, url: &str, resource_type: &str) -> bool;
}

/// Default heuristic: XHR/fetch resource types are always API calls, and
/// otherwise the URL path is matched against common API shapes (`/api/`,
/// `/graphql`, `/rest/`, a `/v<digits>/` segment, or a `.json` suffix).
/// Known limitation: false positives and negatives are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ApiClassifier for DefaultClassifier {
    fn is_api_call(&self, url: &str, resource_type: &str) -> bool {
        let resource_type = resource_type.to_ascii_lowercase();
        if resource_type == "xhr" || resource_type == "fetch" {
            return true;
        }

        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_ascii_lowercase(),
            // Relative or malformed URL: fall back to the raw string with
            // query and fragment stripped.
            Err(_) => {
                let raw = url.to_ascii_lowercase();
                let raw = raw.split(['?', '#']).next().unwrap_or("").to_string();
                raw
            }
        };

        path.contains("/api/")
            || path.contains("/graphql")
            || path.contains("/rest/")
            || has_version_segment(&path)
            || path.ends_with(".json")
    }
}

/// True when any path segment is `v` followed by digits only (`/v1/`,
/// `/v12/users`).
fn has_version_segment(path: &str) -> bool {
    path.split('/').any(|segment| {
        let mut chars = segment.chars();
        chars.next() == Some('v')
            && !segment[1..].is_empty()
            && segment[1..].chars().all(|c| c.is_ascii_digit())
    })
}
