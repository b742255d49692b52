// Navigator capability: the browser-shaped collaborator the crawler and
// correlator drive. `HttpNavigator` is the plain-HTTP implementation; a
// headless-browser implementation plugs in behind the same trait.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::classifier::{ApiClassifier, DefaultClassifier};
use crate::error::{Result, ScanError};
use crate::result::{ApiCallRecord, FrontendSnapshot};
use crate::timing::RawTiming;

/// An outgoing request observed during one page load.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub post_data: Option<String>,
    pub resource_type: String,
    /// Milliseconds since epoch.
    pub timestamp: f64,
    pub timing: RawTiming,
}

/// A response observed during one page load. Carries the request's URL and
/// method so it can be matched back to a provisional call record.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: String,
    pub method: String,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    /// Milliseconds since epoch.
    pub timestamp: f64,
    pub payload_size_bytes: u64,
    pub timing: RawTiming,
}

#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
}

/// Metadata extracted from a loaded page.
#[derive(Debug, Clone, Default)]
pub struct PageExtract {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute link targets, fragments stripped. Origin filtering is the
    /// caller's concern.
    pub links: Vec<String>,
    pub h1_count: usize,
    pub image_count: usize,
    pub script_count: usize,
}

/// Result of one page-scoped navigation session: extracted metadata plus
/// every captured network event, in arrival order.
#[derive(Debug, Clone)]
pub struct PageVisit {
    pub page: PageExtract,
    pub events: Vec<NetworkEvent>,
}

/// Headless-browser capability. One navigator owns one session; the crawl
/// scheduler and the impact correlator must each hold their own.
#[async_trait]
pub trait Navigator: Send + Sync {
    /// Navigate to `url`, wait for the page to load within the configured
    /// timeout, and return the extracted page plus captured traffic.
    async fn visit(&self, url: &str) -> Result<PageVisit>;

    /// Capture performance counters for the page most recently visited.
    async fn snapshot(&self) -> Result<FrontendSnapshot>;

    /// Trigger the effect of one API call in the current page context.
    async fn replay(&self, call: &ApiCallRecord) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[derive(Default)]
struct NavState {
    current_url: Option<String>,
}

/// Plain-HTTP navigator: no JavaScript execution. Pages are fetched and
/// parsed statically; API endpoints referenced by `script[src]` or quoted
/// inside inline script text are probed with the shared client so their
/// status, timing and payload size are still observed. Snapshots are
/// degraded accordingly: wall-clock fetch time stands in for paint and
/// render timings, and layout shift is always zero.
pub struct HttpNavigator {
    client: Client,
    classifier: Box<dyn ApiClassifier>,
    state: Mutex<NavState>,
}

impl HttpNavigator {
    pub fn new() -> Self {
        Self::with_timeout(30)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .user_agent("Pagepulse/0.1 (https://github.com/pagepulse/pagepulse)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            classifier: Box::new(DefaultClassifier),
            state: Mutex::new(NavState::default()),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ApiClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Probe one harvested endpoint and append its request/response event
    /// pair. A failed probe leaves the request event unresolved.
    async fn probe(&self, endpoint: &str, events: &mut Vec<NetworkEvent>) {
        debug!("Probing API endpoint {}", endpoint);

        let started = now_ms();
        let mut request_headers = HashMap::new();
        request_headers.insert("accept".to_string(), "application/json".to_string());
        events.push(NetworkEvent::Request(RequestEvent {
            url: endpoint.to_string(),
            method: "GET".to_string(),
            headers: request_headers,
            post_data: None,
            resource_type: "fetch".to_string(),
            timestamp: started,
            timing: RawTiming {
                start_time: Some(started),
                ..Default::default()
            },
        }));

        let request = self
            .client
            .get(endpoint)
            .header(reqwest::header::ACCEPT, "application/json");

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let headers = header_map(response.headers());
                let payload_size_bytes = match response.bytes().await {
                    Ok(bytes) => bytes.len() as u64,
                    Err(_) => 0,
                };
                let finished = now_ms();
                events.push(NetworkEvent::Response(ResponseEvent {
                    url: endpoint.to_string(),
                    method: "GET".to_string(),
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or("").to_string(),
                    headers,
                    timestamp: finished,
                    payload_size_bytes,
                    timing: RawTiming {
                        start_time: Some(started),
                        end_time: Some(finished),
                        transfer_size: Some(payload_size_bytes),
                        ..Default::default()
                    },
                }));
            }
            Err(e) => {
                warn!("Probe failed for {}: {}", endpoint, e);
            }
        }
    }
}

impl Default for HttpNavigator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    async fn visit(&self, url: &str) -> Result<PageVisit> {
        let page_url = Url::parse(url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))?;

        debug!("Fetching {}", url);
        let mut events = Vec::new();

        let started = now_ms();
        events.push(NetworkEvent::Request(RequestEvent {
            url: url.to_string(),
            method: "GET".to_string(),
            headers: HashMap::new(),
            post_data: None,
            resource_type: "document".to_string(),
            timestamp: started,
            timing: RawTiming {
                start_time: Some(started),
                ..Default::default()
            },
        }));

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let headers = header_map(response.headers());
        let body = response.text().await?;
        let finished = now_ms();

        events.push(NetworkEvent::Response(ResponseEvent {
            url: url.to_string(),
            method: "GET".to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers: headers.clone(),
            timestamp: finished,
            payload_size_bytes: body.len() as u64,
            timing: RawTiming {
                start_time: Some(started),
                end_time: Some(finished),
                transfer_size: Some(body.len() as u64),
                ..Default::default()
            },
        }));

        let is_html = headers
            .get("content-type")
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        let (page, endpoints) = if is_html {
            parse_document(&body, &page_url, self.classifier.as_ref())
        } else {
            (PageExtract::default(), Vec::new())
        };

        for endpoint in &endpoints {
            self.probe(endpoint, &mut events).await;
        }

        self.state.lock().await.current_url = Some(url.to_string());

        Ok(PageVisit { page, events })
    }

    async fn snapshot(&self) -> Result<FrontendSnapshot> {
        let current = self
            .state
            .lock()
            .await
            .current_url
            .clone()
            .ok_or_else(|| ScanError::Navigation("no page loaded".to_string()))?;

        let started = Instant::now();
        let response = self.client.get(&current).send().await?;
        let body = response.text().await?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        Ok(FrontendSnapshot {
            timestamp: now_ms(),
            first_contentful_paint_ms: elapsed_ms,
            cumulative_layout_shift: 0.0,
            dom_update_ms: elapsed_ms,
            render_ms: elapsed_ms,
            heap_used_bytes: None,
            heap_limit_bytes: None,
            resource_count: count_resources(&body),
        })
    }

    async fn replay(&self, call: &ApiCallRecord) -> Result<()> {
        let method = reqwest::Method::from_bytes(call.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);
        let mut request = self.client.request(method, &call.url);
        if let Some(ref body) = call.post_data {
            request = request.body(body.clone());
        }
        request.send().await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().await.current_url = None;
        Ok(())
    }
}

pub(crate) fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Parse an HTML document: extract page metadata and resolved links, and
/// harvest same-origin API-shaped endpoints to probe.
fn parse_document(
    html: &str,
    page_url: &Url,
    classifier: &dyn ApiClassifier,
) -> (PageExtract, Vec<String>) {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").unwrap();
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let description_selector = Selector::parse(r#"meta[name="description"]"#).unwrap();
    let description = document
        .select(&description_selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|d| !d.is_empty());

    let link_selector = Selector::parse("a[href]").unwrap();
    let mut links = Vec::new();
    for element in document.select(&link_selector) {
        if let Some(href) = element.value().attr("href")
            && let Some(absolute) = resolve_url(page_url, href)
        {
            links.push(absolute);
        }
    }

    let h1_selector = Selector::parse("h1").unwrap();
    let h1_count = document.select(&h1_selector).count();

    let image_selector = Selector::parse("img").unwrap();
    let image_count = document.select(&image_selector).count();

    let script_selector = Selector::parse("script").unwrap();
    let mut script_count = 0;
    let mut candidates: Vec<String> = Vec::new();
    for element in document.select(&script_selector) {
        script_count += 1;
        match element.value().attr("src") {
            Some(src) => {
                if let Some(absolute) = resolve_url(page_url, src) {
                    candidates.push(absolute);
                }
            }
            None => {
                let text = element.text().collect::<String>();
                for literal in quoted_literals(&text) {
                    if looks_like_endpoint(literal)
                        && let Some(absolute) = resolve_url(page_url, literal)
                    {
                        candidates.push(absolute);
                    }
                }
            }
        }
    }

    // Same-origin, classifier-approved, deduplicated in discovery order.
    let mut seen = HashSet::new();
    let endpoints = candidates
        .into_iter()
        .filter(|candidate| {
            Url::parse(candidate)
                .map(|parsed| parsed.origin() == page_url.origin())
                .unwrap_or(false)
        })
        .filter(|candidate| classifier.is_api_call(candidate, "other"))
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect();

    (
        PageExtract {
            title,
            description,
            links,
            h1_count,
            image_count,
            script_count,
        },
        endpoints,
    )
}

fn count_resources(html: &str) -> usize {
    let document = Html::parse_document(html);
    let selector = Selector::parse("img, script[src], link[href]").unwrap();
    document.select(&selector).count()
}

/// Resolve an href against the page URL, dropping anchors and
/// non-navigable schemes, and stripping the fragment.
fn resolve_url(base: &Url, href: &str) -> Option<String> {
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Single- or double-quoted string literals in script text, in order.
fn quoted_literals(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' || b == b'`' {
            if let Some(len) = text[i + 1..].find(b as char) {
                out.push(&text[i + 1..i + 1 + len]);
                i += len + 2;
                continue;
            }
        }
        i += 1;
    }
    out
}

/// Filter for harvested literals worth resolving: absolute http(s) URLs or
/// absolute paths, with no whitespace or template holes.
fn looks_like_endpoint(literal: &str) -> bool {
    if literal.len() < 2 || literal.len() > 2048 {
        return false;
    }
    if literal.chars().any(|c| c.is_whitespace() || c == '{' || c == '$') {
        return false;
    }
    (literal.starts_with('/') && !literal.starts_with("//"))
        || literal.starts_with("http://")
        || literal.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_literals_finds_all_quote_styles() {
        let script = r#"fetch("/api/users"); const x = '/api/orders'; tag(`/v2/items`);"#;
        let literals = quoted_literals(script);
        assert!(literals.contains(&"/api/users"));
        assert!(literals.contains(&"/api/orders"));
        assert!(literals.contains(&"/v2/items"));
    }

    #[test]
    fn endpoint_filter_rejects_noise() {
        assert!(looks_like_endpoint("/api/users"));
        assert!(looks_like_endpoint("https://x.com/api/users"));
        assert!(!looks_like_endpoint("/"));
        assert!(!looks_like_endpoint("//cdn.example.com/lib.js"));
        assert!(!looks_like_endpoint("click me"));
        assert!(!looks_like_endpoint("/api/${id}/detail"));
        assert!(!looks_like_endpoint("use strict"));
    }

    #[test]
    fn resolve_url_strips_fragments_and_skips_schemes() {
        let base = Url::parse("https://x.com/docs/").unwrap();
        assert_eq!(
            resolve_url(&base, "page#section").as_deref(),
            Some("https://x.com/docs/page")
        );
        assert_eq!(resolve_url(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_url(&base, "mailto:a@b.c"), None);
        assert_eq!(resolve_url(&base, "#top"), None);
        assert_eq!(resolve_url(&base, ""), None);
    }

    #[test]
    fn parse_document_extracts_metadata_and_endpoints() {
        let html = r#"<html><head>
            <title> Store </title>
            <meta name="description" content="A demo store">
            </head><body>
            <h1>Store</h1><h1>Again</h1>
            <img src="/a.png"><img src="/b.png">
            <a href="/catalog">Catalog</a>
            <a href="https://other.example/away">Away</a>
            <script src="/static/app.js"></script>
            <script>fetch('/api/products').then(r => r.json());</script>
            </body></html>"#;
        let page_url = Url::parse("https://shop.example/").unwrap();
        let (page, endpoints) = parse_document(html, &page_url, &DefaultClassifier);

        assert_eq!(page.title.as_deref(), Some("Store"));
        assert_eq!(page.description.as_deref(), Some("A demo store"));
        assert_eq!(page.h1_count, 2);
        assert_eq!(page.image_count, 2);
        assert_eq!(page.script_count, 2);
        // Links keep both origins; the crawler filters.
        assert_eq!(page.links.len(), 2);
        // app.js is same-origin but not API-shaped; the fetch literal is.
        assert_eq!(endpoints, vec!["https://shop.example/api/products"]);
    }

    #[test]
    fn parse_document_dedupes_harvested_endpoints() {
        let html = r#"<script>
            load('/api/items'); reload('/api/items'); off('https://elsewhere.example/api/items');
        </script>"#;
        let page_url = Url::parse("https://shop.example/").unwrap();
        let (_, endpoints) = parse_document(html, &page_url, &DefaultClassifier);
        assert_eq!(endpoints, vec!["https://shop.example/api/items"]);
    }
}
