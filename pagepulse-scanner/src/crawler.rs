// Breadth-first crawl scheduler and per-page request/response correlation.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};
use url::Url;

use crate::classifier::{ApiClassifier, DefaultClassifier};
use crate::error::{Result, ScanError};
use crate::navigator::{Navigator, NetworkEvent, RequestEvent, ResponseEvent};
use crate::result::{ApiCallRecord, CrawlResult, FrontierEntry, PageRecord};
use crate::timing::{RawTiming, estimate_duration};

/// A call observed at request time, waiting for its response. Keyed by
/// `(url, method)`; when several identical requests are in flight the most
/// recent unresolved entry wins, since no native per-request identifier is
/// available. Duplicate in-flight calls to the same endpoint can therefore
/// be misattributed.
struct PendingCall {
    id: u64,
    url: String,
    method: String,
    request_headers: HashMap<String, String>,
    response_headers: Option<HashMap<String, String>>,
    post_data: Option<String>,
    resource_type: String,
    status: Option<u16>,
    status_text: Option<String>,
    start_time: f64,
    end_time: Option<f64>,
    payload_size_bytes: u64,
    timing: RawTiming,
}

impl PendingCall {
    fn observe(id: u64, req: &RequestEvent) -> Self {
        let mut timing = req.timing.clone();
        timing.start_time = timing.start_time.or(Some(req.timestamp));
        Self {
            id,
            url: req.url.clone(),
            method: req.method.clone(),
            request_headers: req.headers.clone(),
            response_headers: None,
            post_data: req.post_data.clone(),
            resource_type: req.resource_type.clone(),
            status: None,
            status_text: None,
            start_time: req.timestamp,
            end_time: None,
            payload_size_bytes: 0,
            timing,
        }
    }

    fn resolve(&mut self, resp: &ResponseEvent) {
        self.status = Some(resp.status);
        self.status_text = Some(resp.status_text.clone());
        self.response_headers = Some(resp.headers.clone());
        self.end_time = Some(resp.timestamp);
        self.payload_size_bytes = resp.payload_size_bytes;
        self.timing.merge(&resp.timing);
        self.timing.end_time = self.timing.end_time.or(Some(resp.timestamp));
    }

    fn into_record(self, page: &str, depth: usize) -> ApiCallRecord {
        let duration = estimate_duration(&self.timing);
        ApiCallRecord {
            id: self.id,
            url: self.url,
            method: self.method,
            request_headers: self.request_headers,
            response_headers: self.response_headers,
            post_data: self.post_data,
            resource_type: self.resource_type,
            status: self.status,
            status_text: self.status_text,
            start_time: self.start_time,
            end_time: self.end_time,
            duration,
            page: page.to_string(),
            depth,
            payload_size_bytes: self.payload_size_bytes,
            frontend_impact: None,
        }
    }
}

/// Bounded breadth-first crawler. Owns the frontier, the visited set and
/// the navigator session for the duration of one `crawl` call; pages are
/// processed strictly one at a time so correlation state stays unambiguous.
pub struct Crawler<N: Navigator> {
    navigator: N,
    classifier: Box<dyn ApiClassifier>,
    max_pages: usize,
    max_depth: usize,
}

impl<N: Navigator> Crawler<N> {
    pub fn new(navigator: N) -> Self {
        Self {
            navigator,
            classifier: Box::new(DefaultClassifier),
            max_pages: 20,
            max_depth: 3,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ApiClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Crawl breadth-first from `base_url`, staying on the base origin and
    /// within the page and depth budgets. Per-page navigation failures are
    /// recorded and the crawl continues; only an unusable base URL fails
    /// the whole call.
    pub async fn crawl(&self, base_url: &str) -> Result<CrawlResult> {
        let base = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let base_origin = base.origin();
        let seed = normalized(&base);

        info!(
            "Starting crawl of {} (max {} pages, depth {})",
            seed, self.max_pages, self.max_depth
        );

        let mut frontier: VecDeque<FrontierEntry> = VecDeque::new();
        frontier.push_back(FrontierEntry {
            url: seed.clone(),
            depth: 0,
            parent_url: None,
        });

        // URLs enqueued or dequeued; grows monotonically, never revisited.
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(seed);

        let mut visited_urls: Vec<String> = Vec::new();
        let mut page_data: HashMap<String, PageRecord> = HashMap::new();
        let mut api_calls: Vec<ApiCallRecord> = Vec::new();
        let mut max_depth_reached = 0;
        let mut next_call_id: u64 = 1;

        loop {
            if visited_urls.len() >= self.max_pages {
                debug!("Page budget reached, stopping");
                break;
            }
            let Some(entry) = frontier.pop_front() else {
                break;
            };
            if entry.depth > self.max_depth {
                continue;
            }

            debug!("Visiting {} (depth {})", entry.url, entry.depth);
            visited_urls.push(entry.url.clone());
            max_depth_reached = max_depth_reached.max(entry.depth);

            match self.navigator.visit(&entry.url).await {
                Ok(visit) => {
                    let calls = self.correlate_events(&visit.events, &entry, &mut next_call_id);

                    let record = PageRecord {
                        url: entry.url.clone(),
                        depth: entry.depth,
                        parent_url: entry.parent_url.clone(),
                        title: visit.page.title,
                        description: visit.page.description,
                        link_count: visit.page.links.len(),
                        h1_count: visit.page.h1_count,
                        image_count: visit.page.image_count,
                        script_count: visit.page.script_count,
                        api_call_count: calls.len(),
                        error: None,
                    };

                    for link in &visit.page.links {
                        let Ok(parsed) = Url::parse(link) else {
                            continue;
                        };
                        if parsed.origin() != base_origin {
                            debug!("Skipping cross-origin link {}", link);
                            continue;
                        }
                        let link = normalized(&parsed);
                        if seen.contains(&link) {
                            continue;
                        }
                        seen.insert(link.clone());
                        frontier.push_back(FrontierEntry {
                            url: link,
                            depth: entry.depth + 1,
                            parent_url: Some(entry.url.clone()),
                        });
                    }

                    page_data.insert(entry.url.clone(), record);
                    api_calls.extend(calls);
                }
                Err(e) => {
                    // Failure is isolated to this page; it contributes no
                    // links and the crawl moves on.
                    warn!("Navigation failed for {}: {}", entry.url, e);
                    page_data.insert(
                        entry.url.clone(),
                        PageRecord::with_error(&entry, e.to_string()),
                    );
                }
            }
        }

        let total_pages = page_data.values().filter(|p| p.error.is_none()).count();
        let total_api_calls = api_calls.len();
        info!(
            "Crawl complete: {} pages loaded, {} API calls captured",
            total_pages, total_api_calls
        );

        Ok(CrawlResult {
            visited_urls,
            page_data,
            api_calls,
            total_pages,
            total_api_calls,
            max_depth_reached,
        })
    }

    /// Run the per-page correlation state machine over captured events.
    /// Classifier-approved requests become provisional records; a response
    /// resolves the most recent unresolved record with the same
    /// `(url, method)`. Records whose response never arrived are kept with
    /// `status: None`.
    fn correlate_events(
        &self,
        events: &[NetworkEvent],
        entry: &FrontierEntry,
        next_call_id: &mut u64,
    ) -> Vec<ApiCallRecord> {
        let mut pending: Vec<PendingCall> = Vec::new();

        for event in events {
            match event {
                NetworkEvent::Request(req) => {
                    if !self.classifier.is_api_call(&req.url, &req.resource_type) {
                        continue;
                    }
                    debug!("API request observed: {} {}", req.method, req.url);
                    pending.push(PendingCall::observe(*next_call_id, req));
                    *next_call_id += 1;
                }
                NetworkEvent::Response(resp) => {
                    let matched = pending
                        .iter_mut()
                        .rev()
                        .find(|p| p.status.is_none() && p.url == resp.url && p.method == resp.method);
                    if let Some(call) = matched {
                        call.resolve(resp);
                    }
                }
            }
        }

        pending
            .into_iter()
            .map(|p| p.into_record(&entry.url, entry.depth))
            .collect()
    }
}

/// Normalized form used for visited-set membership: parsed URL with the
/// fragment stripped.
fn normalized(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::{PageExtract, PageVisit};
    use crate::result::FrontendSnapshot;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted navigator: serves canned visits from a map, fails for
    /// anything unlisted.
    struct ScriptedNavigator {
        pages: HashMap<String, PageVisit>,
    }

    impl ScriptedNavigator {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
            }
        }

        fn page(mut self, url: &str, links: &[&str], events: Vec<NetworkEvent>) -> Self {
            self.pages.insert(
                url.to_string(),
                PageVisit {
                    page: PageExtract {
                        title: Some("page".to_string()),
                        description: None,
                        links: links.iter().map(|l| l.to_string()).collect(),
                        h1_count: 1,
                        image_count: 0,
                        script_count: 0,
                    },
                    events,
                },
            );
            self
        }
    }

    #[async_trait]
    impl Navigator for ScriptedNavigator {
        async fn visit(&self, url: &str) -> Result<PageVisit> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScanError::Navigation(format!("unreachable: {}", url)))
        }

        async fn snapshot(&self) -> Result<FrontendSnapshot> {
            Err(ScanError::Navigation("no snapshot support".to_string()))
        }

        async fn replay(&self, _call: &ApiCallRecord) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn request(url: &str, method: &str, resource_type: &str, timestamp: f64) -> NetworkEvent {
        NetworkEvent::Request(RequestEvent {
            url: url.to_string(),
            method: method.to_string(),
            headers: HashMap::new(),
            post_data: None,
            resource_type: resource_type.to_string(),
            timestamp,
            timing: RawTiming {
                start_time: Some(timestamp),
                ..Default::default()
            },
        })
    }

    fn response(url: &str, method: &str, status: u16, timestamp: f64) -> NetworkEvent {
        NetworkEvent::Response(ResponseEvent {
            url: url.to_string(),
            method: method.to_string(),
            status,
            status_text: "".to_string(),
            headers: HashMap::new(),
            timestamp,
            payload_size_bytes: 512,
            timing: RawTiming {
                end_time: Some(timestamp),
                ..Default::default()
            },
        })
    }

    #[tokio::test]
    async fn breadth_first_order_and_depth_tracking() {
        let nav = ScriptedNavigator::new()
            .page(
                "https://x.com/",
                &["https://x.com/a", "https://x.com/b"],
                vec![],
            )
            .page("https://x.com/a", &["https://x.com/c"], vec![])
            .page("https://x.com/b", &[], vec![])
            .page("https://x.com/c", &[], vec![]);

        let result = Crawler::new(nav)
            .with_max_pages(10)
            .with_max_depth(3)
            .crawl("https://x.com/")
            .await
            .unwrap();

        assert_eq!(
            result.visited_urls,
            vec![
                "https://x.com/",
                "https://x.com/a",
                "https://x.com/b",
                "https://x.com/c"
            ]
        );
        assert_eq!(result.max_depth_reached, 2);
        assert_eq!(result.total_pages, 4);

        // depth(child) = depth(parent) + 1, seed at depth 0 with no parent
        let seed = &result.page_data["https://x.com/"];
        assert_eq!(seed.depth, 0);
        assert!(seed.parent_url.is_none());
        for record in result.page_data.values() {
            if let Some(ref parent) = record.parent_url {
                assert_eq!(record.depth, result.page_data[parent].depth + 1);
            }
        }
    }

    #[tokio::test]
    async fn page_budget_is_a_hard_cap() {
        let nav = ScriptedNavigator::new()
            .page(
                "https://x.com/",
                &[
                    "https://x.com/a",
                    "https://x.com/b",
                    "https://x.com/c",
                    "https://x.com/d",
                ],
                vec![],
            )
            .page("https://x.com/a", &[], vec![])
            .page("https://x.com/b", &[], vec![])
            .page("https://x.com/c", &[], vec![])
            .page("https://x.com/d", &[], vec![]);

        let result = Crawler::new(nav)
            .with_max_pages(3)
            .crawl("https://x.com/")
            .await
            .unwrap();

        assert_eq!(result.visited_urls.len(), 3);
    }

    #[tokio::test]
    async fn depth_budget_skips_deep_entries() {
        let nav = ScriptedNavigator::new()
            .page("https://x.com/", &["https://x.com/a"], vec![])
            .page("https://x.com/a", &["https://x.com/b"], vec![])
            .page("https://x.com/b", &["https://x.com/c"], vec![])
            .page("https://x.com/c", &[], vec![]);

        let result = Crawler::new(nav)
            .with_max_depth(1)
            .crawl("https://x.com/")
            .await
            .unwrap();

        assert_eq!(result.visited_urls, vec!["https://x.com/", "https://x.com/a"]);
        assert_eq!(result.max_depth_reached, 1);
    }

    #[tokio::test]
    async fn rediscovered_url_is_never_revisited() {
        // c is reachable from both a and b; it must be visited once, with
        // the first discoverer as parent.
        let nav = ScriptedNavigator::new()
            .page(
                "https://x.com/",
                &["https://x.com/a", "https://x.com/b"],
                vec![],
            )
            .page("https://x.com/a", &["https://x.com/c"], vec![])
            .page("https://x.com/b", &["https://x.com/c"], vec![])
            .page("https://x.com/c", &[], vec![]);

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();

        let occurrences = result
            .visited_urls
            .iter()
            .filter(|u| *u == "https://x.com/c")
            .count();
        assert_eq!(occurrences, 1);
        assert_eq!(
            result.page_data["https://x.com/c"].parent_url.as_deref(),
            Some("https://x.com/a")
        );
    }

    #[tokio::test]
    async fn cross_origin_links_are_not_enqueued() {
        let nav = ScriptedNavigator::new().page(
            "https://x.com/",
            &["https://other.com/page", "http://x.com/insecure"],
            vec![],
        );

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();

        // Different host and different scheme both fall outside the origin.
        assert_eq!(result.visited_urls, vec!["https://x.com/"]);
        assert_eq!(result.page_data["https://x.com/"].link_count, 2);
    }

    #[tokio::test]
    async fn failed_page_is_recorded_and_crawl_continues() {
        let nav = ScriptedNavigator::new()
            .page(
                "https://x.com/",
                &["https://x.com/broken", "https://x.com/ok"],
                vec![],
            )
            .page("https://x.com/ok", &[], vec![]);

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();

        assert_eq!(result.visited_urls.len(), 3);
        let broken = &result.page_data["https://x.com/broken"];
        assert!(broken.error.is_some());
        assert_eq!(broken.link_count, 0);
        // total_pages counts only pages that loaded
        assert_eq!(result.total_pages, 2);
    }

    #[tokio::test]
    async fn total_navigation_failure_yields_zero_pages_not_an_error() {
        let nav = ScriptedNavigator::new();
        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();
        assert_eq!(result.total_pages, 0);
        assert_eq!(result.visited_urls.len(), 1);
        assert!(result.page_data["https://x.com/"].error.is_some());
    }

    #[tokio::test]
    async fn api_calls_are_correlated_and_counted() {
        let events = vec![
            request("https://x.com/api/users", "GET", "fetch", 1000.0),
            request("https://x.com/logo.png", "GET", "image", 1001.0),
            response("https://x.com/api/users", "GET", 200, 1200.0),
        ];
        let nav = ScriptedNavigator::new().page("https://x.com/", &[], events);

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();

        assert_eq!(result.total_api_calls, 1);
        assert_eq!(result.page_data["https://x.com/"].api_call_count, 1);
        let call = &result.api_calls[0];
        assert_eq!(call.status, Some(200));
        assert_eq!(call.duration.ms, 200);
        assert!(!call.duration.is_estimated());
        assert_eq!(call.page, "https://x.com/");
        assert_eq!(call.payload_size_bytes, 512);
    }

    #[tokio::test]
    async fn most_recent_unresolved_entry_wins() {
        // Two concurrent calls to the same endpoint; the first response
        // must resolve the later provisional record.
        let events = vec![
            request("https://x.com/api/poll", "GET", "fetch", 1000.0),
            request("https://x.com/api/poll", "GET", "fetch", 1100.0),
            response("https://x.com/api/poll", "GET", 200, 1150.0),
            response("https://x.com/api/poll", "GET", 500, 1400.0),
        ];
        let nav = ScriptedNavigator::new().page("https://x.com/", &[], events);

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();

        assert_eq!(result.api_calls.len(), 2);
        let first = &result.api_calls[0];
        let second = &result.api_calls[1];
        // Records appear in observation order; id 1 started first.
        assert!(first.id < second.id);
        assert_eq!(second.status, Some(200));
        assert_eq!(first.status, Some(500));
    }

    #[tokio::test]
    async fn unresolved_call_keeps_none_status_with_estimated_duration() {
        let events = vec![request("https://x.com/api/slow", "GET", "xhr", 1000.0)];
        let nav = ScriptedNavigator::new().page("https://x.com/", &[], events);

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();

        let call = &result.api_calls[0];
        assert_eq!(call.status, None);
        assert_eq!(call.end_time, None);
        assert!(call.duration.is_estimated());
        assert!(call.duration.ms > 0);
    }

    #[tokio::test]
    async fn response_with_no_pending_request_is_ignored() {
        let events = vec![response("https://x.com/api/ghost", "GET", 200, 1000.0)];
        let nav = ScriptedNavigator::new().page("https://x.com/", &[], events);

        let result = Crawler::new(nav).crawl("https://x.com/").await.unwrap();
        assert!(result.api_calls.is_empty());
    }

    #[tokio::test]
    async fn invalid_base_url_is_a_hard_failure() {
        let nav = ScriptedNavigator::new();
        let err = Crawler::new(nav).crawl("not a url").await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn http_navigator_discovers_links_and_probes_endpoints() {
        let mock_server = MockServer::start().await;

        let root_html = format!(
            r#"<html><head><title>Root</title></head><body>
                <a href="{0}/page1">Page 1</a>
                <script>fetch('/api/widgets');</script>
            </body></html>"#,
            mock_server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(root_html.as_bytes()),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/page1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(b"<html><body>P1</body></html>"),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/widgets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_bytes(br#"{"widgets": []}"#),
            )
            .mount(&mock_server)
            .await;

        let crawler = Crawler::new(crate::navigator::HttpNavigator::with_timeout(5))
            .with_max_pages(5)
            .with_max_depth(2);

        let result = crawler
            .crawl(&format!("{}/", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(result.total_pages, 2);
        assert_eq!(result.total_api_calls, 1);
        let call = &result.api_calls[0];
        assert!(call.url.ends_with("/api/widgets"));
        assert_eq!(call.status, Some(200));
        assert!(call.payload_size_bytes > 0);

        let root = &result.page_data[&format!("{}/", mock_server.uri())];
        assert_eq!(root.title.as_deref(), Some("Root"));
        assert_eq!(root.api_call_count, 1);
    }
}
