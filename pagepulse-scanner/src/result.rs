use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::timing::Timing;

/// A discovered-but-unvisited URL waiting in the frontier. Consumed and
/// discarded when dequeued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: usize,
    pub parent_url: Option<String>,
}

/// One record per visited URL, created when the page finishes loading or
/// fails, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub depth: usize,
    pub parent_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link_count: usize,
    pub h1_count: usize,
    pub image_count: usize,
    pub script_count: usize,
    pub api_call_count: usize,
    pub error: Option<String>,
}

impl PageRecord {
    pub fn with_error(entry: &FrontierEntry, error: String) -> Self {
        Self {
            url: entry.url.clone(),
            depth: entry.depth,
            parent_url: entry.parent_url.clone(),
            title: None,
            description: None,
            link_count: 0,
            h1_count: 0,
            image_count: 0,
            script_count: 0,
            api_call_count: 0,
            error: Some(error),
        }
    }
}

/// A captured API call. Created at request-observation time; the response
/// fields stay `None` until a matching response event arrives. A record
/// with `status: None` was never resolved and must not be treated as
/// either success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub id: u64,
    pub url: String,
    pub method: String,
    pub request_headers: HashMap<String, String>,
    pub response_headers: Option<HashMap<String, String>>,
    pub post_data: Option<String>,
    pub resource_type: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    /// Milliseconds since epoch at request observation.
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub duration: Timing,
    /// URL of the page that issued the call.
    pub page: String,
    pub depth: usize,
    pub payload_size_bytes: u64,
    pub frontend_impact: Option<FrontendImpact>,
}

impl ApiCallRecord {
    pub fn is_resolved(&self) -> bool {
        self.status.is_some()
    }

    /// True only for a resolved response with a 4xx/5xx status.
    pub fn is_failure(&self) -> bool {
        matches!(self.status, Some(status) if status >= 400)
    }
}

/// Instantaneous capture of frontend performance counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendSnapshot {
    /// Milliseconds since epoch.
    pub timestamp: f64,
    pub first_contentful_paint_ms: f64,
    pub cumulative_layout_shift: f64,
    pub dom_update_ms: f64,
    pub render_ms: f64,
    pub heap_used_bytes: Option<u64>,
    pub heap_limit_bytes: Option<u64>,
    pub resource_count: usize,
}

/// Coarse classification of how much one API call delayed rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderingImpact {
    Low,
    Medium,
    High,
}

impl RenderingImpact {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderingImpact::Low => "low",
            RenderingImpact::Medium => "medium",
            RenderingImpact::High => "high",
        }
    }

    pub fn from_render_delta_ms(delta_ms: f64) -> Self {
        if delta_ms > 100.0 {
            RenderingImpact::High
        } else if delta_ms > 50.0 {
            RenderingImpact::Medium
        } else {
            RenderingImpact::Low
        }
    }
}

/// Before/after difference of two snapshots, attached to exactly one
/// ApiCallRecord. When snapshot capture or call simulation failed, the
/// deltas are zero and `error` records why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendImpact {
    pub fcp_delta_ms: f64,
    pub cls_delta: f64,
    pub resource_count_delta: i64,
    pub dom_update_delta_ms: f64,
    pub render_delta_ms: f64,
    pub layout_shift_delta: f64,
    pub memory_delta_bytes: i64,
    pub rendering_impact: RenderingImpact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrontendImpact {
    pub fn between(before: &FrontendSnapshot, after: &FrontendSnapshot) -> Self {
        let render_delta_ms = after.render_ms - before.render_ms;
        let cls_delta = after.cumulative_layout_shift - before.cumulative_layout_shift;
        let memory_delta_bytes = match (after.heap_used_bytes, before.heap_used_bytes) {
            (Some(after_heap), Some(before_heap)) => after_heap as i64 - before_heap as i64,
            _ => 0,
        };
        Self {
            fcp_delta_ms: after.first_contentful_paint_ms - before.first_contentful_paint_ms,
            cls_delta,
            resource_count_delta: after.resource_count as i64 - before.resource_count as i64,
            dom_update_delta_ms: after.dom_update_ms - before.dom_update_ms,
            render_delta_ms,
            // CLS is cumulative, so a negative diff only means the second
            // snapshot came from a fresh page load.
            layout_shift_delta: cls_delta.max(0.0),
            memory_delta_bytes,
            rendering_impact: RenderingImpact::from_render_delta_ms(render_delta_ms),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            fcp_delta_ms: 0.0,
            cls_delta: 0.0,
            resource_count_delta: 0,
            dom_update_delta_ms: 0.0,
            render_delta_ms: 0.0,
            layout_shift_delta: 0.0,
            memory_delta_bytes: 0,
            rendering_impact: RenderingImpact::Low,
            error: Some(error.into()),
        }
    }
}

/// Everything one crawl run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    /// Processed URLs, in dequeue (breadth-first) order.
    pub visited_urls: Vec<String>,
    pub page_data: HashMap<String, PageRecord>,
    pub api_calls: Vec<ApiCallRecord>,
    /// Pages that loaded without a navigation error.
    pub total_pages: usize,
    pub total_api_calls: usize,
    pub max_depth_reached: usize,
}
