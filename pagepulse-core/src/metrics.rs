// Aggregation of captured API calls and the external audit record into
// the flat shapes the alert engine evaluates. Plain values owned by the
// caller; accumulation is pure, there is no process-wide state.

use serde::{Deserialize, Serialize};

use pagepulse_scanner::result::ApiCallRecord;

/// Flat record produced by the external auditing engine for one page:
/// category scores in 0–1 and raw timing metrics in milliseconds (CLS is
/// unitless). Every field is optional; absent metrics are skipped by the
/// alert engine, never treated as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontendMetrics {
    pub performance_score: Option<f64>,
    pub accessibility_score: Option<f64>,
    pub best_practices_score: Option<f64>,
    pub seo_score: Option<f64>,
    pub fcp_ms: Option<f64>,
    pub lcp_ms: Option<f64>,
    pub cls: Option<f64>,
    pub tbt_ms: Option<f64>,
    pub tti_ms: Option<f64>,
    pub speed_index_ms: Option<f64>,
}

/// One captured call, reduced to what alert details need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub duration_estimated: bool,
    pub payload_size_bytes: u64,
}

impl CallSummary {
    fn from_record(record: &ApiCallRecord) -> Self {
        Self {
            url: record.url.clone(),
            method: record.method.clone(),
            status: record.status,
            duration_ms: record.duration.ms,
            duration_estimated: record.duration.is_estimated(),
            payload_size_bytes: record.payload_size_bytes,
        }
    }
}

/// Aggregated view over one crawl's API calls. Unresolved calls (no
/// response ever matched) are excluded from the error rate on both sides
/// of the division; they are neither successes nor failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_calls: usize,
    pub resolved_calls: usize,
    pub failed_calls: usize,
    pub average_response_time_ms: f64,
    pub max_response_time_ms: u64,
    /// Fraction in 0–1 over resolved calls; 0.0 when nothing resolved.
    pub error_rate: f64,
    pub average_payload_bytes: f64,
    pub max_payload_bytes: u64,
    pub calls: Vec<CallSummary>,
}

impl ApiMetrics {
    /// Aggregate a call set. Empty input produces zero-valued metrics, not
    /// an error.
    pub fn from_calls(calls: &[ApiCallRecord]) -> Self {
        if calls.is_empty() {
            return Self::default();
        }

        let total_calls = calls.len();
        let resolved_calls = calls.iter().filter(|c| c.is_resolved()).count();
        let failed_calls = calls.iter().filter(|c| c.is_failure()).count();

        let total_duration: u64 = calls.iter().map(|c| c.duration.ms).sum();
        let max_response_time_ms = calls.iter().map(|c| c.duration.ms).max().unwrap_or(0);

        let total_payload: u64 = calls.iter().map(|c| c.payload_size_bytes).sum();
        let max_payload_bytes = calls
            .iter()
            .map(|c| c.payload_size_bytes)
            .max()
            .unwrap_or(0);

        let error_rate = if resolved_calls > 0 {
            failed_calls as f64 / resolved_calls as f64
        } else {
            0.0
        };

        Self {
            total_calls,
            resolved_calls,
            failed_calls,
            average_response_time_ms: total_duration as f64 / total_calls as f64,
            max_response_time_ms,
            error_rate,
            average_payload_bytes: total_payload as f64 / total_calls as f64,
            max_payload_bytes,
            calls: calls.iter().map(CallSummary::from_record).collect(),
        }
    }
}
