// Threshold-based alerting over aggregated frontend and API metrics.
//
// Thresholds are fixed. For each metric the critical bound is evaluated
// first and the warning bound only when critical did not fire, so a
// single metric instance never produces two alerts. Absent metrics are
// skipped entirely.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::metrics::{ApiMetrics, CallSummary, FrontendMetrics};

/// How many offending calls an aggregate alert lists before collapsing
/// the rest into a count.
const MAX_DETAILED_OFFENDERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Critical,
    Warning,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Critical => "critical",
            AlertType::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertCategory {
    #[serde(rename = "Core Web Vitals")]
    WebVitals,
    #[serde(rename = "Category Score")]
    CategoryScore,
    #[serde(rename = "API Performance")]
    ApiPerformance,
    #[serde(rename = "API Reliability")]
    ApiReliability,
    #[serde(rename = "API Payload")]
    ApiPayload,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::WebVitals => "Core Web Vitals",
            AlertCategory::CategoryScore => "Category Score",
            AlertCategory::ApiPerformance => "API Performance",
            AlertCategory::ApiReliability => "API Reliability",
            AlertCategory::ApiPayload => "API Payload",
        }
    }
}

/// A fully self-describing alert. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub category: AlertCategory,
    pub metric: String,
    pub value: String,
    pub threshold: String,
    pub message: String,
    pub recommendation: String,
    pub details: Vec<serde_json::Value>,
}

/// Warning/critical bounds for one metric.
struct Limits {
    warning: f64,
    critical: f64,
}

const FCP_LIMITS: Limits = Limits { warning: 2000.0, critical: 3000.0 };
const LCP_LIMITS: Limits = Limits { warning: 2500.0, critical: 4000.0 };
const CLS_LIMITS: Limits = Limits { warning: 0.10, critical: 0.25 };
const TBT_LIMITS: Limits = Limits { warning: 300.0, critical: 600.0 };
const TTI_LIMITS: Limits = Limits { warning: 3800.0, critical: 7300.0 };
const SI_LIMITS: Limits = Limits { warning: 3400.0, critical: 5800.0 };
const SCORE_LIMITS: Limits = Limits { warning: 0.70, critical: 0.50 };
const API_RESPONSE_LIMITS: Limits = Limits { warning: 500.0, critical: 1000.0 };
const API_ERROR_RATE_LIMITS: Limits = Limits { warning: 5.0, critical: 10.0 };
const API_PAYLOAD_LIMITS: Limits = Limits {
    warning: 1024.0 * 1024.0,
    critical: 5.0 * 1024.0 * 1024.0,
};

/// Higher-is-worse grading: critical first, then warning, else none.
fn grade_high(value: f64, limits: &Limits) -> Option<AlertType> {
    if value >= limits.critical {
        Some(AlertType::Critical)
    } else if value >= limits.warning {
        Some(AlertType::Warning)
    } else {
        None
    }
}

/// Lower-is-worse grading, used for category scores.
fn grade_low(value: f64, limits: &Limits) -> Option<AlertType> {
    if value <= limits.critical {
        Some(AlertType::Critical)
    } else if value <= limits.warning {
        Some(AlertType::Warning)
    } else {
        None
    }
}

fn fired_bound(alert_type: AlertType, limits: &Limits) -> f64 {
    match alert_type {
        AlertType::Critical => limits.critical,
        AlertType::Warning => limits.warning,
    }
}

/// Evaluate the configured thresholds against whatever metrics are
/// present. Both inputs are optional; with neither present the result is
/// empty. The output groups critical alerts before warnings and preserves
/// generation order within each group.
pub fn generate_alerts(
    frontend: Option<&FrontendMetrics>,
    api: Option<&ApiMetrics>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(frontend) = frontend {
        evaluate_web_vitals(frontend, &mut alerts);
        evaluate_category_scores(frontend, &mut alerts);
    }
    if let Some(api) = api {
        evaluate_api_metrics(api, &mut alerts);
    }

    // Stable sort: generation order survives within each severity.
    alerts.sort_by_key(|a| match a.alert_type {
        AlertType::Critical => 0,
        AlertType::Warning => 1,
    });
    alerts
}

fn evaluate_web_vitals(frontend: &FrontendMetrics, alerts: &mut Vec<Alert>) {
    let vitals: [(&str, Option<f64>, &Limits, &str); 5] = [
        (
            "First Contentful Paint",
            frontend.fcp_ms,
            &FCP_LIMITS,
            "Reduce render-blocking resources and inline critical CSS so first paint happens sooner.",
        ),
        (
            "Largest Contentful Paint",
            frontend.lcp_ms,
            &LCP_LIMITS,
            "Optimize the largest above-the-fold element: compress hero images and preload key resources.",
        ),
        (
            "Total Blocking Time",
            frontend.tbt_ms,
            &TBT_LIMITS,
            "Split long main-thread tasks and defer non-essential JavaScript.",
        ),
        (
            "Time to Interactive",
            frontend.tti_ms,
            &TTI_LIMITS,
            "Reduce JavaScript payload and defer third-party scripts until after load.",
        ),
        (
            "Speed Index",
            frontend.speed_index_ms,
            &SI_LIMITS,
            "Prioritize visible content: stream HTML early and lazy-load below-the-fold assets.",
        ),
    ];

    for (metric, value, limits, recommendation) in vitals {
        let Some(value) = value else { continue };
        if let Some(alert_type) = grade_high(value, limits) {
            let bound = fired_bound(alert_type, limits);
            alerts.push(Alert {
                alert_type,
                category: AlertCategory::WebVitals,
                metric: metric.to_string(),
                value: format!("{:.0}ms", value),
                threshold: format!("{:.0}ms", bound),
                message: format!(
                    "{} is {:.0}ms, at or above the {} threshold of {:.0}ms",
                    metric,
                    value,
                    alert_type.as_str(),
                    bound
                ),
                recommendation: recommendation.to_string(),
                details: Vec::new(),
            });
        }
    }

    // CLS is unitless and formatted differently.
    if let Some(cls) = frontend.cls
        && let Some(alert_type) = grade_high(cls, &CLS_LIMITS)
    {
        let bound = fired_bound(alert_type, &CLS_LIMITS);
        alerts.push(Alert {
            alert_type,
            category: AlertCategory::WebVitals,
            metric: "Cumulative Layout Shift".to_string(),
            value: format!("{:.2}", cls),
            threshold: format!("{:.2}", bound),
            message: format!(
                "Cumulative Layout Shift is {:.2}, at or above the {} threshold of {:.2}",
                cls,
                alert_type.as_str(),
                bound
            ),
            recommendation:
                "Reserve space for images, ads and embeds so late-loading content does not shift the layout."
                    .to_string(),
            details: Vec::new(),
        });
    }
}

fn evaluate_category_scores(frontend: &FrontendMetrics, alerts: &mut Vec<Alert>) {
    let scores: [(&str, Option<f64>, &str); 4] = [
        (
            "Performance Score",
            frontend.performance_score,
            "Work through the failing performance audits, starting with the heaviest network requests.",
        ),
        (
            "Accessibility Score",
            frontend.accessibility_score,
            "Fix missing alt text, labels and contrast issues flagged by the audit.",
        ),
        (
            "Best Practices Score",
            frontend.best_practices_score,
            "Address deprecated API usage and console errors reported by the audit.",
        ),
        (
            "SEO Score",
            frontend.seo_score,
            "Add missing meta descriptions and ensure pages are crawlable.",
        ),
    ];

    for (metric, value, recommendation) in scores {
        let Some(value) = value else { continue };
        if let Some(alert_type) = grade_low(value, &SCORE_LIMITS) {
            let bound = fired_bound(alert_type, &SCORE_LIMITS);
            alerts.push(Alert {
                alert_type,
                category: AlertCategory::CategoryScore,
                metric: metric.to_string(),
                value: format!("{:.2}", value),
                threshold: format!("{:.2}", bound),
                message: format!(
                    "{} is {:.2}, at or below the {} threshold of {:.2}",
                    metric,
                    value,
                    alert_type.as_str(),
                    bound
                ),
                recommendation: recommendation.to_string(),
                details: Vec::new(),
            });
        }
    }
}

fn evaluate_api_metrics(api: &ApiMetrics, alerts: &mut Vec<Alert>) {
    if api.total_calls == 0 {
        return;
    }

    // Response time, evaluated over the aggregate average.
    if let Some(alert_type) = grade_high(api.average_response_time_ms, &API_RESPONSE_LIMITS) {
        let bound = fired_bound(alert_type, &API_RESPONSE_LIMITS);
        let offenders: Vec<&CallSummary> = api
            .calls
            .iter()
            .filter(|c| c.duration_ms as f64 >= bound)
            .collect();
        alerts.push(Alert {
            alert_type,
            category: AlertCategory::ApiPerformance,
            metric: "API Response Time".to_string(),
            value: format!("{:.0}ms", api.average_response_time_ms),
            threshold: format!("{:.0}ms", bound),
            message: format!(
                "Average API response time is {:.0}ms across {} calls, at or above the {} threshold of {:.0}ms",
                api.average_response_time_ms,
                api.total_calls,
                alert_type.as_str(),
                bound
            ),
            recommendation:
                "Profile the slowest endpoints; add caching or pagination for heavy queries."
                    .to_string(),
            details: offender_details(&offenders),
        });
    }

    // Error rate, over resolved calls.
    let error_percent = api.error_rate * 100.0;
    if let Some(alert_type) = grade_high(error_percent, &API_ERROR_RATE_LIMITS) {
        let bound = fired_bound(alert_type, &API_ERROR_RATE_LIMITS);
        let offenders: Vec<&CallSummary> = api
            .calls
            .iter()
            .filter(|c| matches!(c.status, Some(status) if status >= 400))
            .collect();
        alerts.push(Alert {
            alert_type,
            category: AlertCategory::ApiReliability,
            metric: "API Error Rate".to_string(),
            value: format!("{:.1}%", error_percent),
            threshold: format!("{:.1}%", bound),
            message: format!(
                "{} of {} resolved API calls failed ({:.1}%), at or above the {} threshold of {:.1}%",
                api.failed_calls,
                api.resolved_calls,
                error_percent,
                alert_type.as_str(),
                bound
            ),
            recommendation:
                "Inspect the failing endpoints' server logs; retry or circuit-break transient failures."
                    .to_string(),
            details: offender_details(&offenders),
        });
    }

    // Payload size, evaluated over the largest observed payload.
    if let Some(alert_type) = grade_high(api.max_payload_bytes as f64, &API_PAYLOAD_LIMITS) {
        let bound = fired_bound(alert_type, &API_PAYLOAD_LIMITS);
        let offenders: Vec<&CallSummary> = api
            .calls
            .iter()
            .filter(|c| c.payload_size_bytes as f64 >= bound)
            .collect();
        alerts.push(Alert {
            alert_type,
            category: AlertCategory::ApiPayload,
            metric: "API Payload Size".to_string(),
            value: format_bytes(api.max_payload_bytes),
            threshold: format_bytes(bound as u64),
            message: format!(
                "Largest API payload is {}, at or above the {} threshold of {}",
                format_bytes(api.max_payload_bytes),
                alert_type.as_str(),
                format_bytes(bound as u64)
            ),
            recommendation:
                "Trim over-fetched fields and compress or paginate large responses.".to_string(),
            details: offender_details(&offenders),
        });
    }
}

/// Up to the first three offending calls, plus a count of the remainder.
fn offender_details(offenders: &[&CallSummary]) -> Vec<serde_json::Value> {
    let mut details: Vec<serde_json::Value> = offenders
        .iter()
        .take(MAX_DETAILED_OFFENDERS)
        .filter_map(|call| serde_json::to_value(call).ok())
        .collect();
    if offenders.len() > MAX_DETAILED_OFFENDERS {
        details.push(json!({
            "additional_offenders": offenders.len() - MAX_DETAILED_OFFENDERS
        }));
    }
    details
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    const KB: f64 = 1024.0;
    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1}MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes / KB)
    } else {
        format!("{:.0}B", bytes)
    }
}
