// Report generation over a crawl and its alerts.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use pagepulse_scanner::result::CrawlResult;

use crate::alerts::{Alert, AlertType};
use crate::metrics::ApiMetrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSummary {
    pub base_url: Option<String>,
    pub pages_visited: usize,
    pub pages_loaded: usize,
    pub pages_failed: usize,
    pub max_depth_reached: usize,
    pub api_calls_captured: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub crawl: CrawlSummary,
    pub api_metrics: ApiMetrics,
    pub alerts: Vec<Alert>,
    pub severity_counts: SeverityCounts,
}

pub fn gather_report_data(result: &CrawlResult, alerts: &[Alert]) -> ReportData {
    let pages_failed = result
        .page_data
        .values()
        .filter(|p| p.error.is_some())
        .count();

    let severity_counts = SeverityCounts {
        critical: alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::Critical)
            .count(),
        warning: alerts
            .iter()
            .filter(|a| a.alert_type == AlertType::Warning)
            .count(),
    };

    ReportData {
        crawl: CrawlSummary {
            base_url: result.visited_urls.first().cloned(),
            pages_visited: result.visited_urls.len(),
            pages_loaded: result.total_pages,
            pages_failed,
            max_depth_reached: result.max_depth_reached,
            api_calls_captured: result.total_api_calls,
        },
        api_metrics: ApiMetrics::from_calls(&result.api_calls),
        alerts: alerts.to_vec(),
        severity_counts,
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report.push_str("                        PAGEPULSE CRAWL & IMPACT REPORT\n");
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    if let Some(ref base_url) = data.crawl.base_url {
        report.push_str(&format!("Target:         {}\n", base_url));
    }
    report.push_str(&format!("Pages Visited:  {}\n", data.crawl.pages_visited));
    report.push_str(&format!("Pages Loaded:   {}\n", data.crawl.pages_loaded));
    if data.crawl.pages_failed > 0 {
        report.push_str(&format!("Pages Failed:   {}\n", data.crawl.pages_failed));
    }
    report.push_str(&format!("Max Depth:      {}\n", data.crawl.max_depth_reached));
    report.push_str(&format!("API Calls:      {}\n", data.crawl.api_calls_captured));

    if data.api_metrics.total_calls > 0 {
        report.push_str(&format!(
            "Avg Response:   {:.0}ms\n",
            data.api_metrics.average_response_time_ms
        ));
        report.push_str(&format!(
            "Error Rate:     {:.1}%\n",
            data.api_metrics.error_rate * 100.0
        ));
    }
    report.push('\n');

    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report.push_str("ALERT SUMMARY\n");
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    report.push_str(&format!("Total Alerts: {}\n\n", data.alerts.len()));
    if data.severity_counts.critical > 0 {
        report.push_str(&format!(
            "  [CRITICAL] {}  (Immediate action required)\n",
            data.severity_counts.critical
        ));
    }
    if data.severity_counts.warning > 0 {
        report.push_str(&format!(
            "  [WARNING]  {}  (Should be addressed)\n",
            data.severity_counts.warning
        ));
    }
    if data.alerts.is_empty() {
        report.push_str("  No thresholds exceeded.\n");
    }
    report.push('\n');

    if !data.alerts.is_empty() {
        report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        report.push_str("ALERTS\n");
        report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

        for (idx, alert) in data.alerts.iter().enumerate() {
            report.push_str(&format!("[{}] {}\n", idx + 1, alert.metric));
            report.push_str(&format!(
                "Severity:       {}\n",
                alert.alert_type.as_str().to_uppercase()
            ));
            report.push_str(&format!("Category:       {}\n", alert.category.as_str()));
            report.push_str(&format!(
                "Measured:       {} (threshold {})\n",
                alert.value, alert.threshold
            ));
            report.push_str(&format!("\n{}\n", alert.message));
            report.push_str(&format!("\nRecommendation:\n  {}\n", alert.recommendation));

            if !alert.details.is_empty() {
                report.push_str("\nOffending calls:\n");
                for detail in &alert.details {
                    if let Some(url) = detail.get("url").and_then(|u| u.as_str()) {
                        let status = detail
                            .get("status")
                            .and_then(|s| s.as_u64())
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "unresolved".to_string());
                        let duration = detail
                            .get("duration_ms")
                            .and_then(|d| d.as_u64())
                            .unwrap_or(0);
                        report.push_str(&format!("  {} [{}] {}ms\n", url, status, duration));
                    } else if let Some(more) =
                        detail.get("additional_offenders").and_then(|m| m.as_u64())
                    {
                        report.push_str(&format!("  ... and {} more\n", more));
                    }
                }
            }

            report.push_str(
                "\n────────────────────────────────────────────────────────────────────────────────\n\n",
            );
        }
    }

    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report.push_str("                          End of Report\n");
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report.push_str("\nGenerated by Pagepulse\n\n");

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Pagepulse",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "crawl": data.crawl,
            "summary": {
                "total_alerts": data.alerts.len(),
                "severity_breakdown": data.severity_counts,
                "api": {
                    "total_calls": data.api_metrics.total_calls,
                    "failed_calls": data.api_metrics.failed_calls,
                    "average_response_time_ms": data.api_metrics.average_response_time_ms,
                    "error_rate": data.api_metrics.error_rate,
                    "max_payload_bytes": data.api_metrics.max_payload_bytes
                }
            },
            "alerts": data.alerts
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
