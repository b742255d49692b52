pub mod alerts;
pub mod impact;
pub mod metrics;
pub mod report;

pub use alerts::{Alert, AlertCategory, AlertType, generate_alerts};
pub use impact::ImpactCorrelator;
pub use metrics::{ApiMetrics, CallSummary, FrontendMetrics};
pub use report::{ReportData, gather_report_data, generate_json_report, generate_text_report};
