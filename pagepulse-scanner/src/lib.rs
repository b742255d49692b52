pub mod classifier;
pub mod crawler;
pub mod error;
pub mod navigator;
pub mod result;
pub mod timing;

pub use classifier::{ApiClassifier, DefaultClassifier};
pub use crawler::Crawler;
pub use error::{Result, ScanError};
pub use navigator::{HttpNavigator, Navigator, NetworkEvent, PageVisit, RequestEvent, ResponseEvent};
pub use result::{
    ApiCallRecord, CrawlResult, FrontendImpact, FrontendSnapshot, FrontierEntry, PageRecord,
    RenderingImpact,
};
pub use timing::{RawTiming, Timing, TimingMethod, estimate_duration};
