// Before/after snapshot differencing: attributes frontend rendering
// impact to individual API calls.

use std::time::Duration;

use tracing::{debug, warn};

use pagepulse_scanner::navigator::Navigator;
use pagepulse_scanner::result::{ApiCallRecord, FrontendImpact};
use pagepulse_scanner::{Result, ScanError};

const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Replays each API call against a live page and measures what it does to
/// the frontend. Needs its own navigator session. Snapshots are global
/// page state, so calls are measured strictly one at a time; overlapping
/// two would make before/after attribution meaningless.
pub struct ImpactCorrelator<'a, N: Navigator> {
    navigator: &'a N,
    settle: Duration,
}

impl<'a, N: Navigator> ImpactCorrelator<'a, N> {
    pub fn new(navigator: &'a N) -> Self {
        Self {
            navigator,
            settle: DEFAULT_SETTLE,
        }
    }

    /// Override the post-replay settle interval (tests use a short one).
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Enrich every call with a `FrontendImpact`. Failing to load the page
    /// at all is a hard error; a snapshot or replay failure for one call
    /// is recorded in that call's impact and the rest proceed.
    pub async fn correlate(
        &self,
        calls: Vec<ApiCallRecord>,
        page_url: &str,
    ) -> Result<Vec<ApiCallRecord>> {
        self.navigator.visit(page_url).await.map_err(|e| {
            ScanError::Navigation(format!("cannot open {} for correlation: {}", page_url, e))
        })?;

        let mut enriched = Vec::with_capacity(calls.len());
        for mut call in calls {
            debug!("Measuring impact of {} {}", call.method, call.url);
            let impact = match self.measure(&call).await {
                Ok(impact) => impact,
                Err(e) => {
                    warn!("Impact measurement failed for {}: {}", call.url, e);
                    FrontendImpact::failed(e.to_string())
                }
            };
            call.frontend_impact = Some(impact);
            enriched.push(call);
        }
        Ok(enriched)
    }

    async fn measure(&self, call: &ApiCallRecord) -> Result<FrontendImpact> {
        let before = self.navigator.snapshot().await?;
        self.navigator.replay(call).await?;
        tokio::time::sleep(self.settle).await;
        let after = self.navigator.snapshot().await?;
        Ok(FrontendImpact::between(&before, &after))
    }
}
