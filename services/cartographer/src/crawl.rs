//! Post-login crawl
//!
//! Visits the configured paths in order on the same page the interceptor is
//! attached to, pausing after each so the application's own API calls fire.
//! A page that fails to load is skipped; the crawl never aborts discovery.

use std::time::Duration;

use browser::BrowserSession;
use tracing::{info, warn};
use url::Url;

/// What a crawl managed to visit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub visited: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn crawl(
    session: &dyn BrowserSession,
    base: &Url,
    paths: &[String],
    settle: Duration,
) -> CrawlReport {
    let mut report = CrawlReport::default();
    for path in paths {
        let url = match base.join(path) {
            Ok(url) => url,
            Err(e) => {
                warn!(path = %path, error = %e, "crawl path does not form a URL, skipped");
                report.failed.push(path.clone());
                continue;
            }
        };
        match session.navigate(url.as_str()).await {
            Ok(()) => {
                tokio::time::sleep(settle).await;
                report.visited.push(path.clone());
            }
            Err(e) => {
                warn!(url = %url, error = %e, "crawl navigation failed, skipped");
                report.failed.push(path.clone());
            }
        }
    }
    info!(
        visited = report.visited.len(),
        failed = report.failed.len(),
        "crawl finished"
    );
    report
}
