//! Auth strategy probing
//!
//! Replays the most recent successful GET with each candidate header set and
//! adopts the first that the server accepts. Only GETs are ever replayed.

use std::collections::BTreeMap;
use std::time::Duration;

use browser::BoxFuture;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::snapshot::{AuthStrategy, SessionMaterial};

/// Sends a single GET and reports the status code.
pub trait ProbeTransport: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<u16>>;
}

/// `reqwest` transport. Redirects are not followed, so a bounce to a login
/// page is judged by its own status.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Http(format!("building probe client: {e}")))?;
        Ok(Self { client })
    }
}

impl ProbeTransport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<u16>> {
        Box::pin(async move {
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let response = request
                .send()
                .await
                .map_err(|e| Error::Http(format!("probe request failed: {e}")))?;
            Ok(response.status().as_u16())
        })
    }
}

/// Chosen strategy and whether a request confirmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub strategy: AuthStrategy,
    pub verified: bool,
    /// Status of the accepting probe request
    pub status: Option<u16>,
}

impl ProbeResult {
    /// Cookie-only fallback when nothing could be confirmed.
    pub fn unverified() -> Self {
        Self {
            strategy: AuthStrategy::CookieContext,
            verified: false,
            status: None,
        }
    }
}

/// A 404 still proves the request got past authentication.
fn accepted(status: u16) -> bool {
    status < 400 || status == 404
}

/// Try each candidate against `probe_path` (path plus optional query).
///
/// Bearer candidates are skipped when no bearer was captured. With no probe
/// path, or no candidate accepted, `cookie_context` is adopted unverified.
pub async fn probe(
    material: &SessionMaterial,
    probe_path: Option<&str>,
    transport: &dyn ProbeTransport,
) -> ProbeResult {
    let Some(path) = probe_path else {
        warn!(warning = "unverified_strategy", "no successful GET captured, strategy not probed");
        return ProbeResult::unverified();
    };
    let url = format!("{}{path}", material.origin);

    for strategy in AuthStrategy::ALL {
        if !material.supports(strategy) {
            debug!(strategy = %strategy, "skipped, no bearer captured");
            continue;
        }
        let headers = material.headers_for(strategy);
        match transport.get(&url, &headers).await {
            Ok(status) if accepted(status) => {
                info!(strategy = %strategy, status, url = %url, "auth strategy verified");
                metrics::counter!("probe_requests_total", "result" => "accepted").increment(1);
                return ProbeResult {
                    strategy,
                    verified: true,
                    status: Some(status),
                };
            }
            Ok(status) => {
                debug!(strategy = %strategy, status, "probe rejected");
                metrics::counter!("probe_requests_total", "result" => "rejected").increment(1);
            }
            Err(e) => {
                debug!(strategy = %strategy, error = %e, "probe failed");
                metrics::counter!("probe_requests_total", "result" => "error").increment(1);
            }
        }
    }

    warn!(
        warning = "unverified_strategy",
        url = %url,
        "no auth strategy accepted, falling back to cookie_context"
    );
    ProbeResult::unverified()
}
