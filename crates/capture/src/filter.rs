//! Admission filter for captured traffic

use browser::ResourceKind;
use regex::Regex;
use url::Url;

use crate::{Error, Result};

/// Path fragments that mark analytics, telemetry and tracking beacons.
const TELEMETRY_PATTERN: &str = r"(?i)(?:^|/)(?:analytics|telemetry|collect|beacons?|track(?:ing)?|pixel|rum|sentry|cdn-cgi|otlp|_vercel/insights|gtag|gtm)(?:/|\.|$)";

/// Static asset extensions.
const STATIC_PATTERN: &str =
    r"(?i)\.(?:m?js|css|map|png|jpe?g|gif|svg|ico|webp|avif|bmp|woff2?|ttf|otf|eot|mp[34]|webm|wasm)$";

/// Decides which requests are the target application's own API calls.
#[derive(Debug, Clone)]
pub struct CaptureFilter {
    host: String,
    excluded: Vec<Regex>,
}

impl CaptureFilter {
    /// Filter for `host` with the built-in exclusions.
    pub fn new(host: impl AsRef<str>) -> Self {
        let excluded = [TELEMETRY_PATTERN, STATIC_PATTERN]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            host: host.as_ref().to_ascii_lowercase(),
            excluded,
        }
    }

    /// Add configured path exclusions on top of the built-ins.
    pub fn with_extra_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        for pattern in patterns {
            let re = Regex::new(pattern.as_ref())
                .map_err(|e| Error::InvalidPattern(format!("{}: {e}", pattern.as_ref())))?;
            self.excluded.push(re);
        }
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host match (case-insensitive), XHR/fetch only, path not excluded.
    pub fn admits(&self, url: &Url, resource: ResourceKind) -> bool {
        if !resource.is_api_call() {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        if !host.eq_ignore_ascii_case(&self.host) {
            return false;
        }
        let path = url.path();
        !self.excluded.iter().any(|re| re.is_match(path))
    }

    /// String form of `admits`; unparseable URLs are never admitted.
    pub fn admits_url(&self, url: &str, resource: ResourceKind) -> bool {
        Url::parse(url).is_ok_and(|u| self.admits(&u, resource))
    }
}
