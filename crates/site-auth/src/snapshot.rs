//! Session material, snapshots, and the `session.json` artifact
//!
//! `SessionMaterial` is everything gathered right after login: the browser's
//! cookies for the instance host plus tokens seen in captured traffic. An
//! `AuthStrategy` selects which of those become request headers; the result
//! is a `SessionSnapshot`. Snapshots are compared by `CredentialFingerprint`
//! and never mutated, only superseded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use browser::BrowserSession;
use capture::CaptureStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Cookies that carry an anti-forgery token, and the header that echoes them.
const CSRF_COOKIES: &[(&str, &str)] = &[
    ("xsrf-token", "x-xsrf-token"),
    ("csrftoken", "x-csrftoken"),
    ("csrf_token", "x-csrf-token"),
    ("csrf-token", "x-csrf-token"),
    ("_csrf", "x-csrf-token"),
];

/// Which captured material goes into replayed requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStrategy {
    /// cookie + CSRF header + origin/referer
    CookieContext,
    /// cookie_context plus the captured bearer token
    CookieBearer,
    /// bearer token + origin/referer
    BearerOnly,
}

impl AuthStrategy {
    /// Probe order.
    pub const ALL: [AuthStrategy; 3] = [
        AuthStrategy::CookieContext,
        AuthStrategy::CookieBearer,
        AuthStrategy::BearerOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuthStrategy::CookieContext => "cookie_context",
            AuthStrategy::CookieBearer => "cookie_bearer",
            AuthStrategy::BearerOnly => "bearer_only",
        }
    }

    pub fn needs_bearer(self) -> bool {
        !matches!(self, AuthStrategy::CookieContext)
    }

    /// Best guess from a header map, used for artifacts written elsewhere.
    pub fn infer(headers: &BTreeMap<String, String>) -> Self {
        match (headers.contains_key("cookie"), headers.contains_key("authorization")) {
            (true, true) => AuthStrategy::CookieBearer,
            (false, true) => AuthStrategy::BearerOnly,
            _ => AuthStrategy::CookieContext,
        }
    }
}

impl fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw authentication material captured after login.
#[derive(Clone, Default)]
pub struct SessionMaterial {
    /// Scheme + host (+ port) of the instance, no trailing slash
    pub origin: String,
    /// `(name, value)` pairs of cookies that apply to the instance host
    pub cookies: Vec<(String, String)>,
    /// `(header name, value)`
    pub csrf: Option<(String, String)>,
    /// Full `authorization` header value, `Bearer ...`
    pub bearer: Option<String>,
}

impl fmt::Debug for SessionMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMaterial")
            .field("origin", &self.origin)
            .field("cookies", &self.cookies.len())
            .field("csrf", &self.csrf.as_ref().map(|(name, _)| name))
            .field("bearer", &self.bearer.is_some())
            .finish()
    }
}

impl SessionMaterial {
    /// Gather cookies from the browser and tokens from captured traffic.
    ///
    /// A CSRF header seen on the wire wins over one derived from a cookie.
    pub async fn collect(
        session: &dyn BrowserSession,
        store: &CaptureStore,
        instance_url: &Url,
    ) -> Result<Self> {
        let host = instance_url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{instance_url} has no host")))?;

        let mut cookies: Vec<(String, String)> = Vec::new();
        for cookie in session.cookies().await? {
            if !cookie.applies_to(host) || cookies.iter().any(|(n, _)| *n == cookie.name) {
                continue;
            }
            cookies.push((cookie.name, cookie.value));
        }

        let csrf = store
            .latest_csrf()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .or_else(|| csrf_from_cookies(&cookies));
        let bearer = store.latest_bearer().map(str::to_string);

        let material = Self {
            origin: instance_url.origin().ascii_serialization(),
            cookies,
            csrf,
            bearer,
        };
        debug!(?material, "collected session material");
        Ok(material)
    }

    /// Whether this material carries what `strategy` sends.
    pub fn supports(&self, strategy: AuthStrategy) -> bool {
        !strategy.needs_bearer() || self.bearer.is_some()
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{n}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Request headers for `strategy`. Bearer strategies without a captured
    /// bearer simply omit `authorization`; callers skip them beforehand.
    pub fn headers_for(&self, strategy: AuthStrategy) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if strategy != AuthStrategy::BearerOnly {
            if let Some(cookie) = self.cookie_header() {
                headers.insert("cookie".to_string(), cookie);
            }
            if let Some((name, value)) = &self.csrf {
                headers.insert(name.clone(), value.clone());
            }
        }
        if strategy.needs_bearer() {
            if let Some(bearer) = &self.bearer {
                headers.insert("authorization".to_string(), bearer.clone());
            }
        }
        headers.insert("origin".to_string(), self.origin.clone());
        headers.insert("referer".to_string(), format!("{}/", self.origin));
        headers
    }
}

fn csrf_from_cookies(cookies: &[(String, String)]) -> Option<(String, String)> {
    CSRF_COOKIES.iter().find_map(|(cookie_name, header)| {
        cookies
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(cookie_name))
            .map(|(_, v)| (header.to_string(), v.clone()))
    })
}

/// Stable identity of a snapshot's credentials.
///
/// SHA-256 over the cookie pairs sorted by name plus the bearer token,
/// URL-safe base64. Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialFingerprint(String);

impl CredentialFingerprint {
    pub fn of_headers(headers: &BTreeMap<String, String>) -> Self {
        let mut pairs: Vec<(&str, &str)> = headers
            .get("cookie")
            .map(|c| {
                c.split(';')
                    .filter_map(|p| {
                        let (n, v) = p.trim().split_once('=')?;
                        Some((n.trim(), v.trim()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        pairs.sort();

        let mut hasher = Sha256::new();
        for (name, value) in &pairs {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b";");
        }
        if let Some(bearer) = headers.get("authorization") {
            hasher.update(b"\n");
            hasher.update(bearer.as_bytes());
        }
        Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk form of a snapshot (`session.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionArtifact {
    pub headers: BTreeMap<String, String>,
    pub captured_at: u64,
    pub instance_url: String,
    pub cookie_count: usize,
    pub has_csrf_token: bool,
}

/// An authenticated session ready for replay.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub headers: BTreeMap<String, String>,
    /// Epoch milliseconds
    pub captured_at: u64,
    pub instance_url: String,
    pub strategy: AuthStrategy,
    /// Whether a probe request confirmed the strategy
    pub verified: bool,
    pub cookie_count: usize,
    pub has_csrf_token: bool,
}

impl fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("captured_at", &self.captured_at)
            .field("instance_url", &self.instance_url)
            .field("strategy", &self.strategy)
            .field("verified", &self.verified)
            .field("cookie_count", &self.cookie_count)
            .field("has_csrf_token", &self.has_csrf_token)
            .finish()
    }
}

impl SessionSnapshot {
    pub fn new(material: &SessionMaterial, strategy: AuthStrategy, verified: bool) -> Self {
        let headers = material.headers_for(strategy);
        let cookie_count = if strategy == AuthStrategy::BearerOnly {
            0
        } else {
            material.cookies.len()
        };
        let has_csrf_token = strategy != AuthStrategy::BearerOnly && material.csrf.is_some();
        Self {
            headers,
            captured_at: common::now_millis(),
            instance_url: material.origin.clone(),
            strategy,
            verified,
            cookie_count,
            has_csrf_token,
        }
    }

    pub fn fingerprint(&self) -> CredentialFingerprint {
        CredentialFingerprint::of_headers(&self.headers)
    }

    pub fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.captured_at)
    }

    pub fn artifact(&self) -> SessionArtifact {
        SessionArtifact {
            headers: self.headers.clone(),
            captured_at: self.captured_at,
            instance_url: self.instance_url.clone(),
            cookie_count: self.cookie_count,
            has_csrf_token: self.has_csrf_token,
        }
    }

    /// Rebuild from an artifact. The artifact does not record probing, so
    /// the strategy is inferred from the headers and marked unverified.
    pub fn from_artifact(artifact: SessionArtifact) -> Self {
        Self {
            strategy: AuthStrategy::infer(&artifact.headers),
            verified: false,
            headers: artifact.headers,
            captured_at: artifact.captured_at,
            instance_url: artifact.instance_url,
            cookie_count: artifact.cookie_count,
            has_csrf_token: artifact.has_csrf_token,
        }
    }

    /// Write `session.json` atomically with owner-only permissions.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.artifact())
            .map_err(|e| Error::SessionParse(format!("serializing session artifact: {e}")))?;
        common::fs::write_atomic(path, json.as_bytes(), true)
            .await
            .map_err(|e| Error::Io(format!("writing session file {}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            strategy = %self.strategy,
            cookies = self.cookie_count,
            csrf = self.has_csrf_token,
            "persisted session"
        );
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Io(format!("reading session file {}: {e}", path.display())))?;
        let artifact: SessionArtifact = serde_json::from_str(&contents)
            .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
        Ok(Self::from_artifact(artifact))
    }
}
