//! Captured request/response records

use std::collections::BTreeMap;
use std::fmt;

use browser::{RequestEvent, ResponseEvent};
use serde_json::Value;

use crate::{Error, Result};

/// Methods whose request bodies are kept and that count as mutations.
const MUTATING_METHODS: &[&str] = &["POST", "PUT", "PATCH", "DELETE"];

pub fn is_mutating_method(method: &str) -> bool {
    MUTATING_METHODS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
}

/// Method plus raw path; groups samples of the same physical route.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteKey {
    pub method: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Response half of a captured call.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    /// Parsed body; only present for JSON content types that parsed cleanly
    pub body: Option<Value>,
}

impl CapturedResponse {
    /// Build from a browser response event. The body is parsed only when the
    /// content type says JSON (`application/json`, `application/problem+json`,
    /// `application/vnd.api+json`, ...).
    pub fn from_event(event: &ResponseEvent) -> Self {
        let content_type = event
            .content_type
            .clone()
            .or_else(|| event.headers.get("content-type").cloned());
        let is_json = content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
        let body = if is_json {
            event
                .body
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
        } else {
            None
        };

        Self {
            status: event.status,
            headers: event.headers.clone(),
            content_type,
            body,
        }
    }

    /// 2xx and 3xx.
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// One observed request and, once it arrives, its response.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedCall {
    pub method: String,
    pub path: String,
    /// Query parameter names in first-seen order, without duplicates
    pub query_params: Vec<String>,
    /// Raw query string, kept so a GET can be replayed verbatim
    pub query: Option<String>,
    /// Parsed JSON request body, mutating methods only
    pub request_body: Option<Value>,
    pub request_headers: BTreeMap<String, String>,
    /// Epoch milliseconds at which the request was observed
    pub captured_at: u64,
    /// Position in the store's observation order, assigned on `open`
    pub(crate) sequence: u64,
    response: Option<CapturedResponse>,
}

impl CapturedCall {
    /// Open a call from a request event. Returns `None` if the URL does not
    /// parse.
    pub fn from_request(event: &RequestEvent, captured_at: u64) -> Option<Self> {
        let url = url::Url::parse(&event.url).ok()?;
        let method = event.method.to_ascii_uppercase();

        let mut query_params: Vec<String> = Vec::new();
        for (name, _) in url.query_pairs() {
            if !query_params.iter().any(|q| *q == name) {
                query_params.push(name.into_owned());
            }
        }

        let request_body = if is_mutating_method(&method) {
            event
                .post_data
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
        } else {
            None
        };

        Some(Self {
            method,
            path: url.path().to_string(),
            query_params,
            query: url.query().map(str::to_string),
            request_body,
            request_headers: event.headers.clone(),
            captured_at,
            sequence: 0,
            response: None,
        })
    }

    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(&self.method, self.path.clone())
    }

    /// Observation order key: capture time, then the order the store saw it.
    pub fn observed_order(&self) -> (u64, u64) {
        (self.captured_at, self.sequence)
    }

    pub fn response(&self) -> Option<&CapturedResponse> {
        self.response.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.response.is_none()
    }

    /// Whether a response arrived with a 2xx/3xx status.
    pub fn is_successful(&self) -> bool {
        self.response.as_ref().is_some_and(CapturedResponse::is_success)
    }

    pub fn is_mutation(&self) -> bool {
        is_mutating_method(&self.method)
    }

    /// Attach the response. A call takes exactly one response; it is immutable
    /// afterwards.
    pub fn attach(&mut self, response: CapturedResponse) -> Result<()> {
        if self.response.is_some() {
            return Err(Error::AlreadyAttached(self.route_key().to_string()));
        }
        self.response = Some(response);
        Ok(())
    }

    /// Path plus query, as it appeared on the wire.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }

    /// Request header lookup by lowercase name.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers.get(name).map(String::as_str)
    }
}
