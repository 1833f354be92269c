//! Session-scoped, append-only call store

use std::collections::BTreeMap;

use crate::{CapturedCall, CapturedResponse, Error, Result, RouteKey};

/// Request headers that carry an anti-forgery token, in lookup order.
pub const CSRF_HEADERS: &[&str] = &[
    "x-csrf-token",
    "x-xsrf-token",
    "x-csrftoken",
    "csrf-token",
    "x-csrf",
];

/// Per-route ordered call lists plus the count of dropped responses.
#[derive(Debug, Default, Clone)]
pub struct CaptureStore {
    routes: BTreeMap<RouteKey, Vec<CapturedCall>>,
    opened: u64,
    gaps: u64,
}

impl CaptureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly opened call to its route.
    pub fn open(&mut self, mut call: CapturedCall) {
        call.sequence = self.opened;
        self.opened += 1;
        self.routes.entry(call.route_key()).or_default().push(call);
    }

    /// Attach `response` to the most recently opened unattached call on
    /// `route`. With no such call the response is a capture gap; it is counted
    /// and the error returned to the caller for logging.
    pub fn attach(&mut self, route: &RouteKey, response: CapturedResponse) -> Result<()> {
        let open = self
            .routes
            .get_mut(route)
            .and_then(|calls| calls.iter_mut().rev().find(|c| c.is_open()));
        match open {
            Some(call) => call.attach(response),
            None => {
                self.gaps += 1;
                Err(Error::CaptureGap(route.to_string()))
            }
        }
    }

    /// Routes with their calls in observation order.
    pub fn routes(&self) -> impl Iterator<Item = (&RouteKey, &[CapturedCall])> {
        self.routes.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn calls(&self) -> impl Iterator<Item = &CapturedCall> {
        self.routes.values().flatten()
    }

    /// Calls whose response was 2xx/3xx.
    pub fn successful_calls(&self) -> impl Iterator<Item = &CapturedCall> {
        self.calls().filter(|c| c.is_successful())
    }

    /// Number of captured calls (open or not).
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    /// The newest successful GET; the only kind of call safe to replay.
    pub fn latest_successful_get(&self) -> Option<&CapturedCall> {
        self.successful_calls()
            .filter(|c| c.method == "GET")
            .max_by_key(|c| c.observed_order())
    }

    /// Most recently captured `authorization: Bearer ...` header value.
    pub fn latest_bearer(&self) -> Option<&str> {
        self.calls()
            .filter_map(|c| {
                let value = c.request_header("authorization")?;
                let is_bearer = value
                    .get(..7)
                    .is_some_and(|p| p.eq_ignore_ascii_case("bearer "));
                is_bearer.then_some((c.observed_order(), value))
            })
            .max_by_key(|(order, _)| *order)
            .map(|(_, v)| v)
    }

    /// Most recently captured CSRF header as `(name, value)`.
    pub fn latest_csrf(&self) -> Option<(&'static str, &str)> {
        self.calls()
            .filter_map(|c| {
                CSRF_HEADERS
                    .iter()
                    .find_map(|name| c.request_header(name).map(|v| (c.observed_order(), *name, v)))
            })
            .max_by_key(|(order, _, _)| *order)
            .map(|(_, name, value)| (name, value))
    }
}
