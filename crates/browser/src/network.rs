//! Network events delivered by a browser session
//!
//! Backend-neutral view of the request/response notifications a page emits.
//! Headers are lowercased on construction so downstream lookups never need to
//! care about the wire casing.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

/// Receiving end of a session's network subscription.
pub type NetworkEvents = mpsc::UnboundedReceiver<NetworkEvent>;

/// What kind of resource the page was loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    EventSource,
    WebSocket,
    Other,
}

impl ResourceKind {
    /// XHR and fetch calls are the application's own API traffic; everything
    /// else is page furniture.
    pub fn is_api_call(self) -> bool {
        matches!(self, ResourceKind::Xhr | ResourceKind::Fetch)
    }
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    /// Raw request body, when the browser exposes one
    pub post_data: Option<String>,
    pub resource: ResourceKind,
}

/// An incoming response.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: String,
    /// Method of the originating request (backends correlate this themselves)
    pub method: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    /// Raw response body text; backends only fetch it for JSON content types
    pub body: Option<String>,
    pub resource: ResourceKind,
}

/// One notification from the page's network stack.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
}

/// Lowercase header names, keeping the last value for duplicates.
pub fn normalize_headers<I, K, V>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
        .collect()
}
