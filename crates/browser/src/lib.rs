//! Browser session abstraction for login automation and traffic capture
//!
//! Defines the `BrowserSession` trait that decouples the login state machine
//! and the traffic interceptor from any particular automation backend. The
//! binary ships a Chrome DevTools Protocol implementation; tests drive the same
//! code paths with scripted in-memory sessions.
//!
//! One session is one page. Everything that relies on request ordering (the
//! interceptor's LIFO correlation in particular) assumes callers never run
//! two pages against the same session.

pub mod network;

pub use network::{NetworkEvent, NetworkEvents, RequestEvent, ResourceKind, ResponseEvent};

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// Boxed future returned by `BrowserSession` methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from browser operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("devtools protocol error: {0}")]
    Protocol(String),

    #[error("browser operation timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for browser operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What a group of form-field selectors currently resolves to on the page.
///
/// The first visible match wins; hidden or detached elements count as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// No visible element matches any selector
    Absent,
    /// A visible element matches and has no value yet
    Empty,
    /// A visible element matches and already carries a value
    Filled,
}

impl FieldState {
    pub fn is_visible(self) -> bool {
        !matches!(self, FieldState::Absent)
    }

    pub fn is_empty_and_visible(self) -> bool {
        matches!(self, FieldState::Empty)
    }
}

/// A cookie as reported by the browser's cookie jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl BrowserCookie {
    /// Whether this cookie would be sent to `host`.
    ///
    /// Leading-dot domains match the host and every subdomain; bare domains
    /// match the host exactly or as a parent domain (browser behavior for
    /// cookies set without an explicit Domain attribute is host-only, but the
    /// jar reports those with the bare host, so the exact comparison covers it).
    pub fn applies_to(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    }
}

/// Abstraction over one automated browser page.
///
/// Selector arguments are CSS selectors tried in order; label arguments are
/// case-insensitive visible-text matches for buttons and links. Methods that
/// look for something return `Ok(false)` / `FieldState::Absent` when it is not
/// on the page; `Err` is reserved for a broken session.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn BrowserSession>`).
pub trait BrowserSession: Send + Sync {
    /// Backend identifier for logging (e.g. "chrome")
    fn id(&self) -> &str;

    /// Navigate the page and wait for the load to settle (bounded by the
    /// backend's navigation timeout).
    fn navigate<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>>;

    /// The page's current URL.
    fn current_url(&self) -> BoxFuture<'_, Result<String>>;

    /// Inspect the first visible element matching any of `selectors`.
    fn field_state<'a>(&'a self, selectors: &'a [&'a str]) -> BoxFuture<'a, Result<FieldState>>;

    /// Type `value` into the first visible empty field matching `selectors` and
    /// submit its form. Returns false if no such field was found.
    fn fill_and_submit<'a>(
        &'a self,
        selectors: &'a [&'a str],
        value: &'a str,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Whether a visible button or link with one of `labels` exists.
    fn control_visible<'a>(&'a self, labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>>;

    /// Click the first visible button or link with one of `labels`.
    fn click_control<'a>(&'a self, labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>>;

    /// All cookies in the page's browser context.
    fn cookies(&self) -> BoxFuture<'_, Result<Vec<BrowserCookie>>>;

    /// Write a full-page PNG screenshot to `path`.
    fn screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Subscribe to this page's network traffic.
    ///
    /// Events are delivered in the order the backend observed them. The
    /// stream ends when the session is closed.
    fn network_events(&self) -> BoxFuture<'_, Result<NetworkEvents>>;
}
