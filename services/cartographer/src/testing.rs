//! In-memory browser page for service tests

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use browser::{
    BoxFuture, BrowserCookie, BrowserSession, Error, FieldState, NetworkEvent, NetworkEvents,
    Result,
};
use tokio::sync::mpsc;

/// A page with no login form.
///
/// Navigation moves the current URL unless the page is pinned, which models
/// an SSO page that never lets the session through.
pub struct FakePage {
    current: Mutex<String>,
    pinned: bool,
    failing: Vec<String>,
    cookies: Vec<BrowserCookie>,
    events: Mutex<Option<Vec<NetworkEvent>>>,
    events_delay: Duration,
    navigations: Mutex<Vec<String>>,
    screenshots: Mutex<Vec<PathBuf>>,
}

impl FakePage {
    pub fn landed(url: &str) -> Self {
        Self {
            current: Mutex::new(url.to_string()),
            pinned: false,
            failing: Vec::new(),
            cookies: Vec::new(),
            events: Mutex::new(Some(Vec::new())),
            events_delay: Duration::ZERO,
            navigations: Mutex::new(Vec::new()),
            screenshots: Mutex::new(Vec::new()),
        }
    }

    pub fn stuck_at(url: &str) -> Self {
        Self {
            pinned: true,
            ..Self::landed(url)
        }
    }

    /// Navigation to any URL ending in `suffix` fails.
    pub fn failing_on(mut self, suffix: &str) -> Self {
        self.failing.push(suffix.to_string());
        self
    }

    pub fn with_cookies(mut self, cookies: Vec<BrowserCookie>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Events delivered to the first `network_events` subscriber.
    pub fn with_events(self, events: Vec<NetworkEvent>) -> Self {
        *self.events.lock().unwrap() = Some(events);
        self
    }

    /// Deliver the events only once `delay` has passed after subscribing,
    /// like calls a page fires after it has rendered.
    pub fn with_late_events(mut self, events: Vec<NetworkEvent>, delay: Duration) -> Self {
        self.events_delay = delay;
        self.with_events(events)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.screenshots.lock().unwrap().clone()
    }
}

pub fn cookie(name: &str, value: &str, domain: &str) -> BrowserCookie {
    BrowserCookie {
        name: name.into(),
        value: value.into(),
        domain: domain.into(),
        path: "/".into(),
    }
}

impl BrowserSession for FakePage {
    fn id(&self) -> &str {
        "fake"
    }

    fn navigate<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.navigations.lock().unwrap().push(url.to_string());
            if self.failing.iter().any(|s| url.ends_with(s.as_str())) {
                return Err(Error::Navigation(format!("{url}: net::ERR_FAILED")));
            }
            if !self.pinned {
                *self.current.lock().unwrap() = url.to_string();
            }
            Ok(())
        })
    }

    fn current_url(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(self.current.lock().unwrap().clone()) })
    }

    fn field_state<'a>(&'a self, _selectors: &'a [&'a str]) -> BoxFuture<'a, Result<FieldState>> {
        Box::pin(async move { Ok(FieldState::Absent) })
    }

    fn fill_and_submit<'a>(
        &'a self,
        _selectors: &'a [&'a str],
        _value: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(false) })
    }

    fn control_visible<'a>(&'a self, _labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(false) })
    }

    fn click_control<'a>(&'a self, _labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(false) })
    }

    fn cookies(&self) -> BoxFuture<'_, Result<Vec<BrowserCookie>>> {
        Box::pin(async move { Ok(self.cookies.clone()) })
    }

    fn screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            common::fs::write_atomic(path, b"\x89PNG", false)
                .await
                .map_err(|e| Error::Io(e.to_string()))?;
            self.screenshots.lock().unwrap().push(path.to_path_buf());
            Ok(())
        })
    }

    fn network_events(&self) -> BoxFuture<'_, Result<NetworkEvents>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let events = self.events.lock().unwrap().take().unwrap_or_default();
            let delay = self.events_delay;
            if delay.is_zero() {
                for event in events {
                    let _ = tx.send(event);
                }
            } else {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for event in events {
                        let _ = tx.send(event);
                    }
                });
            }
            Ok(rx)
        })
    }
}
