//! Chrome DevTools Protocol backend for `BrowserSession`
//!
//! One launched browser, one page. Form interaction runs as small page
//! scripts; values are passed as JSON literals so quoting in passwords
//! cannot break out of the script.
//!
//! Network events are forwarded from the page's CDP event streams. JSON
//! responses from XHR/fetch calls are held until `Network.loadingFinished`
//! so their bodies can be read; every other response is forwarded as soon as
//! its headers arrive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use browser::network::normalize_headers;
use browser::{
    BoxFuture, BrowserCookie, BrowserSession, Error, FieldState, NetworkEvent, NetworkEvents,
    RequestEvent, ResourceKind, ResponseEvent, Result,
};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetRequestPostDataParams, GetResponseBodyParams, Headers, PostDataEntry, RequestId,
    ResourceType,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Launch options taken from the `[browser]` config section.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub navigation_timeout: Duration,
    pub viewport: (u32, u32),
}

impl From<&crate::config::BrowserConfig> for LaunchOptions {
    fn from(config: &crate::config::BrowserConfig) -> Self {
        Self {
            headless: config.headless,
            executable: config.executable.clone(),
            navigation_timeout: config.navigation_timeout(),
            viewport: (config.viewport_width, config.viewport_height),
        }
    }
}

/// A launched Chrome with a single page.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
}

fn protocol(e: impl std::fmt::Display) -> Error {
    Error::Protocol(e.to_string())
}

impl ChromeSession {
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let (width, height) = options.viewport;
        let mut builder = BrowserConfig::builder()
            .window_size(width, height)
            .request_timeout(options.navigation_timeout);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(Error::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Launch(e.to_string()))?;

        // The handler drives the CDP connection; the browser is unusable
        // once it stops.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "devtools handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(Error::Launch(format!("opening page: {e}")));
            }
        };

        info!(
            headless = options.headless,
            width,
            height,
            "chrome launched"
        );
        Ok(Self {
            browser,
            page,
            handler,
            navigation_timeout: options.navigation_timeout,
        })
    }

    /// Close the browser and stop the protocol handler.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "closing chrome failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| Error::Script(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| Error::Script(format!("unexpected script result: {e}")))
    }
}

/// Shared helpers prepended to every page script.
const PRELUDE: &str = r#"
const visible = (el) => !!el && !el.disabled && el.getClientRects().length > 0
    && getComputedStyle(el).visibility !== 'hidden';
const firstVisible = (selectors) => {
    for (const sel of selectors) {
        let found;
        try { found = document.querySelectorAll(sel); } catch (_) { continue; }
        for (const el of found) {
            if (visible(el)) return el;
        }
    }
    return null;
};
const CONTROLS = 'button, a, [role="button"], input[type="submit"], input[type="button"]';
const findControl = (labels) => {
    for (const el of document.querySelectorAll(CONTROLS)) {
        if (!visible(el)) continue;
        const text = (el.innerText || el.value || el.getAttribute('aria-label') || '')
            .trim().toLowerCase();
        if (labels.includes(text)) return el;
    }
    return null;
};
"#;

fn json_literal<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Script(e.to_string()))
}

fn field_state_script(selectors: &[&str]) -> Result<String> {
    Ok(format!(
        r#"(() => {{
{PRELUDE}
    const el = firstVisible({selectors});
    if (!el) return 'absent';
    return el.value ? 'filled' : 'empty';
}})()"#,
        selectors = json_literal(selectors)?
    ))
}

fn fill_script(selectors: &[&str], value: &str) -> Result<String> {
    Ok(format!(
        r#"(() => {{
{PRELUDE}
    let el = null;
    for (const sel of {selectors}) {{
        const candidate = firstVisible([sel]);
        if (candidate && !candidate.value) {{ el = candidate; break; }}
    }}
    if (!el) return false;
    el.focus();
    const setter = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
    if (setter && setter.set) {{ setter.set.call(el, {value}); }} else {{ el.value = {value}; }}
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    const form = el.form;
    if (form) {{
        const button = form.querySelector('button[type="submit"], input[type="submit"], button:not([type])');
        if (typeof form.requestSubmit === 'function') {{
            form.requestSubmit(button && visible(button) ? button : undefined);
        }} else if (button) {{
            button.click();
        }} else {{
            form.submit();
        }}
    }} else {{
        for (const type of ['keydown', 'keypress', 'keyup']) {{
            el.dispatchEvent(new KeyboardEvent(type, {{ key: 'Enter', code: 'Enter', keyCode: 13, bubbles: true }}));
        }}
    }}
    return true;
}})()"#,
        selectors = json_literal(selectors)?,
        value = json_literal(value)?
    ))
}

fn control_script(labels: &[&str], click: bool) -> Result<String> {
    let lowered: Vec<String> = labels.iter().map(|l| l.to_lowercase()).collect();
    Ok(format!(
        r#"(() => {{
{PRELUDE}
    const el = findControl({labels});
    if (!el) return false;
    if ({click}) el.click();
    return true;
}})()"#,
        labels = json_literal(&lowered)?
    ))
}

impl BrowserSession for ChromeSession {
    fn id(&self) -> &str {
        "chrome"
    }

    fn navigate<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            debug!(url, "navigating");
            match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(Error::Navigation(format!("{url}: {e}"))),
                Err(_) => Err(Error::Timeout(format!(
                    "navigation to {url} exceeded {}s",
                    self.navigation_timeout.as_secs()
                ))),
            }
        })
    }

    fn current_url(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let url = self.page.url().await.map_err(protocol)?;
            Ok(url.unwrap_or_else(|| "about:blank".to_string()))
        })
    }

    fn field_state<'a>(&'a self, selectors: &'a [&'a str]) -> BoxFuture<'a, Result<FieldState>> {
        Box::pin(async move {
            let state: String = self.eval(field_state_script(selectors)?).await?;
            Ok(match state.as_str() {
                "empty" => FieldState::Empty,
                "filled" => FieldState::Filled,
                _ => FieldState::Absent,
            })
        })
    }

    fn fill_and_submit<'a>(
        &'a self,
        selectors: &'a [&'a str],
        value: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.eval(fill_script(selectors, value)?).await })
    }

    fn control_visible<'a>(&'a self, labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.eval(control_script(labels, false)?).await })
    }

    fn click_control<'a>(&'a self, labels: &'a [&'a str]) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { self.eval(control_script(labels, true)?).await })
    }

    fn cookies(&self) -> BoxFuture<'_, Result<Vec<BrowserCookie>>> {
        Box::pin(async move {
            let cookies = self.page.get_cookies().await.map_err(protocol)?;
            Ok(cookies
                .into_iter()
                .map(|c| BrowserCookie {
                    name: c.name,
                    value: c.value,
                    domain: c.domain,
                    path: c.path,
                })
                .collect())
        })
    }

    fn screenshot<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let png = self
                .page
                .screenshot(ScreenshotParams::builder().full_page(true).build())
                .await
                .map_err(protocol)?;
            common::fs::write_atomic(path, &png, false)
                .await
                .map_err(|e| Error::Io(format!("writing screenshot {}: {e}", path.display())))?;
            info!(path = %path.display(), bytes = png.len(), "screenshot saved");
            Ok(())
        })
    }

    fn network_events(&self) -> BoxFuture<'_, Result<NetworkEvents>> {
        Box::pin(async move {
            let requests = self
                .page
                .event_listener::<EventRequestWillBeSent>()
                .await
                .map_err(protocol)?;
            let responses = self
                .page
                .event_listener::<EventResponseReceived>()
                .await
                .map_err(protocol)?;
            let finished = self
                .page
                .event_listener::<EventLoadingFinished>()
                .await
                .map_err(protocol)?;
            let failed = self
                .page
                .event_listener::<EventLoadingFailed>()
                .await
                .map_err(protocol)?;

            let (tx, rx) = mpsc::unbounded_channel();
            let forwarder = Forwarder {
                page: self.page.clone(),
                tx,
                methods: HashMap::new(),
                pending: HashMap::new(),
            };
            tokio::spawn(forwarder.run(requests, responses, finished, failed));
            Ok(rx)
        })
    }
}

fn resource_kind(kind: &ResourceType) -> ResourceKind {
    match kind {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::EventSource => ResourceKind::EventSource,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        _ => ResourceKind::Other,
    }
}

fn header_map(headers: &Headers) -> std::collections::BTreeMap<String, String> {
    let Some(object) = headers.inner().as_object() else {
        return Default::default();
    };
    normalize_headers(
        object
            .iter()
            .filter_map(|(name, value)| value.as_str().map(|v| (name, v.to_string()))),
    )
}

/// Join base64 post data entries into one UTF-8 body.
///
/// `None` when there are no entries, one fails to decode, or the result is
/// not text; the caller then asks the browser for the body directly.
fn inline_post_data(entries: &[PostDataEntry]) -> Option<String> {
    let mut bytes = Vec::new();
    for entry in entries {
        let Some(chunk) = &entry.bytes else {
            continue;
        };
        let encoded: &str = chunk.as_ref();
        bytes.extend(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .ok()?,
        );
    }
    if bytes.is_empty() {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Turns CDP events into `NetworkEvent`s for one page.
struct Forwarder {
    page: Page,
    tx: mpsc::UnboundedSender<NetworkEvent>,
    /// Request method by request id; CDP responses do not repeat it
    methods: HashMap<String, String>,
    /// JSON API responses waiting for their body
    pending: HashMap<String, ResponseEvent>,
}

impl Forwarder {
    async fn run<R, S, F, X>(mut self, mut requests: R, mut responses: S, mut finished: F, mut failed: X)
    where
        R: futures_util::Stream<Item = std::sync::Arc<EventRequestWillBeSent>> + Unpin,
        S: futures_util::Stream<Item = std::sync::Arc<EventResponseReceived>> + Unpin,
        F: futures_util::Stream<Item = std::sync::Arc<EventLoadingFinished>> + Unpin,
        X: futures_util::Stream<Item = std::sync::Arc<EventLoadingFailed>> + Unpin,
    {
        loop {
            let delivered = tokio::select! {
                biased;
                Some(event) = requests.next() => self.on_request(&event).await,
                Some(event) = responses.next() => self.on_response(&event),
                Some(event) = finished.next() => self.on_finished(&event).await,
                Some(event) = failed.next() => {
                    let id = event.request_id.inner().clone();
                    self.methods.remove(&id);
                    self.pending.remove(&id);
                    true
                }
                else => break,
            };
            if !delivered {
                break;
            }
        }
        debug!("network forwarding stopped");
    }

    fn send(&self, event: NetworkEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    async fn on_request(&mut self, event: &EventRequestWillBeSent) -> bool {
        let id = event.request_id.inner().clone();
        let request = &event.request;
        self.methods.insert(id.clone(), request.method.clone());
        let post_data = if request.has_post_data == Some(true) {
            match request.post_data_entries.as_deref().and_then(inline_post_data) {
                Some(data) => Some(data),
                None => self.post_data(&id).await,
            }
        } else {
            None
        };
        self.send(NetworkEvent::Request(RequestEvent {
            url: request.url.clone(),
            method: request.method.clone(),
            headers: header_map(&request.headers),
            post_data,
            resource: event
                .r#type
                .as_ref()
                .map(resource_kind)
                .unwrap_or(ResourceKind::Other),
        }))
    }

    /// Body for requests whose entries were not inlined in the event.
    async fn post_data(&self, id: &str) -> Option<String> {
        let params = GetRequestPostDataParams::new(RequestId::new(id.to_string()));
        match self.page.execute(params).await {
            Ok(reply) => Some(reply.result.post_data.clone()),
            Err(e) => {
                debug!(request_id = id, error = %e, "request body unavailable");
                None
            }
        }
    }

    fn on_response(&mut self, event: &EventResponseReceived) -> bool {
        let id = event.request_id.inner().clone();
        let resource = resource_kind(&event.r#type);
        let response = &event.response;
        let content_type = (!response.mime_type.is_empty()).then(|| response.mime_type.clone());
        let method = match self.methods.get(&id) {
            Some(method) => method.clone(),
            None => "GET".to_string(),
        };
        let forwarded = ResponseEvent {
            url: response.url.clone(),
            method,
            status: u16::try_from(response.status).unwrap_or_default(),
            headers: header_map(&response.headers),
            content_type,
            body: None,
            resource,
        };

        let wants_body = resource.is_api_call()
            && forwarded
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.contains("json"));
        if wants_body {
            self.pending.insert(id, forwarded);
            return true;
        }
        self.methods.remove(&id);
        self.send(NetworkEvent::Response(forwarded))
    }

    async fn on_finished(&mut self, event: &EventLoadingFinished) -> bool {
        let id = event.request_id.inner().clone();
        self.methods.remove(&id);
        let Some(mut response) = self.pending.remove(&id) else {
            return true;
        };
        response.body = self.body(&id).await;
        self.send(NetworkEvent::Response(response))
    }

    async fn body(&self, id: &str) -> Option<String> {
        let params = GetResponseBodyParams::new(RequestId::new(id.to_string()));
        match self.page.execute(params).await {
            Ok(reply) if reply.result.base64_encoded => base64::engine::general_purpose::STANDARD
                .decode(&reply.result.body)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
            Ok(reply) => Some(reply.result.body.clone()),
            Err(e) => {
                debug!(request_id = id, error = %e, "response body unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_types_map_onto_browser_kinds() {
        assert_eq!(resource_kind(&ResourceType::Xhr), ResourceKind::Xhr);
        assert_eq!(resource_kind(&ResourceType::Fetch), ResourceKind::Fetch);
        assert_eq!(resource_kind(&ResourceType::Document), ResourceKind::Document);
        assert_eq!(resource_kind(&ResourceType::Ping), ResourceKind::Other);
    }

    #[test]
    fn header_map_lowercases_and_skips_non_strings() {
        let headers = Headers::new(serde_json::json!({
            "Content-Type": "application/json",
            "X-CSRF-Token": "abc",
            "X-Weird": 5
        }));
        let map = header_map(&headers);
        assert_eq!(map.get("content-type").unwrap(), "application/json");
        assert_eq!(map.get("x-csrf-token").unwrap(), "abc");
        assert!(!map.contains_key("x-weird"));
    }

    fn entry(bytes: &str) -> PostDataEntry {
        serde_json::from_value(serde_json::json!({ "bytes": bytes })).unwrap()
    }

    #[test]
    fn post_data_entries_are_decoded_and_joined() {
        let b64 = |s: &str| base64::engine::general_purpose::STANDARD.encode(s);
        let entries = vec![entry(&b64(r#"{"name":"#)), entry(&b64(r#""widget"}"#))];
        assert_eq!(
            inline_post_data(&entries).as_deref(),
            Some(r#"{"name":"widget"}"#)
        );
    }

    #[test]
    fn missing_or_undecodable_entries_defer_to_the_browser() {
        assert_eq!(inline_post_data(&[]), None);
        assert_eq!(inline_post_data(&[PostDataEntry::default()]), None);
        assert_eq!(inline_post_data(&[entry("not base64!")]), None);
        let binary = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe]);
        assert_eq!(inline_post_data(&[entry(&binary)]), None);
    }

    #[test]
    fn fill_script_embeds_values_as_json_literals() {
        let script = fill_script(&["input[name='email']"], "o'brien\"; alert(1); //").unwrap();
        assert!(script.contains(r#""o'brien\"; alert(1); //""#));
        assert!(script.contains(r#"["input[name='email']"]"#));
    }

    #[test]
    fn control_script_lowercases_labels_and_only_clicks_when_asked() {
        let probe = control_script(&["Continue", "Accept"], false).unwrap();
        assert!(probe.contains(r#"["continue","accept"]"#));
        assert!(probe.contains("if (false) el.click();"));

        let click = control_script(&["Continue"], true).unwrap();
        assert!(click.contains("if (true) el.click();"));
    }

    #[test]
    fn launch_options_follow_browser_config() {
        let config = crate::config::BrowserConfig::default();
        let options = LaunchOptions::from(&config);
        assert!(options.headless);
        assert_eq!(options.viewport, (1280, 800));
        assert_eq!(options.navigation_timeout, Duration::from_secs(30));
    }
}
