//! Network event consumer
//!
//! Consumes a session's `NetworkEvents` one at a time, in order. The LIFO
//! correlation in `CaptureStore::attach` is only correct because events from a
//! single page arrive in the order the browser saw them.

use browser::{NetworkEvent, NetworkEvents, RequestEvent, ResponseEvent};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::{CaptureFilter, CaptureStore, CapturedCall, CapturedResponse, Error, Result, RouteKey};

/// Filters and correlates network events into a `CaptureStore`.
#[derive(Debug)]
pub struct Interceptor {
    filter: CaptureFilter,
    store: CaptureStore,
}

impl Interceptor {
    pub fn new(filter: CaptureFilter) -> Self {
        Self {
            filter,
            store: CaptureStore::new(),
        }
    }

    /// Process a single event.
    ///
    /// Returns `Err(Error::CaptureGap)` when a response had no open request;
    /// the store has already counted it and nothing else changed.
    pub fn handle(&mut self, event: NetworkEvent) -> Result<()> {
        match event {
            NetworkEvent::Request(req) => {
                self.on_request(&req);
                Ok(())
            }
            NetworkEvent::Response(resp) => self.on_response(&resp),
        }
    }

    fn on_request(&mut self, req: &RequestEvent) {
        let Ok(url) = Url::parse(&req.url) else {
            return;
        };
        if !self.filter.admits(&url, req.resource) {
            return;
        }
        let Some(call) = CapturedCall::from_request(req, common::now_millis()) else {
            return;
        };
        tracing::debug!(method = %call.method, path = %call.path, "captured request");
        metrics::counter!("capture_calls_total").increment(1);
        self.store.open(call);
    }

    fn on_response(&mut self, resp: &ResponseEvent) -> Result<()> {
        // Responses to filtered-out requests were never opened; skip them
        // before they can register as gaps.
        let Ok(url) = Url::parse(&resp.url) else {
            return Ok(());
        };
        if !self.filter.admits(&url, resp.resource) {
            return Ok(());
        }
        let key = RouteKey::new(&resp.method, url.path());
        let result = self.store.attach(&key, CapturedResponse::from_event(resp));
        if let Err(Error::CaptureGap(route)) = &result {
            metrics::counter!("capture_gaps_total").increment(1);
            tracing::warn!(route = %route, status = resp.status, "response without open request, dropped");
        }
        result
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }

    pub fn into_store(self) -> CaptureStore {
        self.store
    }

    /// Run on a spawned task until the event stream ends or `finish()` is
    /// called on the returned handle.
    pub fn spawn(self, events: NetworkEvents) -> InterceptorHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(events, stop_rx));
        InterceptorHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self, mut events: NetworkEvents, mut stop: oneshot::Receiver<()>) -> CaptureStore {
        tracing::info!(host = %self.filter.host(), "traffic interceptor started");
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        let _ = self.handle(event);
                    }
                    None => break,
                },
                _ = &mut stop => {
                    while let Ok(event) = events.try_recv() {
                        let _ = self.handle(event);
                    }
                    break;
                }
            }
        }
        tracing::info!(
            calls = self.store.len(),
            routes = self.store.route_count(),
            gaps = self.store.gaps(),
            "traffic interceptor stopped"
        );
        self.store
    }
}

/// Handle to a running interceptor task.
#[derive(Debug)]
pub struct InterceptorHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<CaptureStore>,
}

impl InterceptorHandle {
    /// Stop the interceptor, drain events already delivered, and return the
    /// accumulated store.
    pub async fn finish(self) -> Result<CaptureStore> {
        // The task may already have exited because the stream closed.
        let _ = self.stop.send(());
        self.task.await.map_err(|e| Error::Task(e.to_string()))
    }
}
