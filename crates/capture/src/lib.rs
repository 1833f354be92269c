//! Traffic interception for a single discovery session
//!
//! Turns the browser's raw network notifications into per-route call records:
//!
//! 1. `CaptureFilter` decides which requests are the application's own API
//!    traffic (configured host, XHR/fetch, not telemetry or static files)
//! 2. `Interceptor` opens a `CapturedCall` per admitted request and attaches
//!    each response to the most recent open call on the same `RouteKey`
//! 3. `CaptureStore` accumulates calls append-only, per route, for the
//!    lifetime of the session; the endpoint synthesizer reads it afterwards
//!
//! The store is owned by one interceptor task and handed back on `finish()`.
//! Nothing here is process-global, so concurrent discovery runs against
//! different targets cannot see each other's traffic.

pub mod call;
pub mod error;
pub mod filter;
pub mod interceptor;
pub mod store;

pub use call::{CapturedCall, CapturedResponse, RouteKey, is_mutating_method};
pub use error::{Error, Result};
pub use filter::CaptureFilter;
pub use interceptor::{Interceptor, InterceptorHandle};
pub use store::{CSRF_HEADERS, CaptureStore};
