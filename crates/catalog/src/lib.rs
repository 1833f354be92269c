//! Endpoint catalog synthesis
//!
//! Runs once over a finished `CaptureStore` and produces one
//! `EndpointDescriptor` per distinct (method, path template):
//!
//! 1. Drop calls without a response or with a status outside 2xx/3xx
//! 2. Collapse dynamic path segments to `{id}` (`template`)
//! 3. Group by (method, template); union query names, infer body `Shape`s
//! 4. Classify list/mutation endpoints and derive a tool name (`naming`)
//!
//! The catalog is written as `catalog.json` for downstream consumers.

pub mod error;
pub mod naming;
pub mod shape;
pub mod synthesize;
pub mod template;

/// File name of the catalog artifact inside the output directory.
pub const CATALOG_ARTIFACT: &str = "catalog.json";

pub use error::{Error, Result};
pub use naming::tool_name;
pub use shape::{Primitive, Shape};
pub use synthesize::{Catalog, EndpointDescriptor, synthesize};
pub use template::path_template;
