//! Catalog synthesis from a finished capture store

use std::collections::BTreeMap;
use std::path::Path;

use capture::{CaptureStore, CapturedCall, is_mutating_method};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::naming::tool_name;
use crate::shape::Shape;
use crate::template::path_template;
use crate::{Error, Result};

/// Top-level fields that conventionally hold a page of results.
const PAGINATION_KEYS: &[&str] = &[
    "items", "data", "results", "records", "entries", "value", "nodes", "edges", "content",
    "rows", "hits", "elements", "list",
];

/// One callable endpoint, synthesized from every successful sample sharing its
/// (method, path template).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub method: String,
    /// Raw path of the first contributing sample
    pub path: String,
    pub path_template: String,
    pub query_params: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body_shape: Option<Shape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body_shape: Option<Shape>,
    pub response_status: u16,
    pub is_list_endpoint: bool,
    pub is_mutation: bool,
    pub sample_count: usize,
    pub tool_name: String,
}

/// The `catalog.json` artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Epoch milliseconds
    pub discovered_at: u64,
    pub endpoints: Vec<EndpointDescriptor>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn find(&self, method: &str, template: &str) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|e| e.method.eq_ignore_ascii_case(method) && e.path_template == template)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialize(e.to_string()))
    }

    /// Write the artifact atomically.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        common::fs::write_atomic(path, json.as_bytes(), false)
            .await
            .map_err(|e| Error::Io(format!("writing catalog file {}: {e}", path.display())))?;
        info!(path = %path.display(), endpoints = self.len(), "wrote catalog");
        Ok(())
    }
}

fn is_list_body(body: &Value) -> bool {
    match body {
        Value::Array(_) => true,
        Value::Object(map) => PAGINATION_KEYS
            .iter()
            .any(|k| map.get(*k).is_some_and(Value::is_array)),
        _ => false,
    }
}

fn describe(method: &str, template: &str, samples: &[&CapturedCall]) -> Option<EndpointDescriptor> {
    let first = samples.first()?;
    let response_status = first.response()?.status;

    let mut query_params: Vec<String> = Vec::new();
    for sample in samples {
        for name in &sample.query_params {
            if !query_params.contains(name) {
                query_params.push(name.clone());
            }
        }
    }

    let is_mutation = is_mutating_method(method);
    let request_body_shape = if is_mutation {
        samples
            .iter()
            .find_map(|s| s.request_body.as_ref())
            .map(Shape::infer)
    } else {
        None
    };

    let response_body = samples
        .iter()
        .find_map(|s| s.response().and_then(|r| r.body.as_ref()));

    Some(EndpointDescriptor {
        method: method.to_string(),
        path: first.path.clone(),
        path_template: template.to_string(),
        query_params,
        request_body_shape,
        response_body_shape: response_body.map(Shape::infer),
        response_status,
        is_list_endpoint: response_body.is_some_and(is_list_body),
        is_mutation,
        sample_count: samples.len(),
        tool_name: tool_name(method, template),
    })
}

/// Build the catalog from every successful call in `store`.
///
/// Samples within a group are ordered by capture time, so "first" means first
/// observed regardless of which raw path it hit. Descriptors come out sorted
/// by (path template, method).
pub fn synthesize(store: &CaptureStore) -> Catalog {
    let mut groups: BTreeMap<(String, String), Vec<&CapturedCall>> = BTreeMap::new();
    let mut dropped = 0usize;

    for call in store.calls() {
        if !call.is_successful() {
            dropped += 1;
            continue;
        }
        let template = path_template(&call.path);
        groups
            .entry((template, call.method.clone()))
            .or_default()
            .push(call);
    }

    let endpoints: Vec<EndpointDescriptor> = groups
        .into_iter()
        .filter_map(|((template, method), mut samples)| {
            samples.sort_by_key(|c| c.observed_order());
            let descriptor = describe(&method, &template, &samples)?;
            debug!(
                method = %descriptor.method,
                template = %descriptor.path_template,
                samples = descriptor.sample_count,
                tool = %descriptor.tool_name,
                "synthesized endpoint"
            );
            Some(descriptor)
        })
        .collect();

    info!(
        endpoints = endpoints.len(),
        calls = store.len(),
        dropped,
        "catalog synthesized"
    );

    Catalog {
        discovered_at: common::now_millis(),
        endpoints,
    }
}
