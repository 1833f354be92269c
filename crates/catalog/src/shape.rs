//! Structural types inferred from JSON values

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Kind of a JSON scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    String,
    Integer,
    Number,
    Boolean,
}

impl Primitive {
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Integer => "integer",
            Primitive::Number => "number",
            Primitive::Boolean => "boolean",
        }
    }
}

/// The key/type structure of a JSON value with every concrete value dropped.
///
/// Objects keep keys in a sorted map, so key order in the source never
/// affects equality or serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Null,
    Primitive(Primitive),
    /// Element shape is taken from the first element; `[]` is `List(Null)`
    List(Box<Shape>),
    Object(BTreeMap<String, Shape>),
}

impl Shape {
    pub fn infer(value: &Value) -> Shape {
        match value {
            Value::Null => Shape::Null,
            Value::Bool(_) => Shape::Primitive(Primitive::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Shape::Primitive(Primitive::Integer),
            Value::Number(_) => Shape::Primitive(Primitive::Number),
            Value::String(_) => Shape::Primitive(Primitive::String),
            Value::Array(items) => Shape::List(Box::new(
                items.first().map(Shape::infer).unwrap_or(Shape::Null),
            )),
            Value::Object(map) => Shape::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Shape::infer(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Shape::List(_))
    }

    /// Field of an object shape.
    pub fn field(&self, key: &str) -> Option<&Shape> {
        match self {
            Shape::Object(fields) => fields.get(key),
            _ => None,
        }
    }
}

/// `"null"`, the primitive kind string, `[element]`, or `{key: shape}`.
impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Shape::Null => serializer.serialize_str("null"),
            Shape::Primitive(kind) => serializer.serialize_str(kind.as_str()),
            Shape::List(element) => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(element.as_ref())?;
                seq.end()
            }
            Shape::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}
