//! Mapping between [`Node`] trees and `serde_json` values.

use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::error::{TypeError, TypeResult};
use crate::node::Node;

/// A JSON object: the backend-neutral form documents are persisted as.
pub type JsonObject = serde_json::Map<String, Value>;

/// Convert a node tree to JSON.
///
/// Fails only for non-finite floats, which JSON cannot represent.
pub fn node_to_json(node: &Node) -> TypeResult<Value> {
    Ok(match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(*b),
        Node::Int(i) => Value::Number(Number::from(*i)),
        Node::Float(f) => Value::Number(
            Number::from_f64(*f).ok_or_else(|| TypeError::NonFiniteFloat(f.to_string()))?,
        ),
        Node::String(s) => Value::String(s.clone()),
        Node::List(items) => Value::Array(
            items
                .iter()
                .map(node_to_json)
                .collect::<TypeResult<Vec<_>>>()?,
        ),
        Node::Map(entries) => {
            let mut object = JsonObject::new();
            for (k, v) in entries {
                object.insert(k.clone(), node_to_json(v)?);
            }
            Value::Object(object)
        }
    })
}

/// Convert JSON to a node tree.
///
/// Integers that fit in `i64` become [`Node::Int`]; every other number
/// becomes [`Node::Float`].
pub fn node_from_json(value: &Value) -> Node {
    match value {
        Value::Null => Node::Null,
        Value::Bool(b) => Node::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Node::Int(i),
            None => Node::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Node::String(s.clone()),
        Value::Array(items) => Node::List(items.iter().map(node_from_json).collect()),
        Value::Object(object) => Node::Map(
            object
                .iter()
                .map(|(k, v)| (k.clone(), node_from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}
