//! Conversions between Rust values and document nodes.
//!
//! [`NodeValue`] is implemented for the scalar types feature code stores
//! (booleans, integers, floats, strings, UUIDs), for `Vec<T>` and
//! `BTreeMap<K, V>` over those, and for [`Node`] itself. Anything that
//! implements serde's traits can be stored through the [`Json`] wrapper.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{TypeError, TypeResult};
use crate::json::{node_from_json, node_to_json};
use crate::node::Node;

/// Scalar value types. Map keys are always one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    String,
    Uuid,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Uuid => "uuid",
        };
        f.write_str(name)
    }
}

/// Runtime description of the type a key stores.
///
/// List and map shapes are composed from their element shapes, so a
/// `BTreeMap<String, Vec<i64>>` describes itself as `map<string, list<int>>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueShape {
    /// Any node; used for raw [`Node`] access.
    Any,
    Scalar(ScalarKind),
    List(Box<ValueShape>),
    Map {
        key: ScalarKind,
        value: Box<ValueShape>,
    },
    /// A structured value with a fixed field layout, named by its Rust type.
    Object(&'static str),
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Map { key, value } => write!(f, "map<{key}, {value}>"),
            Self::Object(name) => f.write_str(name),
        }
    }
}

/// A Rust type that can be stored in and read back from a document node.
pub trait NodeValue: Clone + Sized {
    /// Describe this type.
    fn shape() -> ValueShape;

    /// Convert to a node. Fails if the value has no node representation.
    fn to_node(&self) -> TypeResult<Node>;

    /// Convert from a node. Fails if the node has the wrong shape.
    ///
    /// Never called with [`Node::Null`]; absent values are handled by callers.
    fn from_node(node: &Node) -> TypeResult<Self>;
}

/// A scalar type usable as a map key. Document maps are string-keyed, so keys
/// round-trip through their string form.
pub trait NodeKey: Clone + Ord + Sized {
    fn key_kind() -> ScalarKind;

    fn to_key(&self) -> String;

    fn from_key(key: &str) -> TypeResult<Self>;
}

impl NodeValue for Node {
    fn shape() -> ValueShape {
        ValueShape::Any
    }

    fn to_node(&self) -> TypeResult<Node> {
        Ok(self.clone())
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        Ok(node.clone())
    }
}

impl NodeValue for bool {
    fn shape() -> ValueShape {
        ValueShape::Scalar(ScalarKind::Bool)
    }

    fn to_node(&self) -> TypeResult<Node> {
        Ok(Node::Bool(*self))
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        match node {
            Node::Bool(b) => Ok(*b),
            other => Err(TypeError::mismatch(Self::shape(), other.kind())),
        }
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {$(
        impl NodeValue for $ty {
            fn shape() -> ValueShape {
                ValueShape::Scalar(ScalarKind::Int)
            }

            fn to_node(&self) -> TypeResult<Node> {
                i64::try_from(*self)
                    .map(Node::Int)
                    .map_err(|_| TypeError::OutOfRange {
                        value: self.to_string(),
                        target: "i64",
                    })
            }

            fn from_node(node: &Node) -> TypeResult<Self> {
                match node {
                    Node::Int(v) => <$ty>::try_from(*v).map_err(|_| TypeError::OutOfRange {
                        value: v.to_string(),
                        target: stringify!($ty),
                    }),
                    other => Err(TypeError::mismatch(Self::shape(), other.kind())),
                }
            }
        }

        impl NodeKey for $ty {
            fn key_kind() -> ScalarKind {
                ScalarKind::Int
            }

            fn to_key(&self) -> String {
                self.to_string()
            }

            fn from_key(key: &str) -> TypeResult<Self> {
                key.parse().map_err(|_| TypeError::InvalidKey {
                    key: key.to_string(),
                    expected: stringify!($ty),
                })
            }
        }
    )*};
}

int_value!(i64, i32, u32, u64);

impl NodeValue for f64 {
    fn shape() -> ValueShape {
        ValueShape::Scalar(ScalarKind::Float)
    }

    /// NaN and the infinities are rejected: a document holding one could
    /// never be persisted.
    fn to_node(&self) -> TypeResult<Node> {
        if !self.is_finite() {
            return Err(TypeError::NonFiniteFloat(self.to_string()));
        }
        Ok(Node::Float(*self))
    }

    /// Integer nodes are accepted: JSON does not distinguish `64` from `64.0`
    /// once a hand-edited file has been re-read.
    fn from_node(node: &Node) -> TypeResult<Self> {
        match node {
            Node::Float(v) => Ok(*v),
            Node::Int(v) => Ok(*v as f64),
            other => Err(TypeError::mismatch(Self::shape(), other.kind())),
        }
    }
}

impl NodeValue for String {
    fn shape() -> ValueShape {
        ValueShape::Scalar(ScalarKind::String)
    }

    fn to_node(&self) -> TypeResult<Node> {
        Ok(Node::String(self.clone()))
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        match node {
            Node::String(s) => Ok(s.clone()),
            other => Err(TypeError::mismatch(Self::shape(), other.kind())),
        }
    }
}

impl NodeKey for String {
    fn key_kind() -> ScalarKind {
        ScalarKind::String
    }

    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(key: &str) -> TypeResult<Self> {
        Ok(key.to_string())
    }
}

impl NodeValue for Uuid {
    fn shape() -> ValueShape {
        ValueShape::Scalar(ScalarKind::Uuid)
    }

    fn to_node(&self) -> TypeResult<Node> {
        Ok(Node::String(self.to_string()))
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        match node {
            Node::String(s) => Uuid::parse_str(s).map_err(|_| TypeError::InvalidKey {
                key: s.clone(),
                expected: "uuid",
            }),
            other => Err(TypeError::mismatch(Self::shape(), other.kind())),
        }
    }
}

impl NodeKey for Uuid {
    fn key_kind() -> ScalarKind {
        ScalarKind::Uuid
    }

    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(key: &str) -> TypeResult<Self> {
        Uuid::parse_str(key).map_err(|_| TypeError::InvalidKey {
            key: key.to_string(),
            expected: "uuid",
        })
    }
}

impl<T: NodeValue> NodeValue for Vec<T> {
    fn shape() -> ValueShape {
        ValueShape::List(Box::new(T::shape()))
    }

    fn to_node(&self) -> TypeResult<Node> {
        self.iter()
            .map(NodeValue::to_node)
            .collect::<TypeResult<Vec<_>>>()
            .map(Node::List)
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        match node {
            Node::List(items) => items.iter().map(T::from_node).collect(),
            other => Err(TypeError::mismatch(Self::shape(), other.kind())),
        }
    }
}

impl<K: NodeKey, V: NodeValue> NodeValue for BTreeMap<K, V> {
    fn shape() -> ValueShape {
        ValueShape::Map {
            key: K::key_kind(),
            value: Box::new(V::shape()),
        }
    }

    fn to_node(&self) -> TypeResult<Node> {
        let mut map = BTreeMap::new();
        for (k, v) in self {
            map.insert(k.to_key(), v.to_node()?);
        }
        Ok(Node::Map(map))
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        match node {
            Node::Map(entries) => entries
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| Ok((K::from_key(k)?, V::from_node(v)?)))
                .collect(),
            other => Err(TypeError::mismatch(Self::shape(), other.kind())),
        }
    }
}

/// Stores any serde-compatible value as a structured node.
///
/// ```
/// use docstore_types::{Json, NodeValue};
///
/// #[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// struct Home { x: i64, z: i64 }
///
/// let node = Json(Home { x: 1, z: 2 }).to_node().unwrap();
/// assert_eq!(Json::<Home>::from_node(&node).unwrap().0, Home { x: 1, z: 2 });
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Json<T>(pub T);

impl<T> NodeValue for Json<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    fn shape() -> ValueShape {
        ValueShape::Object(std::any::type_name::<T>())
    }

    fn to_node(&self) -> TypeResult<Node> {
        let value =
            serde_json::to_value(&self.0).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Ok(node_from_json(&value))
    }

    fn from_node(node: &Node) -> TypeResult<Self> {
        let value = node_to_json(node)?;
        serde_json::from_value(value)
            .map(Json)
            .map_err(|e| TypeError::Serialization(e.to_string()))
    }
}
