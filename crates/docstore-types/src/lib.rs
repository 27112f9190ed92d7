//! Foundation types for docstore.
//!
//! This crate provides the structural vocabulary every other docstore crate
//! builds on: the node tree a document is made of, the paths that address
//! fields inside it, and the typed keys feature code uses to read and write
//! those fields.
//!
//! # Key Types
//!
//! - [`Node`] — One node of a schema-less document tree
//! - [`DataPath`] — Non-empty, ordered sequence of path segments
//! - [`NodeValue`] / [`NodeKey`] — Conversions between Rust values and nodes
//! - [`ValueShape`] — Runtime description of a value type (`list<string>`, ...)
//! - [`DataKey`] — Typed, path-addressed key, parameterized by value and owner
//!
//! # Design Rules
//!
//! 1. A key's value type and owning document kind are part of its static type.
//!    Using a user key against a world document does not compile.
//! 2. Conversions never panic. A node of the wrong shape is a [`TypeError`].
//! 3. `Null` is how a tree spells "absent"; it is never returned as a value.

pub mod error;
pub mod json;
pub mod key;
pub mod node;
pub mod path;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use json::{node_from_json, node_to_json, JsonObject};
pub use key::{DataKey, ListKey, MapKey};
pub use node::{Node, NodeKind};
pub use path::DataPath;
pub use value::{Json, NodeKey, NodeValue, ScalarKind, ValueShape};
