//! Keyed data objects for docstore.
//!
//! A [`DataObject`] is the typed front-end over one [`Document`]. Feature code
//! declares [`DataKey`](docstore_types::DataKey)s for the fields it owns and
//! reads or writes them through the object; the object never interprets what
//! a path means beyond walking it.
//!
//! # Modules
//!
//! - [`document`] — The mutable node tree and path walking
//! - [`kind`] — Entity kinds (`general`, `user`, `world`) and key aliases
//! - [`object`] — [`DataObject`]: `has`/`get`/`set`/`remove` by typed key
//! - [`handle`] — [`ValueHandle`]: scoped read-modify-write of one key
//! - [`translator`] — [`DataTranslator`] and the JSON implementation
//!
//! # Value handle policy
//!
//! A handle writes its final value back on every exit path, including early
//! returns through `?` and unwinding. Whatever was set before the error is
//! kept. Call [`ValueHandle::discard`] to leave the document untouched.

pub mod document;
pub mod error;
pub mod handle;
pub mod kind;
pub mod object;
pub mod translator;

pub use document::Document;
pub use error::{DataError, DataResult};
pub use handle::ValueHandle;
pub use kind::{
    DataKind, GeneralData, GeneralDataObject, GeneralKey, UserData, UserDataObject, UserKey,
    WorldData, WorldDataObject, WorldKey,
};
pub use object::DataObject;
pub use translator::{DataTranslator, JsonTranslator};
