//! Cached storage services for docstore.
//!
//! A storage service is the façade feature code talks to. It combines a
//! repository (from `docstore-repo`) and a [`DataTranslator`] with an
//! in-process cache, and offers every read and write in two forms:
//!
//! - `async fn` — repository I/O runs on tokio's blocking pool
//! - `*_on_calling_thread` — the same logic inline, blocking the caller
//!
//! # Services
//!
//! - [`SingleCachedService`] — the singleton document
//! - [`KeyedService`] — documents addressed by UUID
//!
//! [`SingleStorage`] and [`KeyedStorage`] describe the same surface as
//! object-safe traits.
//!
//! # Cache Rules
//!
//! 1. `save` replaces the cache entry at call time, before the write lands,
//!    so a later `get` reads the saved document without a repository read.
//! 2. A save that fails leaves the entry marked unsaved; `ensure_saved`
//!    retries every unsaved entry.
//! 3. Concurrent `get`s of one uncached document share one repository read.
//! 4. Documents are values: callers receive clones and never share an
//!    instance with the cache.
//! 5. Not-found is `Ok(None)`. Repository and translation failures are
//!    returned with the operation and target that failed.
//!
//! [`DataTranslator`]: docstore_data::DataTranslator

mod cache;
pub mod error;
pub mod keyed;
pub mod single;
mod task;
#[cfg(test)]
mod testing;
pub mod traits;

pub use error::{ServiceError, ServiceResult, Target};
pub use keyed::{KeyedRepositoryRef, KeyedService};
pub use single::{SingleCachedService, SingleRepositoryRef};
pub use traits::{KeyedStorage, SingleStorage};
