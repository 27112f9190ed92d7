//! Storage manager for docstore.
//!
//! [`StorageManager`] is the composition root. It binds the three storage
//! services (general, user, world) to one set of repositories and hands them
//! out to feature code. Construct it once and pass it to whatever needs
//! storage.
//!
//! # Repository selection
//!
//! - [`StorageConfig`] selects a backend (`flat-file` or `memory`)
//! - An explicit [`Repositories`] bundle overrides the config
//! - With nothing configured, flat files under `data_dir` are used
//!
//! [`StorageManager::reconfigure`] flushes unsaved documents to the old
//! repositories, shuts them down, installs the new ones and clears every
//! cache, so no service keeps serving documents read from the old backend.

pub mod config;
pub mod error;
pub mod manager;

pub use config::{BackendKind, StorageConfig};
pub use error::{ManagerError, ManagerResult};
pub use manager::{
    GeneralService, GeneralTranslator, Repositories, StorageManager, UserService,
    UserTranslator, WorldService, WorldTranslator,
};
