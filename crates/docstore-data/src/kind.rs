//! Entity kinds. Each kind is an uninhabited marker type used as the owner
//! parameter of keys and data objects.

use docstore_types::DataKey;

use crate::object::DataObject;

/// A kind of persisted entity.
pub trait DataKind: Send + Sync + 'static {
    /// Short lowercase name used in logs and error messages.
    const NAME: &'static str;
}

/// The singleton, server-wide document.
#[derive(Debug)]
pub enum GeneralData {}

/// Per-player documents, keyed by player UUID.
#[derive(Debug)]
pub enum UserData {}

/// Per-world documents, keyed by world UUID.
#[derive(Debug)]
pub enum WorldData {}

impl DataKind for GeneralData {
    const NAME: &'static str = "general";
}

impl DataKind for UserData {
    const NAME: &'static str = "user";
}

impl DataKind for WorldData {
    const NAME: &'static str = "world";
}

pub type GeneralKey<R> = DataKey<R, GeneralData>;
pub type UserKey<R> = DataKey<R, UserData>;
pub type WorldKey<R> = DataKey<R, WorldData>;

pub type GeneralDataObject = DataObject<GeneralData>;
pub type UserDataObject = DataObject<UserData>;
pub type WorldDataObject = DataObject<WorldData>;
