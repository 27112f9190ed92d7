use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

/// Backend-agnostic selector for bulk retrieval from a [`KeyedRepository`].
///
/// Each repository decides how to execute a query: the flat-file backend
/// walks its directory for [`DataQuery::All`] and probes individual files
/// for [`DataQuery::Keys`].
///
/// [`KeyedRepository`]: crate::traits::KeyedRepository
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DataQuery {
    /// Every stored record.
    #[default]
    All,
    /// Exactly these ids. Ids with no record are omitted from results.
    Keys(BTreeSet<Uuid>),
}

impl DataQuery {
    pub fn all() -> Self {
        Self::All
    }

    pub fn keys(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self::Keys(ids.into_iter().collect())
    }

    pub fn key(id: Uuid) -> Self {
        Self::keys([id])
    }

    /// `true` if the query names explicit ids rather than scanning.
    pub fn restricted_to_keys(&self) -> bool {
        matches!(self, Self::Keys(_))
    }

    /// The explicit ids, if the query is restricted to keys.
    pub fn key_set(&self) -> Option<&BTreeSet<Uuid>> {
        match self {
            Self::All => None,
            Self::Keys(ids) => Some(ids),
        }
    }

    pub fn matches(&self, id: &Uuid) -> bool {
        match self {
            Self::All => true,
            Self::Keys(ids) => ids.contains(id),
        }
    }
}

impl fmt::Display for DataQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Keys(ids) => write!(f, "{} key(s)", ids.len()),
        }
    }
}
