//! One JSON file per document.
//!
//! On-disk layout under a data directory:
//!
//! ```text
//! <root>/general.json
//! <root>/userdata/<first two chars of uuid>/<uuid>.json
//! <root>/worlddata/<first two chars of uuid>/<uuid>.json
//! ```
//!
//! Every write goes to a temporary file in the target directory, is synced,
//! then renamed over the target.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use docstore_types::JsonObject;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{RepositoryError, RepositoryResult};
use crate::query::DataQuery;
use crate::traits::{KeyedRepository, SingleRepository};

/// File name of the global document, relative to the data root.
pub const GENERAL_FILE: &str = "general.json";
/// Directory holding per-user documents, relative to the data root.
pub const USER_DATA_DIRECTORY: &str = "userdata";
/// Directory holding per-world documents, relative to the data root.
pub const WORLD_DATA_DIRECTORY: &str = "worlddata";

const EXTENSION: &str = "json";
const SHARD_LEN: usize = 2;

/// Builds the flat-file repositories for one data directory.
#[derive(Clone, Debug)]
pub struct FlatFileLayout {
    root: PathBuf,
    pretty: bool,
}

impl FlatFileLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pretty: true,
        }
    }

    /// Write indented JSON (`true`, the default) or compact JSON.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn general(&self) -> FlatFileSingleRepository {
        FlatFileSingleRepository::new(self.root.join(GENERAL_FILE)).pretty(self.pretty)
    }

    pub fn users(&self) -> FlatFileKeyedRepository {
        FlatFileKeyedRepository::new(self.root.join(USER_DATA_DIRECTORY)).pretty(self.pretty)
    }

    pub fn worlds(&self) -> FlatFileKeyedRepository {
        FlatFileKeyedRepository::new(self.root.join(WORLD_DATA_DIRECTORY)).pretty(self.pretty)
    }
}

/// Stores the singleton document in one JSON file.
#[derive(Debug)]
pub struct FlatFileSingleRepository {
    path: PathBuf,
    pretty: bool,
    shut_down: AtomicBool,
}

impl FlatFileSingleRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SingleRepository<JsonObject> for FlatFileSingleRepository {
    fn get(&self) -> RepositoryResult<Option<JsonObject>> {
        ensure_open(&self.shut_down)?;
        read_object(&self.path)
    }

    fn save(&self, value: &JsonObject) -> RepositoryResult<()> {
        ensure_open(&self.shut_down)?;
        write_object(&self.path, value, self.pretty)
    }

    fn shutdown(&self) -> RepositoryResult<()> {
        self.shut_down.store(true, Ordering::Release);
        info!(path = %self.path.display(), "flat-file repository shut down");
        Ok(())
    }
}

/// Stores one JSON file per id, sharded by the first two characters of the
/// id.
#[derive(Debug)]
pub struct FlatFileKeyedRepository {
    root: PathBuf,
    pretty: bool,
    shut_down: AtomicBool,
}

impl FlatFileKeyedRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pretty: true,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `id`'s record.
    pub fn record_path(&self, id: Uuid) -> PathBuf {
        let name = id.to_string();
        self.root
            .join(&name[..SHARD_LEN])
            .join(format!("{name}.{EXTENSION}"))
    }

    /// Ids of every record file under the root, in no particular order.
    ///
    /// Files whose name is not `<uuid>.json` are ignored.
    fn scan(&self) -> RepositoryResult<Vec<(Uuid, PathBuf)>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                RepositoryError::io(path, io::Error::from(e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok())
            else {
                debug!(path = %path.display(), "ignoring non-record file");
                continue;
            };
            found.push((id, path.to_path_buf()));
        }
        Ok(found)
    }
}

impl KeyedRepository<JsonObject> for FlatFileKeyedRepository {
    fn get(&self, id: Uuid) -> RepositoryResult<Option<JsonObject>> {
        ensure_open(&self.shut_down)?;
        read_object(&self.record_path(id))
    }

    fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
        ensure_open(&self.shut_down)?;
        let path = self.record_path(id);
        path.try_exists().map_err(|e| RepositoryError::io(path, e))
    }

    fn get_all(&self, query: &DataQuery) -> RepositoryResult<BTreeMap<Uuid, JsonObject>> {
        ensure_open(&self.shut_down)?;
        let mut records = BTreeMap::new();
        match query.key_set() {
            Some(ids) => {
                for id in ids {
                    if let Some(record) = read_object(&self.record_path(*id))? {
                        records.insert(*id, record);
                    }
                }
            }
            None => {
                for (id, path) in self.scan()? {
                    match read_object(&path) {
                        Ok(Some(record)) => {
                            records.insert(id, record);
                        }
                        Ok(None) => {}
                        Err(RepositoryError::Corrupt { location, reason }) => {
                            warn!(%location, %reason, "skipping corrupt record");
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        debug!(root = %self.root.display(), %query, found = records.len(), "flat-file query");
        Ok(records)
    }

    fn count(&self, query: &DataQuery) -> RepositoryResult<usize> {
        ensure_open(&self.shut_down)?;
        match query.key_set() {
            Some(ids) => {
                let mut count = 0;
                for id in ids {
                    if self.exists(*id)? {
                        count += 1;
                    }
                }
                Ok(count)
            }
            // Corrupt records are skipped here too, so the count matches get_all.
            None => Ok(self.get_all(query)?.len()),
        }
    }

    fn save(&self, id: Uuid, value: &JsonObject) -> RepositoryResult<()> {
        ensure_open(&self.shut_down)?;
        write_object(&self.record_path(id), value, self.pretty)
    }

    fn delete(&self, id: Uuid) -> RepositoryResult<bool> {
        ensure_open(&self.shut_down)?;
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted record");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RepositoryError::io(path, e)),
        }
    }

    fn shutdown(&self) -> RepositoryResult<()> {
        self.shut_down.store(true, Ordering::Release);
        info!(root = %self.root.display(), "flat-file repository shut down");
        Ok(())
    }
}

fn ensure_open(shut_down: &AtomicBool) -> RepositoryResult<()> {
    if shut_down.load(Ordering::Acquire) {
        return Err(RepositoryError::Shutdown);
    }
    Ok(())
}

/// Read and decode one record file. A missing file is `Ok(None)`.
fn read_object(path: &Path) -> RepositoryResult<Option<JsonObject>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RepositoryError::io(path, e)),
    };
    let corrupt = |reason: String| RepositoryError::Corrupt {
        location: path.display().to_string(),
        reason,
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(object)) => {
            debug!(path = %path.display(), bytes = bytes.len(), "read record");
            Ok(Some(object))
        }
        Ok(_) => Err(corrupt("top-level value is not a JSON object".into())),
        Err(e) => Err(corrupt(e.to_string())),
    }
}

/// Atomically replace `path` with the encoded record.
fn write_object(path: &Path, object: &JsonObject, pretty: bool) -> RepositoryResult<()> {
    let encoded = if pretty {
        serde_json::to_vec_pretty(object)
    } else {
        serde_json::to_vec(object)
    }
    .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| RepositoryError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| RepositoryError::io(dir, e))?;
    tmp.write_all(&encoded)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| RepositoryError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| RepositoryError::io(path, e.error))?;

    debug!(path = %path.display(), bytes = encoded.len(), "wrote record");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    // ---- Test 1: Layout places files where the data directory expects them ----

    #[test]
    fn layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FlatFileLayout::new(dir.path());
        assert_eq!(layout.general().path(), dir.path().join("general.json"));

        let id = Uuid::parse_str("ab12cd34-0000-4000-8000-000000000000").unwrap();
        let users = layout.users();
        assert_eq!(
            users.record_path(id),
            dir.path()
                .join("userdata")
                .join("ab")
                .join("ab12cd34-0000-4000-8000-000000000000.json")
        );
        assert!(layout
            .worlds()
            .record_path(id)
            .starts_with(dir.path().join("worlddata")));
    }

    // ---- Test 2: Single repository round trip ----

    #[test]
    fn single_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).general();

        assert_eq!(repo.get().unwrap(), None);
        let record = object(json!({ "spawn": { "world": "world", "y": 64 } }));
        repo.save(&record).unwrap();
        assert_eq!(repo.get().unwrap(), Some(record));
        assert!(repo.path().is_file());
    }

    // ---- Test 3: Keyed save, exists, delete ----

    #[test]
    fn keyed_save_exists_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).users();
        let id = Uuid::new_v4();

        assert!(!repo.exists(id).unwrap());
        repo.save(id, &object(json!({ "core": { "nickname": "Steve" } })))
            .unwrap();
        assert!(repo.exists(id).unwrap());
        assert!(repo.record_path(id).is_file());

        assert!(repo.delete(id).unwrap());
        assert!(!repo.delete(id).unwrap());
        assert_eq!(repo.get(id).unwrap(), None);
    }

    // ---- Test 4: Overwrite leaves no temporary files behind ----

    #[test]
    fn overwrite_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).pretty(false).users();
        let id = Uuid::new_v4();

        repo.save(id, &object(json!({ "n": 1 }))).unwrap();
        repo.save(id, &object(json!({ "n": 2 }))).unwrap();

        let shard = repo.record_path(id).parent().unwrap().to_path_buf();
        let files: Vec<_> = fs::read_dir(shard).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            fs::read_to_string(repo.record_path(id)).unwrap(),
            r#"{"n":2}"#
        );
    }

    // ---- Test 5: Scanning skips corrupt and foreign files ----

    #[test]
    fn get_all_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).worlds();
        let good = Uuid::new_v4();
        let bad = Uuid::new_v4();
        repo.save(good, &object(json!({ "border": 500 }))).unwrap();

        let bad_path = repo.record_path(bad);
        fs::create_dir_all(bad_path.parent().unwrap()).unwrap();
        fs::write(&bad_path, b"{ not json").unwrap();
        fs::write(bad_path.with_file_name("notes.txt"), b"hello").unwrap();

        let all = repo.get_all(&DataQuery::All).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key(&good));
        assert_eq!(repo.count(&DataQuery::All).unwrap(), 1);

        let err = repo.get(bad).unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt { .. }));
    }

    // ---- Test 6: Key queries read only named ids ----

    #[test]
    fn get_all_by_keys() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).users();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.save(a, &object(json!({ "n": 1 }))).unwrap();
        repo.save(b, &object(json!({ "n": 2 }))).unwrap();

        let query = DataQuery::keys([a, Uuid::new_v4()]);
        let found = repo.get_all(&query).unwrap();
        assert_eq!(found.keys().copied().collect::<Vec<_>>(), vec![a]);
        assert_eq!(repo.count(&query).unwrap(), 1);
    }

    // ---- Test 7: Missing data directory reads as empty ----

    #[test]
    fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileKeyedRepository::new(dir.path().join("nowhere"));
        assert!(repo.get_all(&DataQuery::All).unwrap().is_empty());
        assert_eq!(repo.count(&DataQuery::All).unwrap(), 0);
    }

    // ---- Test 8: Non-object top level is corrupt ----

    #[test]
    fn non_object_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).general();
        fs::write(repo.path(), b"[1, 2, 3]").unwrap();
        assert!(matches!(repo.get(), Err(RepositoryError::Corrupt { .. })));
    }

    // ---- Test 9: Shutdown ----

    #[test]
    fn shutdown_rejects_operations() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FlatFileLayout::new(dir.path()).users();
        repo.shutdown().unwrap();
        assert!(matches!(
            repo.get(Uuid::new_v4()),
            Err(RepositoryError::Shutdown)
        ));
    }
}
