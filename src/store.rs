use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::Result;

/// A set of ids whose membership overrides what the remote reports.
pub trait OverrideStore {
    fn is_marked(&self, id: &str) -> bool;
    fn mark(&mut self, id: &str) -> Result<()>;
    fn unmark(&mut self, id: &str) -> Result<()>;
    fn all_marked(&self) -> HashSet<String>;
}

/// ~/.local/state/gitdash on Linux, the platform data dir elsewhere.
pub fn state_dir() -> Option<PathBuf> {
    let base = dirs::state_dir().or_else(dirs::data_local_dir)?;
    Some(base.join("gitdash"))
}

/// Write `content` to a sibling temp file, then rename it over `path`.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Bookmarked notification ids, persisted as a JSON array.
#[derive(Debug, Default)]
pub struct BookmarkStore {
    path: Option<PathBuf>,
    ids: BTreeSet<String>,
}

impl BookmarkStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing or unreadable file yields an empty store.
    pub fn load(path: PathBuf) -> Self {
        let ids = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "ignoring corrupt bookmark store");
                BTreeSet::new()
            }),
            Err(_) => BTreeSet::new(),
        };
        Self {
            path: Some(path),
            ids,
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let data = serde_json::to_vec_pretty(&self.ids)?;
            atomic_write(path, &data)?;
        }
        Ok(())
    }

    /// Flip membership, returning the new state.
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        if self.is_marked(id) {
            self.unmark(id)?;
            Ok(false)
        } else {
            self.mark(id)?;
            Ok(true)
        }
    }
}

impl OverrideStore for BookmarkStore {
    fn is_marked(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn mark(&mut self, id: &str) -> Result<()> {
        if self.ids.insert(id.to_string()) {
            self.save()?;
        }
        Ok(())
    }

    fn unmark(&mut self, id: &str) -> Result<()> {
        if self.ids.remove(id) {
            self.save()?;
        }
        Ok(())
    }

    fn all_marked(&self) -> HashSet<String> {
        self.ids.iter().cloned().collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DoneFile {
    Stamped(BTreeMap<String, DateTime<Utc>>),
    // older files only listed ids
    Legacy(Vec<String>),
}

/// Notifications marked done, with the time they were marked.
///
/// A done thread resurfaces once the remote reports activity after that time.
#[derive(Debug, Default, Clone)]
pub struct DoneStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl DoneStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: PathBuf) -> Self {
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<DoneFile>(&content) {
                Ok(DoneFile::Stamped(map)) => map,
                Ok(DoneFile::Legacy(ids)) => {
                    let now = Utc::now();
                    ids.into_iter().map(|id| (id, now)).collect()
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "ignoring corrupt done store");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path: Some(path),
            entries,
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let data = serde_json::to_vec_pretty(&self.entries)?;
            atomic_write(path, &data)?;
        }
        Ok(())
    }

    pub fn mark_at(&mut self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if self.entries.get(id) == Some(&at) {
            return Ok(());
        }
        self.entries.insert(id.to_string(), at);
        self.save()
    }

    /// Done, and nothing happened on the thread since.
    pub fn hides(&self, id: &str, updated_at: DateTime<Utc>) -> bool {
        self.entries.get(id).is_some_and(|done_at| updated_at <= *done_at)
    }
}

impl OverrideStore for DoneStore {
    fn is_marked(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn mark(&mut self, id: &str) -> Result<()> {
        if self.is_marked(id) {
            return Ok(());
        }
        self.mark_at(id, Utc::now())
    }

    fn unmark(&mut self, id: &str) -> Result<()> {
        if self.entries.remove(id).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn all_marked(&self) -> HashSet<String> {
        self.entries.keys().cloned().collect()
    }
}

/// In-memory ids that live until the next manual refresh.
#[derive(Debug, Default, Clone)]
pub struct SessionSet {
    ids: HashSet<String>,
}

impl SessionSet {
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl OverrideStore for SessionSet {
    fn is_marked(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn mark(&mut self, id: &str) -> Result<()> {
        self.ids.insert(id.to_string());
        Ok(())
    }

    fn unmark(&mut self, id: &str) -> Result<()> {
        self.ids.remove(id);
        Ok(())
    }

    fn all_marked(&self) -> HashSet<String> {
        self.ids.clone()
    }
}

/// Persisted stores shared by every notification section.
#[derive(Debug, Default)]
pub struct Stores {
    pub bookmarks: BookmarkStore,
    pub done: DoneStore,
}

impl Stores {
    pub fn load(dir: &Path) -> Self {
        Self {
            bookmarks: BookmarkStore::load(dir.join("bookmarks.json")),
            done: DoneStore::load(dir.join("done.json")),
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }
}

/// Handle passed to sections. Only the event loop touches it, so the lock is never contended.
#[derive(Debug, Clone, Default)]
pub struct SharedStores(Arc<Mutex<Stores>>);

impl SharedStores {
    pub fn new(stores: Stores) -> Self {
        Self(Arc::new(Mutex::new(stores)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Stores> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn mark_twice_then_unmark() {
        let mut store = BookmarkStore::in_memory();
        store.mark("n1").unwrap();
        store.mark("n1").unwrap();
        store.unmark("n1").unwrap();
        assert!(!store.is_marked("n1"));
    }

    #[test]
    fn unmark_twice_is_fine() {
        let mut store = BookmarkStore::in_memory();
        store.mark("n1").unwrap();
        store.unmark("n1").unwrap();
        store.unmark("n1").unwrap();
        assert!(!store.is_marked("n1"));
        assert!(store.all_marked().is_empty());
    }

    #[test]
    fn bookmarks_persist_across_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookmarks.json");

        let mut store = BookmarkStore::load(path.clone());
        store.mark("a").unwrap();
        store.mark("b").unwrap();
        assert!(store.toggle("b").is_ok_and(|on| !on));

        let reloaded = BookmarkStore::load(path);
        assert!(reloaded.is_marked("a"));
        assert!(!reloaded.is_marked("b"));
    }

    #[test]
    fn missing_or_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let missing = BookmarkStore::load(dir.path().join("nope.json"));
        assert!(missing.all_marked().is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "not json {{{").unwrap();
        assert!(BookmarkStore::load(corrupt).all_marked().is_empty());
    }

    #[test]
    fn atomic_write_creates_parent_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.json");
        atomic_write(&path, b"one").unwrap();
        atomic_write(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn done_hides_until_new_activity() {
        let mut store = DoneStore::in_memory();
        let marked = Utc::now();
        store.mark_at("t1", marked).unwrap();

        assert!(store.hides("t1", marked - Duration::minutes(5)));
        assert!(store.hides("t1", marked));
        assert!(!store.hides("t1", marked + Duration::minutes(1)));
        assert!(!store.hides("t2", marked));
    }

    #[test]
    fn done_store_round_trip_and_legacy_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("done.json");

        let mut store = DoneStore::load(path.clone());
        store.mark("x").unwrap();
        store.mark("x").unwrap();
        assert!(DoneStore::load(path.clone()).is_marked("x"));

        fs::write(&path, r#"["old1", "old2"]"#).unwrap();
        let legacy = DoneStore::load(path);
        assert!(legacy.is_marked("old1"));
        assert!(legacy.is_marked("old2"));
    }

    #[test]
    fn session_set_clears() {
        let mut set = SessionSet::default();
        set.mark("a").unwrap();
        assert!(set.is_marked("a"));
        set.clear();
        assert!(!set.is_marked("a"));
    }

    #[test]
    fn shared_stores_see_each_others_writes() {
        let shared = SharedStores::new(Stores::in_memory());
        let other = shared.clone();
        shared.lock().bookmarks.mark("n").unwrap();
        assert!(other.lock().bookmarks.is_marked("n"));
    }
}
