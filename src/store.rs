use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const ID_LEN: usize = 8;
const PUT_ATTEMPTS: usize = 5;

/// Random URL-safe token.
pub fn new_id() -> String {
  (0..ID_LEN)
    .map(|_| ID_ALPHABET[fastrand::usize(..ID_ALPHABET.len())] as char)
    .collect()
}

pub trait DocumentStore {
  /// Stores `encoded` under `id` unless the id is taken. Returns false on collision.
  fn try_insert(&self, id: &str, encoded: &str) -> Result<bool>;

  fn get(&self, id: &str) -> Result<Option<String>>;

  /// Stores `encoded` under a fresh id, retrying on collision.
  fn put(&self, encoded: &str) -> Result<String> {
    put_with(self, encoded, new_id)
  }
}

pub fn put_with<S, F>(store: &S, encoded: &str, mut next_id: F) -> Result<String>
where
  S: DocumentStore + ?Sized,
  F: FnMut() -> String,
{
  for _ in 0..PUT_ATTEMPTS {
    let id = next_id();
    if store.try_insert(&id, encoded)? {
      return Ok(id);
    }
  }
  Err(anyhow!("failed to allocate a short id after {PUT_ATTEMPTS} attempts"))
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  docs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl DocumentStore for MemoryStore {
  fn try_insert(&self, id: &str, encoded: &str) -> Result<bool> {
    let mut docs = self.docs.lock().map_err(|_| anyhow!("memory store poisoned"))?;
    if docs.contains_key(id) {
      return Ok(false);
    }
    docs.insert(id.to_string(), encoded.to_string());
    Ok(true)
  }

  fn get(&self, id: &str) -> Result<Option<String>> {
    let docs = self.docs.lock().map_err(|_| anyhow!("memory store poisoned"))?;
    Ok(docs.get(id).cloned())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDoc {
  encoded: String,
  created_at: u64,
}

/// JSON file mapping id -> document. Whole-file rewrite on every insert.
#[derive(Debug)]
pub struct FileStore {
  path: PathBuf,
  lock: Mutex<()>,
}

impl FileStore {
  pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
      std::fs::create_dir_all(dir).with_context(|| format!("create store dir: {}", dir.display()))?;
    }
    Ok(Self {
      path,
      lock: Mutex::new(()),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn load(&self) -> Result<BTreeMap<String, StoredDoc>> {
    if !self.path.exists() {
      return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(&self.path)
      .with_context(|| format!("read store: {}", self.path.display()))?;
    if raw.trim().is_empty() {
      return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("parse store: {}", self.path.display()))
  }

  fn save(&self, docs: &BTreeMap<String, StoredDoc>) -> Result<()> {
    let tmp = self.path.with_extension("tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(docs)?)
      .with_context(|| format!("write store: {}", tmp.display()))?;
    std::fs::rename(&tmp, &self.path).with_context(|| format!("replace store: {}", self.path.display()))?;
    Ok(())
  }
}

impl DocumentStore for FileStore {
  fn try_insert(&self, id: &str, encoded: &str) -> Result<bool> {
    let _guard = self.lock.lock().map_err(|_| anyhow!("file store poisoned"))?;
    let mut docs = self.load()?;
    if docs.contains_key(id) {
      return Ok(false);
    }
    let created_at = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or(0);
    docs.insert(
      id.to_string(),
      StoredDoc {
        encoded: encoded.to_string(),
        created_at,
      },
    );
    self.save(&docs)?;
    Ok(true)
  }

  fn get(&self, id: &str) -> Result<Option<String>> {
    let _guard = self.lock.lock().map_err(|_| anyhow!("file store poisoned"))?;
    Ok(self.load()?.remove(id).map(|d| d.encoded))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_path() -> PathBuf {
    std::env::temp_dir()
      .join(format!("hy2sub-store-{}", fastrand::u64(..)))
      .join("subscriptions.json")
  }

  #[test]
  fn ids_are_url_safe() {
    for _ in 0..100 {
      let id = new_id();
      assert_eq!(id.len(), ID_LEN);
      assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }
  }

  #[test]
  fn memory_put_then_get() {
    let store = MemoryStore::new();
    let id = store.put("abc").unwrap();
    assert_eq!(store.get(&id).unwrap().as_deref(), Some("abc"));
    assert_eq!(store.get("missing").unwrap(), None);
  }

  #[test]
  fn collisions_are_retried() {
    let store = MemoryStore::new();
    assert!(store.try_insert("taken", "x").unwrap());
    let mut ids = vec!["fresh".to_string(), "taken".to_string(), "taken".to_string()];
    let id = put_with(&store, "y", || ids.pop().unwrap()).unwrap();
    assert_eq!(id, "fresh");
    assert_eq!(store.get("taken").unwrap().as_deref(), Some("x"));
  }

  #[test]
  fn gives_up_after_repeated_collisions() {
    let store = MemoryStore::new();
    store.try_insert("same", "x").unwrap();
    assert!(put_with(&store, "y", || "same".to_string()).is_err());
  }

  #[test]
  fn file_store_persists_across_handles() {
    let path = temp_path();
    let id = FileStore::open(&path).unwrap().put("encoded-doc").unwrap();
    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.get(&id).unwrap().as_deref(), Some("encoded-doc"));
    assert_eq!(reopened.get("nope").unwrap(), None);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
  }
}
