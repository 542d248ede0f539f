//! Key-value document persistence. Items are JSON objects; every operation is
//! atomic for a single item and nothing spans items.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tokio::{
    fs,
    sync::{Mutex, RwLock},
};
use tracing::debug;

use crate::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, key: &str, item: Value) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Set one top-level field, creating the item if it does not exist.
    async fn update(&self, key: &str, field: &str, value: Value) -> StoreResult<()>;

    /// Every item whose key starts with `prefix`, ordered by key.
    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>>;
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(item) => Ok(Some(serde_json::from_value(item)?)),
        None => Ok(None),
    }
}

pub async fn save<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    key: &str,
    item: &T,
) -> StoreResult<()> {
    store.put(key, serde_json::to_value(item)?).await
}

fn set_field(key: &str, item: &mut Value, field: &str, value: Value) -> StoreResult<()> {
    match item {
        Value::Object(map) => {
            map.insert(field.to_string(), value);
            Ok(())
        }
        _ => Err(StoreError::NotAnObject { key: key.to_string() }),
    }
}

fn ensure_object(key: &str, item: &Value) -> StoreResult<()> {
    if item.is_object() {
        Ok(())
    } else {
        Err(StoreError::NotAnObject { key: key.to_string() })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put(&self, key: &str, item: Value) -> StoreResult<()> {
        ensure_object(key, &item)?;
        self.items.write().await.insert(key.to_string(), item);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn update(&self, key: &str, field: &str, value: Value) -> StoreResult<()> {
        let mut items = self.items.write().await;
        let item = items
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        set_field(key, item, field, value)
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .items
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// One pretty-printed JSON file per item under a root directory.
pub struct FileStore {
    root: PathBuf,
    // serialises read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey("empty key".into()));
        }
        Ok(self.root.join(format!("{}.json", encode_key(key))))
    }

    async fn read(&self, path: &Path) -> StoreResult<Option<Value>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, item: &Value) -> StoreResult<()> {
        let pretty_json = serde_json::to_string_pretty(item)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &pretty_json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn put(&self, key: &str, item: Value) -> StoreResult<()> {
        ensure_object(key, &item)?;
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;
        self.write(&path, &item).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(key)?;
        self.read(&path).await
    }

    async fn update(&self, key: &str, field: &str, value: Value) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().await;
        let mut item = self
            .read(&path)
            .await?
            .unwrap_or_else(|| Value::Object(Map::new()));
        set_field(key, &mut item, field, value)?;
        self.write(&path, &item).await
    }

    async fn scan(&self, prefix: &str) -> StoreResult<Vec<(String, Value)>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Some(key) = decode_key(stem).filter(|k| k.starts_with(prefix)) {
                keys.push(key);
            }
        }
        keys.sort();

        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.read(&self.path_for(&key)?).await? {
                items.push((key, item));
            }
        }
        Ok(items)
    }
}

/// Percent-encode everything outside `[A-Za-z0-9._-]` so any key is a flat file name.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
