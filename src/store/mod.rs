use crate::Result;
use std::collections::HashMap;
use std::io::Write;
use tracing::debug;

pub mod auth;
pub mod gcs;

pub use auth::AuthMode;
pub use gcs::{GcsConfig, GcsStore};

/// An object as returned by the store, keyed by its raw name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
    pub metadata: HashMap<String, String>,
}

/// Catalog view of a destination object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Object name with a leading "/" so it lines up with source paths
    pub name: String,
    pub size: u64,
    pub metadata: HashMap<String, String>,
}

impl From<StoredObject> for ObjectRecord {
    fn from(obj: StoredObject) -> Self {
        Self {
            name: format!("/{}", obj.name),
            size: obj.size,
            metadata: obj.metadata,
        }
    }
}

/// An open object upload. Nothing is visible in the store until `commit`.
pub trait ObjectWriter: Write {
    fn commit(self: Box<Self>) -> Result<()>;
}

/// Flat key/blob storage with per-object string metadata.
pub trait ObjectStore {
    /// Every object whose name starts with `prefix`, in no particular order.
    fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>>;
    /// Start writing `key`; `metadata` is attached before any content.
    fn create_object<'a>(&'a self, key: &str, metadata: HashMap<String, String>) -> Result<Box<dyn ObjectWriter + 'a>>;
}

/// Snapshot of the destination taken once, before any transfer.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    objects: HashMap<String, ObjectRecord>,
}

impl Catalog {
    pub fn get(&self, name: &str) -> Option<&ObjectRecord> {
        self.objects.get(name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl FromIterator<StoredObject> for Catalog {
    fn from_iter<I: IntoIterator<Item = StoredObject>>(iter: I) -> Self {
        let objects = iter
            .into_iter()
            .map(ObjectRecord::from)
            .map(|rec| (rec.name.clone(), rec))
            .collect();
        Self { objects }
    }
}

/// List everything under `prefix` (normalized with [`fix_prefix`]).
pub fn build_catalog(store: &dyn ObjectStore, prefix: &str) -> Result<Catalog> {
    let prefix = fix_prefix(prefix);
    debug!("Listing objects under prefix {:?}", prefix);
    let catalog: Catalog = store.list_objects(&prefix)?.into_iter().collect();
    Ok(catalog)
}

/// Non-empty prefixes end in a slash but never start with one.
pub fn fix_prefix(p: &str) -> String {
    let mut p = p.to_string();
    if !p.is_empty() && !p.ends_with('/') {
        p.push('/');
    }
    p.trim_start_matches('/').to_string()
}
