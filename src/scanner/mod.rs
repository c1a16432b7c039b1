use std::collections::BTreeMap;
use std::time::SystemTime;
use crate::Result;

pub mod remote;

pub use remote::RemoteScanner;

/// A regular file found on the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path (using / as separator)
    pub path: String,
    /// File size (bytes)
    pub size: u64,
    /// Modification time as reported by the source
    pub mod_time: SystemTime,
    /// False for symlinks and other special entries
    pub is_regular_file: bool,
}

/// Every file under a source root, keyed by absolute path.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Root path the scan started from
    pub root_path: String,
    pub entries: BTreeMap<String, FileEntry>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }
}

/// What to do when a directory below the root cannot be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingPolicy {
    /// Abort the whole scan on the first listing error.
    #[default]
    FailFast,
    /// Log and skip unreadable subdirectories. The root must still list.
    SkipUnreadable,
}

/// Scanner trait
pub trait Scanner {
    /// Scan the tree under `root` and return its manifest
    fn scan(&mut self, root: &str) -> Result<Manifest>;
}

/// Join a "/"-separated parent path and an entry name.
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if name.is_empty() {
        return if parent.is_empty() { "/".to_string() } else { parent.to_string() };
    }
    format!("{}/{}", parent, name)
}

/// Normalize a source root: absolute, no trailing slash, no empty segments.
pub fn clean_root(root: &str) -> String {
    let parts: Vec<&str> = root.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    format!("/{}", parts.join("/"))
}
