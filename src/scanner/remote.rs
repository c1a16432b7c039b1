use crate::Result;
use crate::scanner::{clean_root, join_path, FileEntry, ListingPolicy, Manifest, Scanner};
use crate::transport::{EntryKind, Transport};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Walks a remote tree through a [`Transport`], one directory listing at a time.
pub struct RemoteScanner<'a> {
    conn: &'a mut dyn Transport,
    policy: ListingPolicy,
}

impl<'a> RemoteScanner<'a> {
    pub fn new(conn: &'a mut dyn Transport) -> Self {
        Self { conn, policy: ListingPolicy::FailFast }
    }

    pub fn with_policy(mut self, policy: ListingPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn scan_tree(&mut self, root: &str, entries: &mut BTreeMap<String, FileEntry>) -> Result<()> {
        // Depth-first with an explicit stack; children are pushed in reverse
        // so they come off in listing order.
        let mut pending = vec![root.to_string()];

        while let Some(dir) = pending.pop() {
            let listing = match self.conn.list_dir(&dir) {
                Ok(listing) => listing,
                Err(e) if self.policy == ListingPolicy::SkipUnreadable && dir != root => {
                    warn!("Skipping unreadable directory {}: {}", dir, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!("Listed {} ({} entries)", dir, listing.len());

            let mut subdirs = Vec::new();
            for entry in listing {
                if entry.name.is_empty() || entry.name == "." || entry.name == ".." {
                    continue;
                }
                let path = join_path(&dir, &entry.name);
                match entry.kind {
                    EntryKind::Directory => subdirs.push(path),
                    kind => {
                        entries.insert(path.clone(), FileEntry {
                            path,
                            size: entry.size,
                            mod_time: entry.mod_time,
                            is_regular_file: kind == EntryKind::File,
                        });
                    }
                }
            }
            pending.extend(subdirs.into_iter().rev());
        }
        Ok(())
    }
}

impl<'a> Scanner for RemoteScanner<'a> {
    fn scan(&mut self, root: &str) -> Result<Manifest> {
        let root_path = clean_root(root);
        let mut entries = BTreeMap::new();

        self.scan_tree(&root_path, &mut entries)?;

        Ok(Manifest { root_path, entries })
    }
}
