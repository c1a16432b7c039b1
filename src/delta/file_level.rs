use crate::mtime;
use crate::scanner::{FileEntry, Manifest};
use crate::store::{fix_prefix, Catalog, ObjectRecord};

/// A source file whose destination object is missing or stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub entry: FileEntry,
    /// Object name in the bucket, no leading slash
    pub key: String,
}

#[derive(Debug, Default)]
pub struct Plan {
    pub uploads: Vec<Upload>,
    pub skipped: usize,
}

/// Compares object and file size and mtime. Returns true on match.
///
/// This is a heuristic: a rewrite that keeps both size and the whole-second
/// mtime goes unnoticed. An object whose stored mtime is missing or unusable
/// never matches.
pub fn quick_check(obj: Option<&ObjectRecord>, file: &FileEntry) -> bool {
    let Some(obj) = obj else {
        return false;
    };

    if !file.is_regular_file {
        return false;
    }

    if obj.size != file.size {
        return false;
    }

    match mtime::decode(&obj.metadata) {
        Ok(stored) => mtime::unix_seconds(stored) == mtime::unix_seconds(file.mod_time),
        Err(_) => false,
    }
}

/// Object name for `path`: the source root is stripped and the rest placed
/// under the normalized destination prefix.
pub fn destination_key(source_root: &str, path: &str, prefix: &str) -> String {
    let root = source_root.trim_end_matches('/');
    let rel = match path.strip_prefix(root) {
        Some(rest) if root.is_empty() || rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };
    format!("{}{}", fix_prefix(prefix), rel.trim_start_matches('/'))
}

/// Decide, for every file in `local`, whether the catalog already holds it.
pub fn compute_diff(local: &Manifest, remote: &Catalog, prefix: &str) -> Plan {
    let mut plan = Plan::default();

    for (path, entry) in &local.entries {
        let key = destination_key(&local.root_path, path, prefix);
        let existing = remote.get(&format!("/{}", key));

        if quick_check(existing, entry) {
            plan.skipped += 1;
        } else {
            plan.uploads.push(Upload { entry: entry.clone(), key });
        }
    }

    plan
}
