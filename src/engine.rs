use crate::config::MirrorConfig;
use crate::delta::{compute_diff, Upload};
use crate::mtime;
use crate::scanner::{ListingPolicy, RemoteScanner, Scanner};
use crate::store::{build_catalog, GcsConfig, GcsStore, ObjectStore};
use crate::transport::{FtpConnection, Transport};
use crate::{MirrorError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use tracing::{debug, info};

/// Knobs for a single pass that do not concern either backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorOptions {
    pub dry_run: bool,
    pub progress: bool,
    pub listing_policy: ListingPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Files found on the source
    pub scanned: usize,
    /// Files whose object already matched
    pub skipped: usize,
    /// Files uploaded (or that would be, in a dry run)
    pub transferred: usize,
    pub bytes: u64,
}

/// Copy every new or changed file under `source_root` into `store` below `prefix`.
///
/// The destination is listed once up front and never re-read, and nothing in
/// it is ever deleted. The first error of any kind ends the run; whatever an
/// interrupted upload left behind is up to the store.
pub fn mirror(
    conn: &mut dyn Transport,
    store: &dyn ObjectStore,
    source_root: &str,
    prefix: &str,
    options: &MirrorOptions,
) -> Result<MirrorStats> {
    info!("Listing destination objects...");
    let catalog = build_catalog(store, prefix)?;
    info!("Found {} existing objects.", catalog.len());

    info!("Scanning remote directory: {}", source_root);
    let manifest = RemoteScanner::new(conn)
        .with_policy(options.listing_policy)
        .scan(source_root)?;
    info!("Found {} remote files ({} bytes).", manifest.len(), manifest.total_size());

    let plan = compute_diff(&manifest, &catalog, prefix);
    info!("{} files up to date, {} to transfer.", plan.skipped, plan.uploads.len());

    let mut stats = MirrorStats {
        scanned: manifest.len(),
        skipped: plan.skipped,
        ..Default::default()
    };

    let pb = if options.progress && !plan.uploads.is_empty() {
        let pb = ProgressBar::new(plan.uploads.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    for upload in &plan.uploads {
        if let Some(pb) = &pb {
            pb.set_message(format!("Uploading {}", upload.entry.path));
        }

        let bytes = transfer(conn, store, upload, options.dry_run)?;
        stats.transferred += 1;
        stats.bytes += bytes;

        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if let Some(pb) = &pb {
        pb.finish_with_message("Done");
    }
    Ok(stats)
}

fn transfer(conn: &mut dyn Transport, store: &dyn ObjectStore, upload: &Upload, dry_run: bool) -> Result<u64> {
    let path = &upload.entry.path;

    // An untagged object would never pass the quick check again.
    let mut metadata = HashMap::new();
    mtime::set_mod_time(&mut metadata, upload.entry.mod_time)
        .map_err(|source| MirrorError::ModTime { path: path.clone(), source })?;

    if dry_run {
        info!("UPLOAD: {} -> {}", path, upload.key);
        return Ok(upload.entry.size);
    }

    debug!("Opening object {} for {}", upload.key, path);
    let mut writer = store.create_object(&upload.key, metadata)?;
    let bytes = conn.retrieve(path, &mut writer)?;
    writer.commit()?;

    info!("{}", path);
    Ok(bytes)
}

pub struct SyncEngine {
    config: MirrorConfig,
}

impl SyncEngine {
    pub fn new(config: MirrorConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<MirrorStats> {
        let source = &self.config.source;
        let destination = &self.config.destination;

        info!("Connecting to {}:{}...", source.host, source.port);
        let mut conn = FtpConnection::connect(&self.config.ftp_config())?;
        info!("Connected.");

        let store = GcsStore::new(&destination.bucket, GcsConfig::from_env(self.config.timeout))?;

        let options = MirrorOptions {
            dry_run: self.config.dry_run,
            progress: self.config.progress,
            listing_policy: self.config.listing_policy,
        };
        let stats = mirror(&mut conn, &store, &source.path, &destination.prefix, &options)?;

        info!(
            "Sync completed: {} scanned, {} skipped, {} transferred ({} bytes).",
            stats.scanned, stats.skipped, stats.transferred, stats.bytes
        );
        Ok(stats)
    }
}
