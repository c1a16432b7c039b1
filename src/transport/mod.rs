use crate::Result;
use std::io::Write;
use std::time::SystemTime;

pub mod ftp;

pub use ftp::{FtpConfig, FtpConnection};

/// How the source classified a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// Symlinks and anything else that is neither a directory nor a plain file.
    Other,
}

/// One immediate child of a listed directory.
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Bare entry name, no parent path
    pub name: String,
    pub size: u64,
    pub mod_time: SystemTime,
    pub kind: EntryKind,
}

/// Read access to a remote file tree.
pub trait Transport {
    /// List the immediate entries of a remote directory.
    fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>>;
    /// Stream the contents of a remote file into `sink`, returning the byte count.
    fn retrieve(&mut self, path: &str, sink: &mut dyn Write) -> Result<u64>;
}
