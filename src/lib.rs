pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod mtime;
pub mod scanner;
pub mod store;
pub mod transport;

pub use error::{MirrorError, ModTimeError};
pub type Result<T> = std::result::Result<T, MirrorError>;
