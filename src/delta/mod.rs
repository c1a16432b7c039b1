pub mod file_level;

pub use file_level::{compute_diff, destination_key, quick_check, Plan, Upload};
