//! Modification time metadata shared with `gsutil rsync`.
//!
//! gsutil stores POSIX attributes as custom object metadata under a fixed set
//! of reserved keys. Only the mtime key is read or written here; the others
//! are listed so callers never reuse them for anything else.

use crate::error::ModTimeError;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const GOOG_MTIME: &str = "goog-reserved-file-mtime";
pub const GOOG_GID: &str = "goog-reserved-posix-gid";
pub const GOOG_UID: &str = "goog-reserved-posix-uid";
pub const GOOG_ATIME: &str = "goog-reserved-file-atime";
pub const GOOG_MODE: &str = "goog-reserved-posix-mode";

/// Whole seconds since the epoch, rounded toward negative infinity.
pub fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let d = e.duration();
            let secs = -(d.as_secs() as i64);
            if d.subsec_nanos() > 0 {
                secs - 1
            } else {
                secs
            }
        }
    }
}

/// Format `t` as the value stored under [`GOOG_MTIME`].
///
/// gsutil uses -1 internally to mean "no mtime", so every value at or below
/// it is refused.
pub fn encode(t: SystemTime) -> Result<String, ModTimeError> {
    let secs = unix_seconds(t);
    if secs <= -1 {
        return Err(ModTimeError::Invalid);
    }
    Ok(secs.to_string())
}

/// Read the mtime stored in object metadata.
pub fn decode(metadata: &HashMap<String, String>) -> Result<SystemTime, ModTimeError> {
    let raw = metadata.get(GOOG_MTIME).ok_or(ModTimeError::Missing)?;
    let secs: i64 = raw.parse().map_err(|_| ModTimeError::Invalid)?;
    // Same sentinel rule as encode.
    if secs <= -1 {
        return Err(ModTimeError::Invalid);
    }
    Ok(UNIX_EPOCH + Duration::from_secs(secs as u64))
}

/// Attach the encoded mtime to `metadata`, leaving every other key alone.
pub fn set_mod_time(metadata: &mut HashMap<String, String>, t: SystemTime) -> Result<(), ModTimeError> {
    metadata.insert(GOOG_MTIME.to_string(), encode(t)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(value: &str) -> HashMap<String, String> {
        HashMap::from([(GOOG_MTIME.to_string(), value.to_string())])
    }

    #[test]
    fn test_encode_positive() {
        let t = UNIX_EPOCH + Duration::from_secs(1_560_000_000);
        assert_eq!(encode(t).unwrap(), "1560000000");
        assert_eq!(encode(UNIX_EPOCH).unwrap(), "0");
    }

    #[test]
    fn test_encode_drops_subsecond() {
        let t = UNIX_EPOCH + Duration::from_millis(42_900);
        assert_eq!(encode(t).unwrap(), "42");
    }

    #[test]
    fn test_encode_rejects_sentinel_and_below() {
        assert_eq!(encode(UNIX_EPOCH - Duration::from_secs(1)), Err(ModTimeError::Invalid));
        assert_eq!(encode(UNIX_EPOCH - Duration::from_secs(86_400)), Err(ModTimeError::Invalid));
        // Half a second before the epoch floors to -1.
        assert_eq!(encode(UNIX_EPOCH - Duration::from_millis(500)), Err(ModTimeError::Invalid));
    }

    #[test]
    fn test_decode() {
        let t = decode(&meta("1560000000")).unwrap();
        assert_eq!(unix_seconds(t), 1_560_000_000);
        assert_eq!(decode(&meta("0")).unwrap(), UNIX_EPOCH);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(&HashMap::new()), Err(ModTimeError::Missing));
        assert_eq!(decode(&meta("yesterday")), Err(ModTimeError::Invalid));
        assert_eq!(decode(&meta("12.5")), Err(ModTimeError::Invalid));
        assert_eq!(decode(&meta("")), Err(ModTimeError::Invalid));
        assert_eq!(decode(&meta("-1")), Err(ModTimeError::Invalid));
        assert_eq!(decode(&meta("-300")), Err(ModTimeError::Invalid));
    }

    #[test]
    fn test_round_trip_to_the_second() {
        for secs in [0u64, 1, 946_684_800, 4_102_444_800] {
            let t = UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_nanos(123);
            let mut m = HashMap::new();
            set_mod_time(&mut m, t).unwrap();
            assert_eq!(unix_seconds(decode(&m).unwrap()), unix_seconds(t));
        }
    }

    #[test]
    fn test_set_mod_time_keeps_other_keys() {
        let mut m = HashMap::from([
            (GOOG_MODE.to_string(), "33188".to_string()),
            (GOOG_UID.to_string(), "1000".to_string()),
        ]);
        set_mod_time(&mut m, UNIX_EPOCH + Duration::from_secs(7)).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m[GOOG_MODE], "33188");
        assert_eq!(m[GOOG_MTIME], "7");
    }
}
