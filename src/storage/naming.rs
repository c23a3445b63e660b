//! Stream name sanitization and recording file names
//!
//! Recordings are named `{name}_{YYYYMMDD_HHMMSS}.mp3` in UTC. A second
//! recording in the same second gets a `_1`, `_2`, ... suffix.

use chrono::{DateTime, Utc};

/// Extension of every recording
pub const RECORDING_EXTENSION: &str = "mp3";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Replace every character outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.is_empty() {
        "stream".to_string()
    } else {
        safe
    }
}

/// Build the file name for a recording; `attempt` 0 carries no suffix
pub fn recording_file_name(base: &str, at: DateTime<Utc>, attempt: u32) -> String {
    let stamp = at.format(TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{}_{}.{}", base, stamp, RECORDING_EXTENSION)
    } else {
        format!("{}_{}_{}.{}", base, stamp, attempt, RECORDING_EXTENSION)
    }
}

/// Check a file name requested by a client before it touches the filesystem
pub fn is_valid_file_name(file_name: &str) -> bool {
    let Some(stem) = file_name
        .strip_suffix(RECORDING_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
    else {
        return false;
    };

    !stem.is_empty()
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Extract the sanitized stream name from a recording file name
pub fn recording_base(file_name: &str) -> Option<&str> {
    if !is_valid_file_name(file_name) {
        return None;
    }
    let stem = &file_name[..file_name.len() - RECORDING_EXTENSION.len() - 1];
    let parts: Vec<&str> = stem.split('_').collect();

    let is_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());

    // name_DATE_TIME or name_DATE_TIME_N
    let stamp_at = (1..parts.len().saturating_sub(1))
        .rev()
        .find(|&i| {
            is_digits(parts[i], 8)
                && is_digits(parts[i + 1], 6)
                && (i + 2 == parts.len()
                    || (i + 3 == parts.len() && parts[i + 2].bytes().all(|b| b.is_ascii_digit())))
        })?;

    let base_len = parts[..stamp_at].iter().map(|p| p.len()).sum::<usize>() + stamp_at - 1;
    if base_len == 0 {
        return None;
    }
    Some(&stem[..base_len])
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("room-1_a"), "room-1_a");
        assert_eq!(sanitize_name("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_name("caf\u{e9} live"), "caf__live");
        assert_eq!(sanitize_name(""), "stream");
    }

    #[test]
    fn test_recording_file_name() {
        assert_eq!(recording_file_name("sos", at(), 0), "sos_20240309_070501.mp3");
        assert_eq!(recording_file_name("sos", at(), 2), "sos_20240309_070501_2.mp3");
    }

    #[test]
    fn test_valid_file_names() {
        assert!(is_valid_file_name("sos_20240309_070501.mp3"));
        assert!(!is_valid_file_name("../sos.mp3"));
        assert!(!is_valid_file_name("sos/x.mp3"));
        assert!(!is_valid_file_name("sos.wav"));
        assert!(!is_valid_file_name(".mp3"));
        assert!(!is_valid_file_name("mp3"));
    }

    #[test]
    fn test_recording_base() {
        assert_eq!(recording_base("sos_20240309_070501.mp3"), Some("sos"));
        assert_eq!(recording_base("my_room_20240309_070501.mp3"), Some("my_room"));
        assert_eq!(recording_base("sos_20240309_070501_3.mp3"), Some("sos"));
        assert_eq!(recording_base("20240309_070501.mp3"), None);
        assert_eq!(recording_base("_20240309_070501.mp3"), None);
        assert_eq!(recording_base("notes.mp3"), None);
        assert_eq!(recording_base("sos_20240309_070501.wav"), None);
    }

    #[test]
    fn test_round_trip_base() {
        let name = recording_file_name(&sanitize_name("Lobby Mic"), at(), 0);

        assert_eq!(recording_base(&name), Some("Lobby_Mic"));
    }
}
