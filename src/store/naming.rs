//! File naming convention: `<kind>_<sessionId>_<creationTimestamp>.csv`.
//!
//! Session ids look like `session_<token>`, so a well-formed name splits into
//! four underscore-delimited tokens. Grouping only needs the kind and the two
//! session tokens; anything shorter falls back to its own stem.

use std::path::Path;

use crate::models::StreamKind;

pub const LOG_EXTENSION: &str = "csv";
pub const STAGING_EXTENSION: &str = "tmp";

pub fn file_name(kind: StreamKind, session_id: &str, created_ms: i64) -> String {
    format!("{}_{}_{}.{}", kind.as_str(), session_id, created_ms, LOG_EXTENSION)
}

pub fn file_prefix(kind: StreamKind, session_id: &str) -> String {
    format!("{}_{}_", kind.as_str(), session_id)
}

pub fn is_log_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(LOG_EXTENSION))
        .unwrap_or(false)
}

/// Whether `path` is the log for this `(kind, session)` pair.
pub fn matches(path: &Path, kind: StreamKind, session_id: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(rest) = name.strip_prefix(&file_prefix(kind, session_id)) else {
        return false;
    };
    // Rejects "session_1" matching "session_10_...": the remainder must be a bare timestamp.
    rest.strip_suffix(&format!(".{LOG_EXTENSION}"))
        .map(|ts| !ts.is_empty() && ts.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Header staging file left behind by `LogStore` when a create was cut short.
pub fn is_staging_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(&format!(".{LOG_EXTENSION}.{STAGING_EXTENSION}")))
        .unwrap_or(false)
}

pub fn stream_kind(path: &Path) -> Option<StreamKind> {
    let stem = path.file_stem()?.to_str()?;
    let first = stem.split('_').next()?;
    StreamKind::from_prefix(first)
}

/// Key used to group files into sessions: second and third tokens joined,
/// or the bare file stem when the name doesn't have the expected shape.
pub fn group_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let tokens: Vec<&str> = stem.split('_').collect();

    match tokens.as_slice() {
        [kind, a, b, ..] if StreamKind::from_prefix(kind).is_some() => {
            format!("{a}_{b}")
        }
        _ => stem.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_file_name_encodes_all_parts() {
        assert_eq!(
            file_name(StreamKind::Inertial, "session_001", 1640995200000),
            "inertial_session_001_1640995200000.csv"
        );
        assert_eq!(
            file_name(StreamKind::Biometric, "session_ab12cd34", 7),
            "biometric_session_ab12cd34_7.csv"
        );
    }

    #[test]
    fn test_is_log_file() {
        assert!(is_log_file(Path::new("/data/inertial_session_001_1.csv")));
        assert!(is_log_file(Path::new("anything.CSV")));
        assert!(!is_log_file(Path::new("inertial_session_001_1.csv.tmp")));
        assert!(!is_log_file(Path::new("settings.json")));
    }

    #[test]
    fn test_is_staging_file() {
        assert!(is_staging_file(Path::new("/d/inertial_session_001_1.csv.tmp")));
        assert!(!is_staging_file(Path::new("/d/inertial_session_001_1.csv")));
        assert!(!is_staging_file(Path::new("/d/scratch.tmp")));
    }

    #[test]
    fn test_matches_is_exact_on_session_id() {
        let path = PathBuf::from("inertial_session_10_1700.csv");
        assert!(matches(&path, StreamKind::Inertial, "session_10"));
        assert!(!matches(&path, StreamKind::Inertial, "session_1"));
        assert!(!matches(&path, StreamKind::Biometric, "session_10"));
    }

    #[test]
    fn test_group_key_well_formed() {
        assert_eq!(
            group_key(Path::new("/x/biometric_session_001_1640995200000.csv")),
            "session_001"
        );
        assert_eq!(group_key(Path::new("inertial_session_001.csv")), "session_001");
        assert_eq!(
            stream_kind(Path::new("/x/biometric_session_001_1.csv")),
            Some(StreamKind::Biometric)
        );
    }

    #[test]
    fn test_group_key_falls_back_to_stem() {
        assert_eq!(group_key(Path::new("export.csv")), "export");
        assert_eq!(group_key(Path::new("inertial_only.csv")), "inertial_only");
        assert_eq!(group_key(Path::new("notes_a_b_c.csv")), "notes_a_b_c");
        assert_eq!(stream_kind(Path::new("notes_a_b_c.csv")), None);
    }
}
