use chrono::Utc;
use uuid::Uuid;

use crate::models::SessionRecord;

const SESSION_PREFIX: &str = "session_";
const SESSION_SUFFIX_LEN: usize = 8;

/// Hands out fresh session records. Holds no state and performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionManager;

impl SessionManager {
    pub fn new() -> Self {
        Self
    }

    /// Starts a new active record with a random `session_<8-hex>` id.
    pub fn create(&self, device_id: &str) -> SessionRecord {
        self.create_with_id(generate_session_id(), device_id)
    }

    /// Starts a new active record under an id chosen by the device.
    pub fn create_with_id(&self, session_id: String, device_id: &str) -> SessionRecord {
        SessionRecord {
            session_id,
            start_time: Utc::now(),
            end_time: None,
            is_active: true,
            data_points_collected: 0,
            device_id: device_id.to_string(),
        }
    }
}

pub fn generate_session_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{SESSION_PREFIX}{}", &hex[..SESSION_SUFFIX_LEN])
}

/// True for ids shaped like `session_<token>` with a non-empty token and no
/// further separators, which keeps log file names splittable.
pub fn is_well_formed_session_id(value: &str) -> bool {
    value
        .strip_prefix(SESSION_PREFIX)
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_starts_active_record() {
        let before = Utc::now();
        let record = SessionManager::new().create("watch-01");
        let after = Utc::now();

        assert!(record.is_active);
        assert_eq!(record.data_points_collected, 0);
        assert_eq!(record.end_time, None);
        assert_eq!(record.device_id, "watch-01");
        assert!(record.start_time >= before && record.start_time <= after);
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_PREFIX.len() + SESSION_SUFFIX_LEN);
        assert!(id.starts_with("session_"));
        assert!(id[SESSION_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
        assert!(is_well_formed_session_id(&id));
    }

    #[test]
    fn test_session_ids_are_distinct() {
        let manager = SessionManager::new();
        let a = manager.create("d");
        let b = manager.create("d");
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn test_is_well_formed_session_id() {
        assert!(is_well_formed_session_id("session_001"));
        assert!(!is_well_formed_session_id("session_"));
        assert!(!is_well_formed_session_id("session_a_b"));
        assert!(!is_well_formed_session_id("run_1234abcd"));
    }

    #[test]
    fn test_complete_is_one_way() {
        let mut record = SessionManager::new().create("d");
        let ended = Utc::now();
        assert!(record.complete(ended, 42));
        assert!(!record.is_active);
        assert_eq!(record.data_points_collected, 42);

        assert!(!record.complete(Utc::now(), 99));
        assert_eq!(record.data_points_collected, 42);
        assert_eq!(record.end_time, Some(ended));
    }
}
