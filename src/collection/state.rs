use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SessionRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CollectionStatus {
    #[default]
    Idle,
    Starting,
    Collecting,
    Stopping,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionState {
    pub status: CollectionStatus,
    pub session: Option<SessionRecord>,
    /// Rows persisted for the current session so far.
    pub data_points: u64,
    pub last_battery: Option<u8>,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collecting(&self) -> bool {
        self.status == CollectionStatus::Collecting
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn begin_starting(&mut self) {
        self.status = CollectionStatus::Starting;
    }

    /// Back to idle after a failed start; whatever session was pending is dropped.
    pub fn abort_start(&mut self) {
        self.status = CollectionStatus::Idle;
        self.session = None;
        self.data_points = 0;
    }

    pub fn begin_session(&mut self, record: SessionRecord) {
        self.status = CollectionStatus::Collecting;
        self.session = Some(record);
        self.data_points = 0;
    }

    pub fn begin_stopping(&mut self) {
        self.status = CollectionStatus::Stopping;
    }

    /// Completes the live record and returns to idle. `None` when another
    /// caller already finished the session.
    pub fn finish(&mut self, ended_at: DateTime<Utc>) -> Option<SessionRecord> {
        let mut record = self.session.take()?;
        record.complete(ended_at, self.data_points);
        self.status = CollectionStatus::Idle;
        self.data_points = 0;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionManager;

    #[test]
    fn test_lifecycle_transitions() {
        let mut state = CollectionState::new();
        assert_eq!(state.status, CollectionStatus::Idle);

        state.begin_starting();
        assert_eq!(state.status, CollectionStatus::Starting);

        let record = SessionManager::new().create("d");
        let id = record.session_id.clone();
        state.begin_session(record);
        assert!(state.is_collecting());
        assert_eq!(state.session_id(), Some(id.as_str()));

        state.data_points = 7;
        state.begin_stopping();
        let done = state.finish(Utc::now()).unwrap();

        assert_eq!(state.status, CollectionStatus::Idle);
        assert!(!done.is_active);
        assert_eq!(done.data_points_collected, 7);
        assert!(state.finish(Utc::now()).is_none());
    }

    #[test]
    fn test_abort_start_returns_to_idle() {
        let mut state = CollectionState::new();
        state.begin_starting();
        state.abort_start();
        assert_eq!(state.status, CollectionStatus::Idle);
        assert!(state.session.is_none());
    }
}
