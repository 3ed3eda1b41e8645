//! Session statistics persisted through the key-value collaborator.
//!
//! Writing is best-effort: the controller logs and drops any error from
//! [`SessionStatsStore::record`]. The read helpers exist for the CLI; the
//! scheduling core never reads statistics back.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PersistenceError;
use crate::storage::KeyValueStore;
use crate::timer::SessionRecord;

pub const HISTORY_KEY: &str = "stats.history";
pub const TOTALS_KEY: &str = "stats.totals";
pub const DEFAULT_HISTORY_CAP: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsTotals {
    pub sessions_completed: u64,
    pub focus_secs: u64,
    pub notifications_sent: u64,
    #[serde(default)]
    pub phone_use_secs: u64,
}

pub struct SessionStatsStore {
    store: Box<dyn KeyValueStore>,
    history_cap: usize,
}

impl std::fmt::Debug for SessionStatsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStatsStore")
            .field("history_cap", &self.history_cap)
            .finish_non_exhaustive()
    }
}

impl SessionStatsStore {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self::with_history_cap(store, DEFAULT_HISTORY_CAP)
    }

    pub fn with_history_cap(store: Box<dyn KeyValueStore>, history_cap: usize) -> Self {
        Self {
            store,
            history_cap: history_cap.max(1),
        }
    }

    /// Append `record` to the bounded history and fold it into the totals.
    ///
    /// A stored value that no longer decodes is logged and replaced. The two
    /// keys are written separately and the pair is not atomic: totals go
    /// first, so a failed history write loses a history entry but never a
    /// counted session.
    pub fn record(&mut self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let mut history = recover(self.history())?;
        history.push(record.clone());
        if history.len() > self.history_cap {
            let excess = history.len() - self.history_cap;
            history.drain(..excess);
        }

        let mut totals = recover(self.totals())?;
        totals.sessions_completed += 1;
        totals.focus_secs += record.duration_secs;
        totals.notifications_sent += u64::from(record.notifications_sent);
        totals.phone_use_secs += record.phone_use_secs;

        self.store.set(TOTALS_KEY, encode(TOTALS_KEY, &totals)?)?;
        self.store.set(HISTORY_KEY, encode(HISTORY_KEY, &history)?)?;
        Ok(())
    }

    /// Oldest first.
    pub fn history(&self) -> Result<Vec<SessionRecord>, PersistenceError> {
        self.read(HISTORY_KEY)
    }

    pub fn totals(&self) -> Result<StatsTotals, PersistenceError> {
        self.read(TOTALS_KEY)
    }

    fn read<T: Default + for<'de> Deserialize<'de>>(
        &self,
        key: &str,
    ) -> Result<T, PersistenceError> {
        match self.store.get(key)? {
            Some(value) => serde_json::from_value(value).map_err(|e| PersistenceError::Corrupt {
                key: key.to_string(),
                message: e.to_string(),
            }),
            None => Ok(T::default()),
        }
    }
}

/// Start over from the default when the stored value is corrupt.
fn recover<T: Default>(read: Result<T, PersistenceError>) -> Result<T, PersistenceError> {
    match read {
        Err(PersistenceError::Corrupt { key, message }) => {
            warn!(%key, error = %message, "discarding corrupt stats value");
            Ok(T::default())
        }
        other => other,
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<serde_json::Value, PersistenceError> {
    serde_json::to_value(value).map_err(|e| PersistenceError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::to_datetime;
    use crate::storage::{MemoryStore, SqliteStore};

    fn record(n: u64) -> SessionRecord {
        SessionRecord {
            session_id: format!("s{n}"),
            duration_secs: 60 * n,
            notifications_sent: n as u32,
            completed_at: to_datetime(n * 1_000),
            success: true,
            phone_use_secs: n,
        }
    }

    #[test]
    fn empty_store_reads_defaults() {
        let stats = SessionStatsStore::new(Box::new(MemoryStore::new()));
        assert!(stats.history().unwrap().is_empty());
        assert_eq!(stats.totals().unwrap(), StatsTotals::default());
    }

    #[test]
    fn record_appends_and_accumulates() {
        let mut stats = SessionStatsStore::new(Box::new(MemoryStore::new()));
        stats.record(&record(1)).unwrap();
        stats.record(&record(2)).unwrap();

        let history = stats.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].session_id, "s2");

        let totals = stats.totals().unwrap();
        assert_eq!(totals.sessions_completed, 2);
        assert_eq!(totals.focus_secs, 180);
        assert_eq!(totals.notifications_sent, 3);
        assert_eq!(totals.phone_use_secs, 3);
    }

    #[test]
    fn history_is_capped_keeping_newest() {
        let mut stats = SessionStatsStore::with_history_cap(Box::new(MemoryStore::new()), 3);
        for n in 1..=5 {
            stats.record(&record(n)).unwrap();
        }
        let ids: Vec<String> = stats
            .history()
            .unwrap()
            .into_iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec!["s3", "s4", "s5"]);
        // Totals are not capped.
        assert_eq!(stats.totals().unwrap().sessions_completed, 5);
    }

    #[test]
    fn corrupt_values_are_replaced_on_record() {
        let mut store = MemoryStore::new();
        store.set(HISTORY_KEY, serde_json::json!("garbage")).unwrap();
        store
            .set(TOTALS_KEY, serde_json::json!({"sessions_completed": "many"}))
            .unwrap();
        let mut stats = SessionStatsStore::new(Box::new(store));
        assert!(matches!(
            stats.history(),
            Err(PersistenceError::Corrupt { .. })
        ));

        stats.record(&record(1)).unwrap();
        stats.record(&record(2)).unwrap();
        assert_eq!(stats.history().unwrap(), vec![record(1), record(2)]);
        assert_eq!(stats.totals().unwrap().sessions_completed, 2);
    }

    /// Accepts everything except writes to one key.
    struct RefusingKey(MemoryStore, &'static str);

    impl KeyValueStore for RefusingKey {
        fn get(&self, key: &str) -> Result<Option<serde_json::Value>, PersistenceError> {
            self.0.get(key)
        }

        fn set(&mut self, key: &str, value: serde_json::Value) -> Result<(), PersistenceError> {
            if key == self.1 {
                return Err(PersistenceError::Locked);
            }
            self.0.set(key, value)
        }
    }

    #[test]
    fn totals_are_written_before_history() {
        let mut stats =
            SessionStatsStore::new(Box::new(RefusingKey(MemoryStore::new(), HISTORY_KEY)));
        assert!(stats.record(&record(3)).is_err());
        assert_eq!(stats.totals().unwrap().sessions_completed, 1);
        assert!(stats.history().unwrap().is_empty());
    }

    #[test]
    fn works_over_sqlite() {
        let mut stats = SessionStatsStore::new(Box::new(SqliteStore::open_memory().unwrap()));
        stats.record(&record(4)).unwrap();
        assert_eq!(stats.history().unwrap(), vec![record(4)]);
    }
}
