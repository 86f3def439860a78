//! The score set of one subtest administration.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::ServiceError;
use crate::model::ScoreEntry;
use crate::traits::{PersistenceService, StoredScore};

type ScoreKey = (String, Option<String>);

/// Scores for one session, keyed by `(target, sub_target)`.
///
/// Recording an entry for an existing key replaces it. Entries are sent to
/// the persistence service exactly as recorded.
#[derive(Debug, Clone, Default)]
pub struct ScoreSheet {
    entries: BTreeMap<ScoreKey, ScoreEntry>,
}

impl ScoreSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: ScoreEntry) -> Option<ScoreEntry> {
        let key = (entry.target.clone(), entry.sub_target.clone());
        self.entries.insert(key, entry)
    }

    pub fn record_all(&mut self, entries: impl IntoIterator<Item = ScoreEntry>) {
        for entry in entries {
            self.record(entry);
        }
    }

    pub fn get(&self, target: &str, sub_target: Option<&str>) -> Option<&ScoreEntry> {
        self.entries
            .get(&(target.to_string(), sub_target.map(str::to_string)))
    }

    pub fn remove(&mut self, target: &str, sub_target: Option<&str>) -> Option<ScoreEntry> {
        self.entries
            .remove(&(target.to_string(), sub_target.map(str::to_string)))
    }

    pub fn entries(&self) -> impl Iterator<Item = &ScoreEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send every entry, then mark the session complete.
    pub async fn submit(
        &self,
        service: &dyn PersistenceService,
        session_id: u64,
    ) -> Result<Vec<StoredScore>, ServiceError> {
        let entries: Vec<ScoreEntry> = self.entries.values().cloned().collect();
        let stored = service.add_scores(session_id, &entries).await?;
        service.complete_session(session_id).await?;
        info!(session_id, scores = stored.len(), "session submitted");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_replaces_same_key() {
        let mut sheet = ScoreSheet::new();
        assert!(sheet.record(ScoreEntry::new("NLM_RETELL", 10)).is_none());
        sheet.record(ScoreEntry::new("NLM_RETELL", 4).with_sub_target("NDC"));
        let old = sheet.record(ScoreEntry::new("NLM_RETELL", 12)).unwrap();
        assert_eq!(old.raw_score, 10.0);
        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet.get("NLM_RETELL", None).unwrap().raw_score, 12.0);
        assert_eq!(sheet.get("NLM_RETELL", Some("NDC")).unwrap().raw_score, 4.0);
        assert!(sheet.get("NLM_QUESTIONS", None).is_none());
    }

    #[test]
    fn remove_entry() {
        let mut sheet = ScoreSheet::new();
        sheet.record(ScoreEntry::new("VCE", 3));
        assert!(sheet.remove("VCE", None).is_some());
        assert!(sheet.is_empty());
    }
}
