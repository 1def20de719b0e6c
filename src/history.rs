use crate::constants::HISTORY_STORE_KEY;
use crate::store::StoreAdapter;
use crate::tone::Tone;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    Correction,
    Enhancement,
}

/// One completed correction or enhancement.
///
/// Field names follow the JSON already written by the browser build so
/// existing history survives the move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub original: String,
    #[serde(rename = "corrected")]
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn correction(original: impl Into<String>, result: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: at.timestamp_millis().to_string(),
            kind: EntryKind::Correction,
            original: original.into(),
            result: result.into(),
            tone: None,
            timestamp: at,
        }
    }

    pub fn enhancement(
        original: impl Into<String>,
        result: impl Into<String>,
        tone: Tone,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: at.timestamp_millis().to_string(),
            kind: EntryKind::Enhancement,
            original: original.into(),
            result: result.into(),
            tone: Some(tone),
            timestamp: at,
        }
    }
}

/// Newest-first log of past operations, written through to the store on
/// every change.
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
    store: StoreAdapter,
    limit: Option<usize>,
}

impl HistoryLog {
    /// Restores the log from `store`; an unreadable value starts it empty.
    pub fn load(store: StoreAdapter, limit: Option<usize>) -> Self {
        let mut entries: Vec<HistoryEntry> = store.get(HISTORY_STORE_KEY, Vec::new());
        tracing::debug!("Loaded {} history entries", entries.len());
        if let Some(limit) = limit {
            if entries.len() > limit {
                tracing::debug!(
                    "History limit {} reached, dropping {} stored entries",
                    limit,
                    entries.len() - limit
                );
                entries.truncate(limit);
            }
        }
        Self {
            entries,
            store,
            limit,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Adds `entry` at the front. Ids are millisecond stamps, so a clash
    /// with the current newest entry is bumped forward by one.
    ///
    /// Returns the stored entry, or `None` when a zero limit keeps nothing.
    pub fn prepend(&mut self, mut entry: HistoryEntry) -> Option<&HistoryEntry> {
        while self.get(&entry.id).is_some() {
            let next = entry.id.parse::<i64>().map(|n| n + 1).unwrap_or_default();
            entry.id = if next > 0 {
                next.to_string()
            } else {
                format!("{}-{}", entry.id, self.entries.len())
            };
        }
        self.entries.insert(0, entry);
        if let Some(limit) = self.limit {
            if self.entries.len() > limit {
                let dropped = self.entries.len() - limit;
                self.entries.truncate(limit);
                tracing::debug!("History limit {} reached, evicted {} entries", limit, dropped);
            }
        }
        self.persist();
        self.entries.first()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn persist(&self) {
        self.store.set(HISTORY_STORE_KEY, &self.entries);
    }
}
