use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{CycleEntry, Ferning, FlowLevel, OpkResult, Settings};

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Where day entries live. One entry per date.
pub trait EntryStore {
    /// Insert the entry, replacing any entry already recorded for its date.
    fn upsert(&mut self, entry: CycleEntry);

    /// Remove the entry for `date`. Returns whether one existed.
    fn remove(&mut self, date: NaiveDate) -> bool;

    /// All entries, oldest first.
    fn entries(&self) -> &[CycleEntry];

    fn entries_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<CycleEntry> {
        self.entries()
            .iter()
            .filter(|e| e.date >= from && e.date <= to)
            .cloned()
            .collect()
    }
}

/// Everything the user has recorded, plus their settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Journal {
    #[serde(default)]
    entries: Vec<CycleEntry>,
    #[serde(default)]
    pub settings: Settings,
}

/// Observations for a single day as they come in from a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayLog {
    pub flow: FlowLevel,
    pub bbt: Option<f64>,
    pub opk: Option<OpkResult>,
    pub cervical_fluid: Option<String>,
    pub ferning: Option<Ferning>,
    pub notes: String,
}

impl Journal {
    pub fn new(settings: Settings) -> Self {
        Self {
            entries: Vec::new(),
            settings,
        }
    }

    /// Record a day given as `YYYY-MM-DD`.
    pub fn log_day(&mut self, date: &str, log: DayLog) -> Result<NaiveDate, JournalError> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| JournalError::InvalidDate(date.to_string()))?;

        self.upsert(CycleEntry {
            date,
            flow: log.flow,
            bbt: log.bbt,
            opk: log.opk,
            cervical_fluid: log.cervical_fluid.filter(|f| !f.trim().is_empty()),
            ferning: log.ferning,
            notes: log.notes,
        });
        info!(%date, "day logged");
        Ok(date)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restore ordering and the one-entry-per-date rule after deserializing
    /// data that may have been edited by hand. Later duplicates win.
    pub fn normalize(&mut self) {
        let mut entries = std::mem::take(&mut self.entries);
        entries.reverse();
        entries.sort_by_key(|e| e.date);
        entries.dedup_by_key(|e| e.date);
        self.entries = entries;
    }
}

impl EntryStore for Journal {
    fn upsert(&mut self, entry: CycleEntry) {
        match self.entries.binary_search_by_key(&entry.date, |e| e.date) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    fn remove(&mut self, date: NaiveDate) -> bool {
        match self.entries.binary_search_by_key(&date, |e| e.date) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    fn entries(&self) -> &[CycleEntry] {
        &self.entries
    }
}
