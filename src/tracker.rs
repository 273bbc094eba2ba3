use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::cycles;
use crate::journal::{DayLog, EntryStore, Journal, JournalError};
use crate::models::{CycleStats, FertilityWindow, OvulationPrediction, PredictorConfig, Settings};
use crate::prediction::OvulationPredictor;
use crate::snapshot::{self, SnapshotError};

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker is locked")]
    Locked,
    #[error("tracker state is poisoned")]
    Poisoned,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl<T> From<PoisonError<T>> for TrackerError {
    fn from(_: PoisonError<T>) -> Self {
        TrackerError::Poisoned
    }
}

/// Run the predictor over a journal as of `today`.
pub fn forecast(journal: &Journal, today: NaiveDate) -> OvulationPrediction {
    let config = &journal.settings.predictor;
    let predictor = OvulationPredictor::new(config.clone());
    let entries = journal.entries();

    let cycles = cycles::rebuild_cycles(entries, today, config.period_gap_days);
    let history = cycles::cycle_summaries(&cycles, entries, &predictor);
    let active = cycles::active_entries(&cycles, entries, today);
    predictor.predict(cycles::anchor(&cycles, today), &active, &history)
}

/// Host-facing state: the decrypted journal and passphrase while unlocked.
#[derive(Default)]
pub struct Tracker {
    passphrase: Mutex<Option<Zeroizing<String>>>,
    journal: Mutex<Option<Journal>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an empty journal. Returns the sealed bytes for the host to store.
    pub fn setup(&self, passphrase: String) -> Result<Vec<u8>, TrackerError> {
        let journal = Journal::default();
        let sealed = snapshot::seal(&passphrase, &journal)?;

        *self.passphrase.lock()? = Some(Zeroizing::new(passphrase));
        *self.journal.lock()? = Some(journal);
        info!("journal created");
        Ok(sealed)
    }

    /// Open sealed bytes. A wrong passphrase yields `Ok(false)`.
    pub fn unlock(&self, passphrase: String, sealed: &[u8]) -> Result<bool, TrackerError> {
        match snapshot::open(&passphrase, sealed) {
            Ok(journal) => {
                info!(entries = journal.len(), "journal unlocked");
                *self.passphrase.lock()? = Some(Zeroizing::new(passphrase));
                *self.journal.lock()? = Some(journal);
                Ok(true)
            }
            Err(SnapshotError::Crypto(e)) => {
                warn!(error = %e, "unlock rejected");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Zeroize the passphrase and drop the journal from memory.
    pub fn lock(&self) {
        if let Ok(mut pass) = self.passphrase.lock() {
            *pass = None;
        }
        if let Ok(mut journal) = self.journal.lock() {
            *journal = None;
        }
        info!("tracker locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.journal.lock().map(|j| j.is_some()).unwrap_or(false)
    }

    fn with_journal<R>(&self, f: impl FnOnce(&Journal) -> R) -> Result<R, TrackerError> {
        let guard = self.journal.lock()?;
        let journal = guard.as_ref().ok_or(TrackerError::Locked)?;
        Ok(f(journal))
    }

    fn with_journal_mut<R>(
        &self,
        f: impl FnOnce(&mut Journal) -> Result<R, TrackerError>,
    ) -> Result<R, TrackerError> {
        let mut guard = self.journal.lock()?;
        let journal = guard.as_mut().ok_or(TrackerError::Locked)?;
        f(journal)
    }

    pub fn log_day(&self, date: &str, log: DayLog) -> Result<NaiveDate, TrackerError> {
        self.with_journal_mut(|j| Ok(j.log_day(date, log)?))
    }

    pub fn remove_day(&self, date: NaiveDate) -> Result<bool, TrackerError> {
        self.with_journal_mut(|j| Ok(j.remove(date)))
    }

    pub fn prediction(&self, today: NaiveDate) -> Result<OvulationPrediction, TrackerError> {
        self.with_journal(|j| forecast(j, today))
    }

    /// Calendar fertile window for the current cycle, if the user opted in.
    pub fn fertility(&self, today: NaiveDate) -> Result<Option<FertilityWindow>, TrackerError> {
        self.with_journal(|j| {
            if !j.settings.show_fertility {
                return None;
            }
            let cycles =
                cycles::rebuild_cycles(j.entries(), today, j.settings.predictor.period_gap_days);
            let start = cycles::current_cycle(&cycles)?.start_date;
            cycles::fertility_window(&forecast(j, today), start)
        })
    }

    pub fn stats(&self, today: NaiveDate) -> Result<CycleStats, TrackerError> {
        self.with_journal(|j| {
            let cycles =
                cycles::rebuild_cycles(j.entries(), today, j.settings.predictor.period_gap_days);
            cycles::cycle_stats(&cycles, j.entries())
        })
    }

    pub fn settings(&self) -> Result<Settings, TrackerError> {
        self.with_journal(|j| j.settings.clone())
    }

    pub fn toggle_fertility(&self, enabled: bool) -> Result<(), TrackerError> {
        self.with_journal_mut(|j| {
            j.settings.show_fertility = enabled;
            Ok(())
        })
    }

    pub fn update_settings(&self, auto_lock_minutes: u32) -> Result<(), TrackerError> {
        self.with_journal_mut(|j| {
            j.settings.auto_lock_minutes = auto_lock_minutes.clamp(1, 60);
            Ok(())
        })
    }

    pub fn set_predictor_config(&self, config: PredictorConfig) -> Result<(), TrackerError> {
        self.with_journal_mut(|j| {
            j.settings.predictor = config;
            Ok(())
        })
    }

    /// Encrypt the current journal under the unlock passphrase.
    pub fn seal(&self) -> Result<Vec<u8>, TrackerError> {
        let pass = self.passphrase.lock()?;
        let pass = pass.as_ref().ok_or(TrackerError::Locked)?;
        self.with_journal(|j| snapshot::seal(pass, j))?
            .map_err(TrackerError::from)
    }

    pub fn export_json(&self) -> Result<String, TrackerError> {
        self.with_journal(snapshot::to_json)?.map_err(TrackerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, FlowLevel, OpkResult, PredictionMethod};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn bleed(tracker: &Tracker, days: &[&str]) {
        for d in days {
            tracker
                .log_day(
                    d,
                    DayLog {
                        flow: FlowLevel::Medium,
                        ..Default::default()
                    },
                )
                .unwrap();
        }
    }

    fn three_periods(tracker: &Tracker) {
        bleed(
            tracker,
            &[
                "2026-01-01", "2026-01-02", "2026-01-03",
                "2026-01-29", "2026-01-30", "2026-01-31",
                "2026-02-26", "2026-02-27", "2026-02-28",
            ],
        );
    }

    #[test]
    fn locked_tracker_refuses_work() {
        let tracker = Tracker::new();
        assert!(!tracker.is_unlocked());
        assert!(matches!(
            tracker.prediction(date("2026-03-10")),
            Err(TrackerError::Locked)
        ));
        assert!(matches!(tracker.seal(), Err(TrackerError::Locked)));
    }

    #[test]
    fn opk_peak_drives_prediction() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        three_periods(&tracker);
        tracker
            .log_day(
                "2026-03-10",
                DayLog {
                    opk: Some(OpkResult::Peak),
                    ..Default::default()
                },
            )
            .unwrap();

        let pred = tracker.prediction(date("2026-03-10")).unwrap();
        assert_eq!(pred.method, PredictionMethod::OpkSurge);
        assert_eq!(pred.confidence, Confidence::High);
        assert_eq!(pred.predicted_day, Some(14));
        assert_eq!(pred.days_until_ovulation, Some(1));
    }

    #[test]
    fn history_alone_gives_baseline() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        three_periods(&tracker);

        let pred = tracker.prediction(date("2026-03-05")).unwrap();
        assert_eq!(pred.method, PredictionMethod::CycleLength);
        assert_eq!(pred.predicted_day, Some(14));
        // Two completed cycles on record.
        assert_eq!(pred.confidence, Confidence::Low);
        assert_eq!(pred.days_until_ovulation, Some(6));
    }

    #[test]
    fn empty_journal_asks_for_data() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        let pred = tracker.prediction(date("2026-03-05")).unwrap();
        assert_eq!(pred.predicted_day, None);
        assert!(pred.message.to_lowercase().contains("track a few cycles"));
    }

    #[test]
    fn fertility_window_is_opt_in() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        three_periods(&tracker);
        let today = date("2026-03-05");

        assert_eq!(tracker.fertility(today).unwrap(), None);
        tracker.toggle_fertility(true).unwrap();
        let fw = tracker.fertility(today).unwrap().unwrap();
        assert_eq!(fw.ovulation_day, date("2026-03-11"));
        assert_eq!(fw.fertile_start, date("2026-03-06"));
    }

    #[test]
    fn stats_reflect_logged_periods() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        three_periods(&tracker);
        let stats = tracker.stats(date("2026-03-10")).unwrap();
        assert_eq!(stats.total_cycles, 3);
        assert_eq!(stats.avg_cycle_length, Some(28.0));
        assert_eq!(stats.avg_period_length, Some(3.0));
    }

    #[test]
    fn settings_are_clamped() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        tracker.update_settings(600).unwrap();
        assert_eq!(tracker.settings().unwrap().auto_lock_minutes, 60);
        tracker.update_settings(0).unwrap();
        assert_eq!(tracker.settings().unwrap().auto_lock_minutes, 1);
    }

    #[test]
    fn seal_lock_unlock_cycle() {
        let tracker = Tracker::new();
        tracker.setup("right".into()).unwrap();
        bleed(&tracker, &["2026-03-01"]);
        let sealed = tracker.seal().unwrap();

        tracker.lock();
        assert!(!tracker.is_unlocked());

        assert!(!tracker.unlock("wrong".into(), &sealed).unwrap());
        assert!(!tracker.is_unlocked());

        assert!(tracker.unlock("right".into(), &sealed).unwrap());
        let json = tracker.export_json().unwrap();
        assert!(json.contains("2026-03-01"));
    }

    #[test]
    fn bad_date_surfaces_journal_error() {
        let tracker = Tracker::new();
        tracker.setup("pass".into()).unwrap();
        assert!(matches!(
            tracker.log_day("yesterday", DayLog::default()),
            Err(TrackerError::Journal(JournalError::InvalidDate(_)))
        ));
    }
}
