//! Fertility journal core: day entries, cycle detection from flow, and an
//! ovulation predictor that combines cycle history, BBT, OPK and cervical
//! fluid signals into a single prediction.

pub mod crypto;
pub mod cycles;
pub mod journal;
pub mod models;
pub mod prediction;
pub mod snapshot;
pub mod tracker;

pub use journal::{DayLog, EntryStore, Journal, JournalError};
pub use models::*;
pub use prediction::{combine, predict_ovulation, CycleAnchor, OvulationPredictor, Signal};
pub use tracker::{forecast, Tracker, TrackerError};
