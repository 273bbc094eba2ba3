use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cervical fluid descriptor that marks peak fertility.
pub const EGG_WHITE: &str = "egg-white";

/// Descriptors for the drier fluid that follows the fertile peak.
pub const POST_PEAK_FLUIDS: [&str; 2] = ["creamy", "sticky"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FlowLevel {
    #[default]
    None,
    Spotting,
    Light,
    Medium,
    Heavy,
}

impl FlowLevel {
    /// Light flow or heavier counts as a period day. Spotting does not.
    pub fn is_period(self) -> bool {
        matches!(self, FlowLevel::Light | FlowLevel::Medium | FlowLevel::Heavy)
    }
}

/// Ovulation predictor kit strip reading, ordered by LH level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum OpkResult {
    Negative,
    Low,
    High,
    Peak,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Ferning {
    None,
    Partial,
    Full,
}

/// One day of fertility observations. Optional fields that are absent were
/// not measured that day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleEntry {
    pub date: NaiveDate,
    #[serde(default)]
    pub flow: FlowLevel,
    #[serde(default)]
    pub bbt: Option<f64>,
    #[serde(default)]
    pub opk: Option<OpkResult>,
    #[serde(default)]
    pub cervical_fluid: Option<String>,
    #[serde(default)]
    pub ferning: Option<Ferning>,
    #[serde(default)]
    pub notes: String,
}

impl CycleEntry {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            flow: FlowLevel::None,
            bbt: None,
            opk: None,
            cervical_fluid: None,
            ferning: None,
            notes: String::new(),
        }
    }

    /// Cervical fluid descriptor, ignoring blank values.
    pub fn fluid(&self) -> Option<&str> {
        self.cervical_fluid
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    pub fn has_egg_white(&self) -> bool {
        self.fluid() == Some(EGG_WHITE)
    }

    pub fn has_post_peak_fluid(&self) -> bool {
        self.fluid().is_some_and(|f| POST_PEAK_FLUIDS.contains(&f))
    }
}

/// Aggregate facts about a completed cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleSummary {
    pub cycle_length: i64,
    #[serde(default)]
    pub ovulation_day: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Confirmed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionMethod {
    CycleLength,
    BbtPattern,
    OpkSurge,
    CervicalFluid,
    Combined,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FertilityStatus {
    PreOvulation,
    OvulationLikely,
    PostOvulation,
    Unknown,
}

impl FertilityStatus {
    pub fn from_days_until(days_until: Option<i64>) -> Self {
        match days_until {
            Some(d) if d > 0 => FertilityStatus::PreOvulation,
            Some(0) => FertilityStatus::OvulationLikely,
            Some(_) => FertilityStatus::PostOvulation,
            None => FertilityStatus::Unknown,
        }
    }
}

/// Observations near the reference date that corroborate a prediction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SupportingSign {
    EggWhiteFluid,
    /// Creamy or sticky fluid on or after the latest OPK reading, which was a peak.
    FluidChangeAfterPeak,
    FullFerning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OvulationPrediction {
    pub predicted_day: Option<i64>,
    pub confidence: Confidence,
    pub method: PredictionMethod,
    pub fertile_window_start: Option<i64>,
    pub fertile_window_end: Option<i64>,
    pub days_until_ovulation: Option<i64>,
    pub message: String,
    pub is_late: bool,
    pub status: FertilityStatus,
    #[serde(default)]
    pub supporting_signs: Vec<SupportingSign>,
}

impl OvulationPrediction {
    /// A result that carries no predicted day.
    pub fn undetermined(method: PredictionMethod, message: impl Into<String>) -> Self {
        Self {
            predicted_day: None,
            confidence: Confidence::Low,
            method,
            fertile_window_start: None,
            fertile_window_end: None,
            days_until_ovulation: None,
            message: message.into(),
            is_late: false,
            status: FertilityStatus::Unknown,
            supporting_signs: Vec::new(),
        }
    }
}

/// A menstrual cycle, opened by the first period day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub start_date: NaiveDate,
    /// Last day of the period that opened the cycle; `None` while still bleeding.
    pub end_date: Option<NaiveDate>,
}

/// Calendar view of a prediction's fertile window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertilityWindow {
    pub fertile_start: NaiveDate,
    pub fertile_end: NaiveDate,
    pub ovulation_day: NaiveDate,
    pub peak_start: NaiveDate,
    pub peak_end: NaiveDate,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStats {
    pub total_cycles: usize,
    pub avg_cycle_length: Option<f32>,
    pub avg_period_length: Option<f32>,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
    pub entries_with_flow: usize,
    pub entries_with_bbt: usize,
    pub entries_with_positive_opk: usize,
    pub entries_with_fluid: usize,
}

/// Tunable thresholds for the predictor and cycle detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictorConfig {
    pub min_bbt_readings: usize,
    pub bbt_window: usize,
    pub bbt_baseline_len: usize,
    /// Rise over the baseline mean, in degrees Fahrenheit.
    pub bbt_shift_f: f64,
    pub bbt_sustain_readings: usize,
    pub opk_window: usize,
    pub fluid_window: usize,
    pub luteal_phase_days: i64,
    pub min_ovulation_day: i64,
    pub fertile_days_before: i64,
    pub late_grace_days: i64,
    pub medium_history_cycles: usize,
    /// Max gap in days between flow days of the same period.
    pub period_gap_days: i64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_bbt_readings: 6,
            bbt_window: 10,
            bbt_baseline_len: 3,
            bbt_shift_f: 0.2,
            bbt_sustain_readings: 2,
            opk_window: 5,
            fluid_window: 7,
            luteal_phase_days: 14,
            min_ovulation_day: 10,
            fertile_days_before: 5,
            late_grace_days: 2,
            medium_history_cycles: 3,
            period_gap_days: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub auto_lock_minutes: u32,
    #[serde(default)]
    pub show_fertility: bool,
    #[serde(default)]
    pub predictor: PredictorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_lock_minutes: 5,
            show_fertility: false,
            predictor: PredictorConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
