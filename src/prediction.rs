use chrono::NaiveDate;
use tracing::debug;

use crate::models::{
    Confidence, CycleEntry, CycleSummary, Ferning, FertilityStatus, OpkResult,
    OvulationPrediction, PredictionMethod, PredictorConfig, SupportingSign,
};

/// Tolerance for comparing temperatures that were typed with one decimal.
const TEMP_EPSILON: f64 = 1e-9;

/// Ties "today" to a cycle day. Every entry's cycle day is an offset from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleAnchor {
    pub current_cycle_day: i64,
    pub reference_date: NaiveDate,
}

impl CycleAnchor {
    pub fn new(current_cycle_day: i64, reference_date: NaiveDate) -> Self {
        Self {
            current_cycle_day,
            reference_date,
        }
    }

    /// Cycle day an entry dated `date` falls on, never below day 1.
    pub fn day_of(&self, date: NaiveDate) -> i64 {
        (self.current_cycle_day + (date - self.reference_date).num_days()).max(1)
    }
}

#[derive(Debug, Clone, Copy)]
enum ShiftScan {
    NewestFirst,
    OldestFirst,
}

/// The fertility signals the predictor knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    CycleLength,
    BbtPattern,
    OpkSurge,
    CervicalFluid,
}

impl Signal {
    /// Evaluation order. The first signal seeds the fold; ties keep the earlier one.
    pub const FOLD_ORDER: [Signal; 4] = [
        Signal::CycleLength,
        Signal::BbtPattern,
        Signal::OpkSurge,
        Signal::CervicalFluid,
    ];

    pub fn method(self) -> PredictionMethod {
        match self {
            Signal::CycleLength => PredictionMethod::CycleLength,
            Signal::BbtPattern => PredictionMethod::BbtPattern,
            Signal::OpkSurge => PredictionMethod::OpkSurge,
            Signal::CervicalFluid => PredictionMethod::CervicalFluid,
        }
    }
}

/// Predict ovulation with the default thresholds.
pub fn predict_ovulation(
    anchor: CycleAnchor,
    current_cycle_entries: &[CycleEntry],
    historical_cycles: &[CycleSummary],
) -> OvulationPrediction {
    OvulationPredictor::default().predict(anchor, current_cycle_entries, historical_cycles)
}

#[derive(Debug, Clone, Default)]
pub struct OvulationPredictor {
    config: PredictorConfig,
}

impl OvulationPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Best single prediction from the baseline and every current-cycle signal.
    pub fn predict(
        &self,
        anchor: CycleAnchor,
        entries: &[CycleEntry],
        history: &[CycleSummary],
    ) -> OvulationPrediction {
        let order = Signal::FOLD_ORDER;
        let (seed, rest) = order.split_at(1);
        let mut prediction = self.analyze(seed[0], anchor, entries, history);

        for &signal in rest {
            let reading = self.analyze(signal, anchor, entries, history);
            debug!(
                ?signal,
                confidence = ?reading.confidence,
                day = ?reading.predicted_day,
                "signal analyzed"
            );
            if reading.confidence != Confidence::Low {
                prediction = combine(prediction, reading, anchor.current_cycle_day);
            }
        }

        prediction.is_late = self.is_late(&prediction, anchor.current_cycle_day);
        prediction.status = FertilityStatus::from_days_until(prediction.days_until_ovulation);
        prediction.supporting_signs = supporting_signs(anchor.reference_date, entries);
        prediction
    }

    pub fn analyze(
        &self,
        signal: Signal,
        anchor: CycleAnchor,
        entries: &[CycleEntry],
        history: &[CycleSummary],
    ) -> OvulationPrediction {
        match signal {
            Signal::CycleLength => self.cycle_length_baseline(anchor, history),
            Signal::BbtPattern => self.bbt_pattern(anchor, entries),
            Signal::OpkSurge => self.opk_surge(anchor, entries),
            Signal::CervicalFluid => self.cervical_fluid(anchor, entries),
        }
    }

    fn cycle_length_baseline(
        &self,
        anchor: CycleAnchor,
        history: &[CycleSummary],
    ) -> OvulationPrediction {
        let valid: Vec<&CycleSummary> = history.iter().filter(|c| c.cycle_length > 0).collect();
        if valid.is_empty() {
            return OvulationPrediction::undetermined(
                PredictionMethod::CycleLength,
                "Need more cycle data for predictions. Track a few cycles to get started.",
            );
        }

        let avg_cycle_length = round_mean(valid.iter().map(|c| c.cycle_length));
        let confirmed: Vec<i64> = valid.iter().filter_map(|c| c.ovulation_day).collect();
        let ovulation_day = if confirmed.is_empty() {
            (avg_cycle_length - self.config.luteal_phase_days).max(self.config.min_ovulation_day)
        } else {
            round_mean(confirmed.iter().copied())
        };

        let confidence = if history.len() >= self.config.medium_history_cycles {
            Confidence::Medium
        } else {
            Confidence::Low
        };
        let days_until = ovulation_day - anchor.current_cycle_day;

        OvulationPrediction {
            predicted_day: Some(ovulation_day),
            confidence,
            method: PredictionMethod::CycleLength,
            fertile_window_start: Some(
                (ovulation_day - self.config.fertile_days_before).max(1),
            ),
            fertile_window_end: Some(ovulation_day + 1),
            days_until_ovulation: Some(days_until),
            message: format!(
                "Ovulation {} (cycle day {ovulation_day}).",
                timing(days_until)
            ),
            is_late: false,
            status: FertilityStatus::Unknown,
            supporting_signs: Vec::new(),
        }
    }

    /// Date of the reading just before the most recent sustained temperature
    /// rise among the latest `bbt_window` readings.
    pub fn detect_thermal_shift(&self, entries: &[CycleEntry]) -> Option<NaiveDate> {
        self.scan_thermal_shift(entries, Some(self.config.bbt_window), ShiftScan::NewestFirst)
    }

    /// Date of the reading just before the first sustained temperature rise
    /// anywhere in a completed cycle's chart.
    pub fn confirm_ovulation(&self, cycle_entries: &[CycleEntry]) -> Option<NaiveDate> {
        self.scan_thermal_shift(cycle_entries, None, ShiftScan::OldestFirst)
    }

    fn scan_thermal_shift(
        &self,
        entries: &[CycleEntry],
        window: Option<usize>,
        scan: ShiftScan,
    ) -> Option<NaiveDate> {
        let mut readings: Vec<(NaiveDate, f64)> = entries
            .iter()
            .filter_map(|e| e.bbt.map(|t| (e.date, t)))
            .collect();
        if readings.len() < self.config.min_bbt_readings {
            return None;
        }
        readings.sort_by_key(|r| r.0);

        let skip = window.map_or(0, |w| readings.len().saturating_sub(w));
        let recent = &readings[skip..];
        let base_len = self.config.bbt_baseline_len.max(1);
        let sustain = self.config.bbt_sustain_readings;
        if recent.len() <= base_len + sustain {
            return None;
        }

        let holds_rise = |i: usize| {
            let baseline =
                recent[i - base_len..i].iter().map(|r| r.1).sum::<f64>() / base_len as f64;
            let threshold = baseline + self.config.bbt_shift_f;
            recent[i..=i + sustain]
                .iter()
                .all(|r| r.1 + TEMP_EPSILON >= threshold)
        };

        let mut candidates = base_len..recent.len() - sustain;
        let rise = match scan {
            ShiftScan::NewestFirst => candidates.rev().find(|&i| holds_rise(i)),
            ShiftScan::OldestFirst => candidates.find(|&i| holds_rise(i)),
        }?;

        debug!(rise_date = %recent[rise].0, ?scan, "thermal shift found");
        Some(recent[rise - 1].0)
    }

    fn bbt_pattern(&self, anchor: CycleAnchor, entries: &[CycleEntry]) -> OvulationPrediction {
        let readings = entries.iter().filter(|e| e.bbt.is_some()).count();
        if readings < self.config.min_bbt_readings {
            return OvulationPrediction::undetermined(
                PredictionMethod::BbtPattern,
                format!(
                    "Need at least {} BBT readings to look for a shift.",
                    self.config.min_bbt_readings
                ),
            );
        }
        let Some(date) = self.detect_thermal_shift(entries) else {
            return OvulationPrediction::undetermined(
                PredictionMethod::BbtPattern,
                "No BBT shift detected yet.",
            );
        };

        let day = anchor.day_of(date);
        OvulationPrediction {
            predicted_day: Some(day),
            confidence: Confidence::Confirmed,
            method: PredictionMethod::BbtPattern,
            fertile_window_start: Some((day - self.config.fertile_days_before).max(1)),
            fertile_window_end: Some(day + 1),
            days_until_ovulation: Some(day - anchor.current_cycle_day),
            message: format!("Ovulation confirmed by a BBT shift around cycle day {day}."),
            is_late: false,
            status: FertilityStatus::Unknown,
            supporting_signs: Vec::new(),
        }
    }

    fn opk_surge(&self, anchor: CycleAnchor, entries: &[CycleEntry]) -> OvulationPrediction {
        let mut readings: Vec<(NaiveDate, OpkResult)> = entries
            .iter()
            .filter_map(|e| e.opk.map(|r| (e.date, r)))
            .collect();
        if readings.is_empty() {
            return OvulationPrediction::undetermined(
                PredictionMethod::OpkSurge,
                "No OPK readings yet.",
            );
        }
        readings.sort_by_key(|r| r.0);
        let recent = &readings[readings.len().saturating_sub(self.config.opk_window)..];
        let latest = |wanted: OpkResult| {
            recent
                .iter()
                .rev()
                .find(|r| r.1 == wanted)
                .map(|r| anchor.day_of(r.0))
        };

        if let Some(peak_day) = latest(OpkResult::Peak) {
            let day = peak_day + 1;
            let days_until = day - anchor.current_cycle_day;
            return OvulationPrediction {
                predicted_day: Some(day),
                confidence: Confidence::High,
                method: PredictionMethod::OpkSurge,
                fertile_window_start: Some((peak_day - 2).max(1)),
                fertile_window_end: Some(day + 1),
                days_until_ovulation: Some(days_until),
                message: format!(
                    "OPK peak on cycle day {peak_day}. Ovulation {}.",
                    timing(days_until)
                ),
                is_late: false,
                status: FertilityStatus::Unknown,
                supporting_signs: Vec::new(),
            };
        }

        if let Some(high_day) = latest(OpkResult::High) {
            let day = high_day + 2;
            let days_until = day - anchor.current_cycle_day;
            return OvulationPrediction {
                predicted_day: Some(day),
                confidence: Confidence::Medium,
                method: PredictionMethod::OpkSurge,
                fertile_window_start: Some((high_day - 1).max(1)),
                fertile_window_end: Some(high_day + 3),
                days_until_ovulation: Some(days_until),
                message: format!(
                    "OPK reading is high, surge approaching. Ovulation {}.",
                    timing(days_until)
                ),
                is_late: false,
                status: FertilityStatus::Unknown,
                supporting_signs: Vec::new(),
            };
        }

        OvulationPrediction::undetermined(PredictionMethod::OpkSurge, "No OPK surge detected yet.")
    }

    fn cervical_fluid(&self, anchor: CycleAnchor, entries: &[CycleEntry]) -> OvulationPrediction {
        let mut observed: Vec<&CycleEntry> =
            entries.iter().filter(|e| e.fluid().is_some()).collect();
        if observed.is_empty() {
            return OvulationPrediction::undetermined(
                PredictionMethod::CervicalFluid,
                "No cervical fluid observations yet.",
            );
        }
        observed.sort_by_key(|e| e.date);
        let recent = &observed[observed.len().saturating_sub(self.config.fluid_window)..];

        let Some(egg_white) = recent.iter().rev().find(|e| e.has_egg_white()) else {
            return OvulationPrediction::undetermined(
                PredictionMethod::CervicalFluid,
                "No peak fertile fluid in recent observations.",
            );
        };

        let fluid_day = anchor.day_of(egg_white.date);
        let day = fluid_day + 1;
        let days_until = day - anchor.current_cycle_day;
        OvulationPrediction {
            predicted_day: Some(day),
            confidence: Confidence::Medium,
            method: PredictionMethod::CervicalFluid,
            fertile_window_start: Some((fluid_day - 2).max(1)),
            fertile_window_end: Some(day + 1),
            days_until_ovulation: Some(days_until),
            message: format!(
                "Egg-white fluid on cycle day {fluid_day}. Ovulation {}.",
                timing(days_until)
            ),
            is_late: false,
            status: FertilityStatus::Unknown,
            supporting_signs: Vec::new(),
        }
    }

    fn is_late(&self, prediction: &OvulationPrediction, current_cycle_day: i64) -> bool {
        match prediction.predicted_day {
            Some(day) if prediction.confidence != Confidence::Confirmed => {
                current_cycle_day > day + self.config.late_grace_days
            }
            _ => false,
        }
    }
}

/// Fold two readings into one. Confirmed wins outright, two highs are averaged,
/// otherwise the strictly stronger side wins and ties keep `first`.
pub fn combine(
    first: OvulationPrediction,
    second: OvulationPrediction,
    current_cycle_day: i64,
) -> OvulationPrediction {
    if second.confidence == Confidence::Confirmed {
        return second;
    }
    if first.confidence == Confidence::Confirmed {
        return first;
    }

    if first.confidence == Confidence::High && second.confidence == Confidence::High {
        if let (Some(a), Some(b)) = (first.predicted_day, second.predicted_day) {
            let day = round_mean([a, b].into_iter());
            return OvulationPrediction {
                predicted_day: Some(day),
                method: PredictionMethod::Combined,
                days_until_ovulation: Some(day - current_cycle_day),
                message: format!("Multiple signals point to ovulation around cycle day {day}."),
                ..first
            };
        }
    }

    if second.confidence > first.confidence {
        second
    } else {
        first
    }
}

/// Fluid observations within 3 days and full ferning within 2 days of `today`.
fn supporting_signs(today: NaiveDate, entries: &[CycleEntry]) -> Vec<SupportingSign> {
    let within = |date: NaiveDate, days: i64| (0..=days).contains(&(today - date).num_days());
    let mut signs = Vec::new();
    if entries.iter().any(|e| e.has_egg_white() && within(e.date, 3)) {
        signs.push(SupportingSign::EggWhiteFluid);
    }

    let latest_opk = entries
        .iter()
        .filter(|e| e.opk.is_some() && e.date <= today)
        .max_by_key(|e| e.date);
    if let Some(peak) = latest_opk.filter(|e| e.opk == Some(OpkResult::Peak)) {
        if entries
            .iter()
            .any(|e| e.has_post_peak_fluid() && e.date >= peak.date && within(e.date, 3))
        {
            signs.push(SupportingSign::FluidChangeAfterPeak);
        }
    }

    if entries
        .iter()
        .any(|e| e.ferning == Some(Ferning::Full) && within(e.date, 2))
    {
        signs.push(SupportingSign::FullFerning);
    }
    signs
}

fn timing(days_until: i64) -> String {
    match days_until {
        0 => "likely today".to_string(),
        1 => "expected in 1 day".to_string(),
        -1 => "likely occurred 1 day ago".to_string(),
        d if d > 0 => format!("expected in {d} days"),
        d => format!("likely occurred {} days ago", -d),
    }
}

fn round_mean(values: impl Iterator<Item = i64>) -> i64 {
    let (sum, count) = values.fold((0i64, 0i64), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        return 0;
    }
    (sum as f64 / count as f64).round() as i64
}
