use chrono::{Duration, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    Cycle, CycleEntry, CycleStats, CycleSummary, FertilityWindow, OpkResult, OvulationPrediction,
};
use crate::prediction::{CycleAnchor, OvulationPredictor};

/// Rebuild cycles from flow data.
/// Period days no more than `gap_days` apart belong to the same period; each
/// period opens a new cycle. The latest period stays open while its last flow
/// day is within `gap_days` of `today`.
pub fn rebuild_cycles(entries: &[CycleEntry], today: NaiveDate, gap_days: i64) -> Vec<Cycle> {
    let mut flow_days: Vec<NaiveDate> = entries
        .iter()
        .filter(|e| e.flow.is_period())
        .map(|e| e.date)
        .collect();
    flow_days.sort();
    flow_days.dedup();

    let Some((&first, rest)) = flow_days.split_first() else {
        return Vec::new();
    };

    let mut cycles: Vec<Cycle> = Vec::new();
    let mut period_start = first;
    let mut period_end = first;

    for &day in rest {
        if (day - period_end).num_days() <= gap_days {
            period_end = day;
        } else {
            cycles.push(Cycle {
                id: Uuid::new_v4(),
                start_date: period_start,
                end_date: Some(period_end),
            });
            period_start = day;
            period_end = day;
        }
    }

    let last_end = if (today - period_end).num_days() <= gap_days {
        None
    } else {
        Some(period_end)
    };
    cycles.push(Cycle {
        id: Uuid::new_v4(),
        start_date: period_start,
        end_date: last_end,
    });

    debug!(cycles = cycles.len(), "cycles rebuilt");
    cycles
}

/// The cycle opened by the most recent period.
pub fn current_cycle(cycles: &[Cycle]) -> Option<&Cycle> {
    cycles.iter().max_by_key(|c| c.start_date)
}

/// Day of the current cycle `today` falls on (day 1 = first period day).
pub fn current_cycle_day(cycles: &[Cycle], today: NaiveDate) -> Option<i64> {
    let start = current_cycle(cycles)?.start_date;
    let day = (today - start).num_days() + 1;
    (day >= 1).then_some(day)
}

/// Anchor for the predictor. Without a known cycle, `today` counts as day 1.
pub fn anchor(cycles: &[Cycle], today: NaiveDate) -> CycleAnchor {
    CycleAnchor::new(current_cycle_day(cycles, today).unwrap_or(1), today)
}

/// Entries recorded in the current cycle up to `today`. With no cycle on
/// record every entry up to `today` is returned.
pub fn active_entries(
    cycles: &[Cycle],
    entries: &[CycleEntry],
    today: NaiveDate,
) -> Vec<CycleEntry> {
    let since = current_cycle(cycles).map(|c| c.start_date);
    entries
        .iter()
        .filter(|e| e.date <= today && since.map_or(true, |start| e.date >= start))
        .cloned()
        .collect()
}

/// Summaries of every cycle that has been followed by another period.
/// Ovulation is filled in from the first sustained temperature rise in the
/// cycle's chart.
pub fn cycle_summaries(
    cycles: &[Cycle],
    entries: &[CycleEntry],
    predictor: &OvulationPredictor,
) -> Vec<CycleSummary> {
    let mut ordered: Vec<&Cycle> = cycles.iter().collect();
    ordered.sort_by_key(|c| c.start_date);

    ordered
        .windows(2)
        .map(|w| {
            let (start, next) = (w[0].start_date, w[1].start_date);
            let in_cycle: Vec<CycleEntry> = entries
                .iter()
                .filter(|e| e.date >= start && e.date < next)
                .cloned()
                .collect();
            let ovulation_day = predictor
                .confirm_ovulation(&in_cycle)
                .map(|date| CycleAnchor::new(1, start).day_of(date));
            CycleSummary {
                cycle_length: (next - start).num_days(),
                ovulation_day,
            }
        })
        .collect()
}

/// Compute cycle statistics for the stats view.
pub fn cycle_stats(cycles: &[Cycle], entries: &[CycleEntry]) -> CycleStats {
    let mut ordered: Vec<&Cycle> = cycles.iter().collect();
    ordered.sort_by_key(|c| c.start_date);

    let period_lengths: Vec<f64> = ordered
        .iter()
        .filter_map(|c| c.end_date.map(|end| (end - c.start_date).num_days() as f64 + 1.0))
        .collect();

    let cycle_lengths: Vec<i64> = ordered
        .windows(2)
        .map(|w| (w[1].start_date - w[0].start_date).num_days())
        .collect();

    let last = ordered.last();

    CycleStats {
        total_cycles: ordered.len(),
        avg_cycle_length: if cycle_lengths.is_empty() {
            None
        } else {
            Some(cycle_lengths.iter().sum::<i64>() as f32 / cycle_lengths.len() as f32)
        },
        avg_period_length: if period_lengths.is_empty() {
            None
        } else {
            Some(mean(&period_lengths) as f32)
        },
        shortest_cycle: cycle_lengths.iter().copied().min(),
        longest_cycle: cycle_lengths.iter().copied().max(),
        last_period_start: last.map(|c| c.start_date),
        last_period_end: last.and_then(|c| c.end_date),
        entries_with_flow: entries.iter().filter(|e| e.flow.is_period()).count(),
        entries_with_bbt: entries.iter().filter(|e| e.bbt.is_some()).count(),
        entries_with_positive_opk: entries
            .iter()
            .filter(|e| e.opk.is_some_and(|r| r != OpkResult::Negative))
            .count(),
        entries_with_fluid: entries.iter().filter(|e| e.fluid().is_some()).count(),
    }
}

/// Calendar dates for a prediction made in the cycle that began on `cycle_start`.
/// Peak fertility spans the two days before ovulation and the day itself.
pub fn fertility_window(
    prediction: &OvulationPrediction,
    cycle_start: NaiveDate,
) -> Option<FertilityWindow> {
    let to_date = |day: i64| cycle_start + Duration::days(day - 1);
    let ovulation = prediction.predicted_day?;

    let ovulation_day = to_date(ovulation);
    Some(FertilityWindow {
        fertile_start: to_date(prediction.fertile_window_start.unwrap_or((ovulation - 5).max(1))),
        fertile_end: to_date(prediction.fertile_window_end.unwrap_or(ovulation + 1)),
        ovulation_day,
        peak_start: ovulation_day - Duration::days(2),
        peak_end: ovulation_day,
        confidence: prediction.confidence,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, FlowLevel, PredictionMethod};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn flow(d: &str, level: FlowLevel) -> CycleEntry {
        CycleEntry {
            flow: level,
            ..CycleEntry::new(date(d))
        }
    }

    fn make_cycle(start: &str, end: Option<&str>) -> Cycle {
        Cycle {
            id: Uuid::new_v4(),
            start_date: date(start),
            end_date: end.map(date),
        }
    }

    fn two_periods() -> Vec<CycleEntry> {
        vec![
            flow("2026-01-01", FlowLevel::Heavy),
            flow("2026-01-02", FlowLevel::Medium),
            flow("2026-01-04", FlowLevel::Light),
            flow("2026-01-15", FlowLevel::Spotting),
            flow("2026-01-29", FlowLevel::Medium),
            flow("2026-01-30", FlowLevel::Light),
        ]
    }

    #[test]
    fn no_flow_means_no_cycles() {
        let entries = vec![flow("2026-01-10", FlowLevel::Spotting)];
        assert!(rebuild_cycles(&entries, date("2026-01-20"), 2).is_empty());
    }

    #[test]
    fn periods_split_on_gaps() {
        let cycles = rebuild_cycles(&two_periods(), date("2026-02-10"), 2);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].start_date, date("2026-01-01"));
        assert_eq!(cycles[0].end_date, Some(date("2026-01-04")));
        assert_eq!(cycles[1].start_date, date("2026-01-29"));
        assert_eq!(cycles[1].end_date, Some(date("2026-01-30")));
    }

    #[test]
    fn recent_period_stays_open() {
        let cycles = rebuild_cycles(&two_periods(), date("2026-01-31"), 2);
        assert_eq!(cycles[1].end_date, None);
    }

    #[test]
    fn current_cycle_day_counts_from_latest_start() {
        let cycles = rebuild_cycles(&two_periods(), date("2026-02-10"), 2);
        assert_eq!(current_cycle_day(&cycles, date("2026-01-29")), Some(1));
        assert_eq!(current_cycle_day(&cycles, date("2026-02-10")), Some(13));
        assert_eq!(current_cycle_day(&cycles, date("2026-01-20")), None);
        assert_eq!(current_cycle_day(&[], date("2026-01-20")), None);
    }

    #[test]
    fn anchor_defaults_to_day_one() {
        let a = anchor(&[], date("2026-03-01"));
        assert_eq!(a.current_cycle_day, 1);
        assert_eq!(a.reference_date, date("2026-03-01"));
    }

    #[test]
    fn active_entries_exclude_previous_cycle_and_future() {
        let mut entries = two_periods();
        entries.push(CycleEntry {
            opk: Some(OpkResult::High),
            ..CycleEntry::new(date("2026-02-20"))
        });
        let cycles = rebuild_cycles(&entries, date("2026-02-10"), 2);
        let active = active_entries(&cycles, &entries, date("2026-02-10"));
        let dates: Vec<NaiveDate> = active.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![date("2026-01-29"), date("2026-01-30")]);
    }

    #[test]
    fn summaries_use_consecutive_starts() {
        let cycles = vec![
            make_cycle("2026-01-01", Some("2026-01-05")),
            make_cycle("2026-01-29", Some("2026-02-02")),
            make_cycle("2026-02-28", None),
        ];
        let summaries = cycle_summaries(&cycles, &[], &OvulationPredictor::default());
        assert_eq!(
            summaries,
            vec![
                CycleSummary { cycle_length: 28, ovulation_day: None },
                CycleSummary { cycle_length: 30, ovulation_day: None },
            ]
        );
    }

    #[test]
    fn summaries_pick_up_thermal_shift() {
        let cycles = vec![
            make_cycle("2026-01-01", Some("2026-01-05")),
            make_cycle("2026-01-29", None),
        ];
        let temps = [97.6, 97.7, 97.6, 97.7, 98.2, 98.3, 98.3];
        let entries: Vec<CycleEntry> = temps
            .iter()
            .enumerate()
            .map(|(i, &t)| CycleEntry {
                bbt: Some(t),
                ..CycleEntry::new(date("2026-01-10") + Duration::days(i as i64))
            })
            .collect();
        let summaries = cycle_summaries(&cycles, &entries, &OvulationPredictor::default());
        // Last low reading is 2026-01-13, cycle day 13.
        assert_eq!(summaries[0].ovulation_day, Some(13));
    }

    #[test]
    fn summaries_scan_the_whole_chart() {
        let cycles = vec![
            make_cycle("2026-01-01", Some("2026-01-05")),
            make_cycle("2026-01-29", None),
        ];
        let entries: Vec<CycleEntry> = (0..28)
            .map(|i| CycleEntry {
                bbt: Some(if i < 14 { 97.5 } else { 98.2 }),
                ..CycleEntry::new(date("2026-01-01") + Duration::days(i))
            })
            .collect();
        let predictor = OvulationPredictor::default();

        // The last ten readings are all high, so a recent-only scan sees no rise.
        assert_eq!(predictor.detect_thermal_shift(&entries), None);

        let summaries = cycle_summaries(&cycles, &entries, &predictor);
        assert_eq!(
            summaries,
            vec![CycleSummary {
                cycle_length: 28,
                ovulation_day: Some(14),
            }]
        );
    }

    #[test]
    fn cycle_stats_computed() {
        let cycles = vec![
            make_cycle("2026-01-01", Some("2026-01-05")),
            make_cycle("2026-01-29", Some("2026-02-02")),
        ];
        let stats = cycle_stats(&cycles, &two_periods());
        assert_eq!(stats.total_cycles, 2);
        assert_eq!(stats.avg_cycle_length, Some(28.0));
        assert_eq!(stats.avg_period_length, Some(5.0));
        assert_eq!(stats.last_period_start, Some(date("2026-01-29")));
        assert_eq!(stats.entries_with_flow, 5);
        assert_eq!(stats.entries_with_bbt, 0);
    }

    #[test]
    fn empty_stats() {
        let stats = cycle_stats(&[], &[]);
        assert_eq!(stats.total_cycles, 0);
        assert_eq!(stats.avg_cycle_length, None);
        assert_eq!(stats.last_period_start, None);
    }

    #[test]
    fn fertility_window_maps_to_dates() {
        let mut prediction = OvulationPrediction::undetermined(PredictionMethod::CycleLength, "");
        prediction.predicted_day = Some(14);
        prediction.fertile_window_start = Some(9);
        prediction.fertile_window_end = Some(15);
        prediction.confidence = Confidence::Medium;

        let fw = fertility_window(&prediction, date("2026-02-01")).unwrap();
        assert_eq!(fw.ovulation_day, date("2026-02-14"));
        assert_eq!(fw.fertile_start, date("2026-02-09"));
        assert_eq!(fw.fertile_end, date("2026-02-15"));
        assert_eq!(fw.peak_start, date("2026-02-12"));
    }

    #[test]
    fn no_window_without_a_day() {
        let prediction = OvulationPrediction::undetermined(PredictionMethod::CycleLength, "");
        assert!(fertility_window(&prediction, date("2026-02-01")).is_none());
    }
}
