use std::collections::BTreeMap;

use crate::models::{CombineMode, ProjectionResult, WeeklySeries, WeightedSource};

/// Weeks over which the projected curve ramps out of the actuals.
pub const RAMP_WEEKS: i32 = 3;
/// Trailing window, in week indexes, for the recent-trend scale.
pub const RECENT_TREND_WINDOW: usize = 4;

#[derive(Debug, Clone)]
pub struct ProjectionParams {
    /// Week index treated as "today". Must exist in the primary series for a
    /// projection to be produced.
    pub pivot_index: i32,
    pub combine: CombineMode,
    /// Clamp applied to the recent-trend scale before it shapes the curve.
    pub recent_scale_bounds: (f64, f64),
    /// Optional cap on the projected final total, as a multiple of the
    /// baseline final total. The per-week curve is not re-scaled by the cap.
    pub final_total_cap: Option<f64>,
}

/// Combine the prior-year curves into one baseline value per primary index.
///
/// Sources with weight 0 are excluded outright. A source missing an index
/// drops out of that index's combination entirely; it is not treated as zero.
/// Indexes where no source has a value stay `None`.
pub fn baseline(
    primary: &WeeklySeries,
    sources: &[WeightedSource],
    combine: CombineMode,
) -> Vec<Option<f64>> {
    for source in sources {
        debug_assert!(
            source.weight >= 0.0,
            "projection source weights must be non-negative"
        );
    }

    let active: Vec<(BTreeMap<i32, f64>, f64)> = sources
        .iter()
        .filter(|source| source.weight > 0.0)
        .map(|source| {
            let lookup = source
                .series
                .points
                .iter()
                .map(|point| (point.weeks_before_event, point.cumulative))
                .collect();
            (lookup, source.weight)
        })
        .collect();

    if active.is_empty() {
        return vec![None; primary.points.len()];
    }

    primary
        .points
        .iter()
        .map(|point| match combine {
            CombineMode::WeightedAverage => {
                let mut weighted_sum = 0.0;
                let mut weight_total = 0.0;
                for (lookup, weight) in &active {
                    if let Some(value) = lookup.get(&point.weeks_before_event) {
                        weighted_sum += value * weight;
                        weight_total += weight;
                    }
                }
                if weight_total == 0.0 {
                    None
                } else {
                    Some(weighted_sum / weight_total)
                }
            }
            CombineMode::WeightedMedian => {
                let mut values: Vec<f64> = active
                    .iter()
                    .filter_map(|(lookup, _)| lookup.get(&point.weeks_before_event).copied())
                    .collect();
                if values.is_empty() {
                    return None;
                }
                values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let mid = values.len() / 2;
                if values.len() % 2 == 1 {
                    Some(values[mid])
                } else {
                    Some((values[mid - 1] + values[mid]) / 2.0)
                }
            }
        })
        .collect()
}

fn last_non_null(values: &[Option<f64>]) -> Option<f64> {
    values.iter().rev().find_map(|value| *value)
}

/// Project the rest of the campaign from the baseline shape.
///
/// The baseline is scaled so its pivot value meets the actual curve, a
/// separately clamped recent-trend scale shapes the remaining weeks, and the
/// result ramps out of the actuals over the final weeks before the pivot so
/// the seam is invisible. Each projected week is floored at the previous
/// projected week and at the pivot actual. Any insufficient basis degrades to
/// `ProjectionResult::none()`.
pub fn project(
    primary: &WeeklySeries,
    sources: &[WeightedSource],
    params: &ProjectionParams,
) -> ProjectionResult {
    let baseline = baseline(primary, sources, params.combine);
    let Some(baseline_total) = last_non_null(&baseline) else {
        return ProjectionResult::none();
    };
    let Some(pivot_pos) = primary.position_of(params.pivot_index) else {
        return ProjectionResult::none();
    };

    let primary_at_pivot = primary.points[pivot_pos].cumulative;
    let Some(baseline_at_pivot) = baseline[pivot_pos].filter(|value| *value > 0.0) else {
        return ProjectionResult::none();
    };

    let scale_at_pivot = primary_at_pivot / baseline_at_pivot;
    let mut projected_final_total = baseline_total * scale_at_pivot;
    if let Some(cap) = params.final_total_cap {
        let limit = baseline_total * cap;
        if projected_final_total > limit {
            projected_final_total = limit;
        }
    }

    let recent_start = pivot_pos.saturating_sub(RECENT_TREND_WINDOW);
    let primary_recent_delta = primary_at_pivot - primary.points[recent_start].cumulative;
    let baseline_recent_delta = baseline_at_pivot - baseline[recent_start].unwrap_or(0.0);
    let scale_recent_trend = if baseline_recent_delta > 0.0 {
        primary_recent_delta / baseline_recent_delta
    } else {
        1.0
    };

    let (low, high) = params.recent_scale_bounds;
    let clamped_recent = scale_recent_trend.clamp(low, high);

    let mut per_week = Vec::with_capacity(primary.points.len());
    let mut last_projected: Option<f64> = None;
    for (pos, point) in primary.points.iter().enumerate() {
        let week_index = point.weeks_before_event;
        if week_index > params.pivot_index {
            per_week.push(None);
            continue;
        }
        let Some(baseline_value) = baseline[pos] else {
            per_week.push(None);
            continue;
        };

        let anchor = if week_index == params.pivot_index {
            primary_at_pivot
        } else {
            baseline_at_pivot * scale_at_pivot
        };
        let base_projection = (baseline_value - baseline_at_pivot) * clamped_recent + anchor;

        let ramp_progress = if week_index >= params.pivot_index - RAMP_WEEKS {
            (params.pivot_index - week_index) as f64 / RAMP_WEEKS as f64
        } else {
            1.0
        };
        let ramp = ramp_progress.clamp(0.0, 1.0);
        let blended = point.cumulative * (1.0 - ramp) + base_projection * ramp;

        let mut projected = blended;
        if let Some(previous) = last_projected {
            if previous > projected {
                projected = previous;
            }
        }
        if week_index == params.pivot_index && primary_at_pivot > projected {
            projected = primary_at_pivot;
        }

        last_projected = Some(projected);
        per_week.push(Some(projected));
    }

    ProjectionResult {
        per_week,
        projected_final_total: Some(projected_final_total),
        scale_at_pivot,
        scale_recent_trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metric, WeeklyPoint};
    use chrono::{Duration, NaiveDate};

    fn series_from(values: &[f64], event_pos: usize) -> WeeklySeries {
        let first = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let points: Vec<WeeklyPoint> = values
            .iter()
            .enumerate()
            .map(|(pos, value)| WeeklyPoint {
                week_ending: first + Duration::weeks(pos as i64),
                cumulative: *value,
                weeks_before_event: event_pos as i32 - pos as i32,
            })
            .collect();
        let total = values.last().copied().unwrap_or(0.0);
        let last_data_index = if points.is_empty() {
            None
        } else {
            Some(points.len() - 1)
        };
        WeeklySeries {
            points,
            total,
            last_data_index,
        }
    }

    fn source(values: &[f64], event_pos: usize, weight: f64) -> WeightedSource {
        WeightedSource {
            series: series_from(values, event_pos),
            weight,
        }
    }

    fn params(pivot_index: i32, metric: Metric) -> ProjectionParams {
        ProjectionParams {
            pivot_index,
            combine: metric.default_combine(),
            recent_scale_bounds: metric.recent_scale_bounds(),
            final_total_cap: metric.final_total_cap(),
        }
    }

    #[test]
    fn weighted_average_and_median_disagree_as_expected() {
        let primary = series_from(&[10.0, 20.0, 30.0], 2);
        let sources = vec![
            source(&[100.0, 100.0, 100.0], 2, 0.6),
            source(&[50.0, 50.0, 50.0], 2, 0.3),
        ];

        let average = baseline(&primary, &sources, CombineMode::WeightedAverage);
        let expected = (100.0 * 0.6 + 50.0 * 0.3) / 0.9;
        assert!((average[0].unwrap() - expected).abs() < 1e-9);
        assert!((expected - 83.33).abs() < 0.01);

        let median = baseline(&primary, &sources, CombineMode::WeightedMedian);
        assert_eq!(median[0], Some(75.0));
    }

    #[test]
    fn sources_missing_an_index_drop_out_of_the_combination() {
        let primary = series_from(&[10.0, 20.0, 30.0], 2);
        // Short source only covers the event week (index 0).
        let short = WeightedSource {
            series: series_from(&[90.0], 0),
            weight: 0.3,
        };
        let sources = vec![source(&[40.0, 60.0, 80.0], 2, 0.6), short];

        let combined = baseline(&primary, &sources, CombineMode::WeightedAverage);
        assert_eq!(combined[0], Some(40.0));
        assert_eq!(combined[1], Some(60.0));
        let at_event = combined[2].unwrap();
        let expected = (80.0 * 0.6 + 90.0 * 0.3) / 0.9;
        assert!((at_event - expected).abs() < 1e-9);
    }

    #[test]
    fn zero_weights_produce_no_projection() {
        let primary = series_from(&[10.0, 20.0, 30.0], 2);
        let sources = vec![
            source(&[40.0, 60.0, 80.0], 2, 0.0),
            source(&[45.0, 65.0, 85.0], 2, 0.0),
        ];
        let result = project(&primary, &sources, &params(1, Metric::Registrations));
        assert!(result.is_none());
        assert!(result.per_week.is_empty());
        assert_eq!(result.scale_at_pivot, 1.0);
        assert_eq!(result.scale_recent_trend, 1.0);
    }

    #[test]
    fn pivot_scaling_matches_the_actual_curve() {
        // Primary runs at exactly half the baseline.
        let primary = series_from(&[5.0, 10.0, 15.0, 20.0, 25.0, 30.0], 5);
        let sources = vec![source(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0], 5, 0.6)];
        let result = project(&primary, &sources, &params(2, Metric::Registrations));

        assert!((result.scale_at_pivot - 0.5).abs() < 1e-9);
        assert_eq!(result.projected_final_total, Some(30.0));
        // At the pivot the projection meets the actual curve.
        let pivot_pos = primary.position_of(2).unwrap();
        assert_eq!(result.per_week[pivot_pos], Some(20.0));
        // Weeks before the pivot carry no projection.
        assert_eq!(result.per_week[0], None);
        assert_eq!(result.per_week[1], None);
    }

    #[test]
    fn missing_baseline_at_pivot_degrades_to_none() {
        let primary = series_from(&[10.0, 20.0, 30.0], 2);
        // Source only covers the event week; the pivot at index 2 has no basis.
        let sources = vec![WeightedSource {
            series: series_from(&[90.0], 0),
            weight: 0.6,
        }];
        let result = project(&primary, &sources, &params(2, Metric::Registrations));
        assert!(result.is_none());
        assert!(result.per_week.is_empty());
    }

    #[test]
    fn unresolvable_pivot_degrades_to_none() {
        let primary = series_from(&[10.0, 20.0, 30.0], 2);
        let sources = vec![source(&[40.0, 60.0, 80.0], 2, 0.6)];
        let result = project(&primary, &sources, &params(40, Metric::Registrations));
        assert!(result.is_none());
    }

    #[test]
    fn projection_never_regresses() {
        // A baseline that dips after the pivot would otherwise drag the
        // projection below already-known totals.
        let primary = series_from(&[50.0, 60.0, 70.0, 80.0, 90.0, 100.0], 5);
        let sources = vec![source(&[55.0, 62.0, 75.0, 70.0, 65.0, 72.0], 5, 0.6)];
        let result = project(&primary, &sources, &params(3, Metric::Registrations));

        let pivot_pos = primary.position_of(3).unwrap();
        let actual_at_pivot = primary.points[pivot_pos].cumulative;
        assert!(result.per_week[pivot_pos].unwrap() >= actual_at_pivot);

        let mut previous: Option<f64> = None;
        for value in result.per_week.iter().flatten() {
            if let Some(previous) = previous {
                assert!(*value >= previous);
            }
            previous = Some(*value);
        }
    }

    #[test]
    fn recent_trend_scale_reports_raw_but_applies_clamped() {
        // Primary sprints over the trailing window at 3x the baseline rate.
        let primary = series_from(&[10.0, 40.0, 70.0, 100.0, 130.0], 4);
        let sources = vec![source(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0], 6, 0.6)];
        let result = project(&primary, &sources, &params(0, Metric::Registrations));

        assert!((result.scale_recent_trend - 3.0).abs() < 1e-9);
        assert!(!result.is_none());
    }

    #[test]
    fn donations_cap_limits_the_headline_total() {
        // Primary runs far ahead of the baseline at the pivot.
        let primary = series_from(&[100.0, 200.0, 300.0], 2);
        let sources = vec![source(&[50.0, 60.0, 70.0], 2, 0.6)];
        let result = project(&primary, &sources, &params(1, Metric::Donations));

        // Uncapped would be 70 * (200/60) = 233.33; the cap is 1.1 * 70.
        assert_eq!(result.projected_final_total, Some(77.0));
    }
}
