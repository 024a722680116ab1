use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};

use crate::models::{DiscountWindow, WeeklySeries};
use crate::week;

/// One primary point joined with the comparison values that share its week
/// index. `others` keeps the caller's ordering; a missing index is `None`,
/// which downstream must keep distinct from zero progress.
#[derive(Debug, Clone)]
pub struct AlignedRow {
    pub week_index: i32,
    pub week_ending: NaiveDate,
    pub primary: f64,
    pub others: Vec<Option<f64>>,
}

/// Re-index comparison curves onto the primary curve's week axis.
///
/// The join key is `weeks_before_event` alone. Curves from different years
/// with different calendar dates and lengths become comparable here; any
/// day-level offset was already applied by shifting the comparison's event
/// date before its series was built.
pub fn align(primary: &WeeklySeries, others: &[Option<&WeeklySeries>]) -> Vec<AlignedRow> {
    let lookups: Vec<Option<BTreeMap<i32, f64>>> = others
        .iter()
        .map(|other| {
            other.map(|series| {
                series
                    .points
                    .iter()
                    .map(|point| (point.weeks_before_event, point.cumulative))
                    .collect()
            })
        })
        .collect();

    primary
        .points
        .iter()
        .map(|point| AlignedRow {
            week_index: point.weeks_before_event,
            week_ending: point.week_ending,
            primary: point.cumulative,
            others: lookups
                .iter()
                .map(|lookup| {
                    lookup
                        .as_ref()
                        .and_then(|values| values.get(&point.weeks_before_event).copied())
                })
                .collect(),
        })
        .collect()
}

/// Map price-window boundaries onto the week axis, grouped by index.
///
/// `offset_days` shifts the event anchor the same way the comparison series
/// was shifted, so a comparison's markers stay glued to its curve. Windows
/// that land outside `valid_indexes` are dropped.
pub fn discount_markers(
    windows: &[DiscountWindow],
    event_date: Option<NaiveDate>,
    valid_indexes: &BTreeSet<i32>,
    offset_days: i64,
) -> BTreeMap<i32, Vec<String>> {
    let mut markers: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    let Some(event_date) = event_date else {
        return markers;
    };
    let event_week_ending = week::week_ending(event_date + Duration::days(offset_days));

    for window in windows {
        let Some(ends_at) = window.ends_at else {
            continue;
        };
        let week_index = week::weeks_before_event(ends_at.date(), event_week_ending);
        if !valid_indexes.contains(&week_index) {
            continue;
        }
        let label = window
            .label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or("Price change");
        markers.entry(week_index).or_default().push(label.to_string());
    }

    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use crate::series::build_series;

    fn record(date: &str, amount: f64) -> RawRecord {
        RawRecord {
            paid_at: week::parse_civil_datetime(date),
            created_at: None,
            is_paid: true,
            amount,
        }
    }

    fn date(value: &str) -> NaiveDate {
        week::parse_civil_datetime(value).unwrap().date()
    }

    fn shifted(records: &[RawRecord], days: i64) -> Vec<RawRecord> {
        records
            .iter()
            .map(|r| RawRecord {
                paid_at: r.paid_at.map(|dt| dt + Duration::days(days)),
                created_at: r.created_at.map(|dt| dt + Duration::days(days)),
                is_paid: r.is_paid,
                amount: r.amount,
            })
            .collect()
    }

    #[test]
    fn missing_indexes_stay_none_not_zero() {
        let primary = build_series(
            &[record("2025-04-04", 1.0), record("2025-05-23", 1.0)],
            Some(date("2025-05-23")),
            None,
        );
        let compare = build_series(
            &[record("2024-05-17", 2.0), record("2024-05-24", 1.0)],
            Some(date("2024-05-24")),
            None,
        );

        let rows = align(&primary, &[Some(&compare), None]);
        assert_eq!(rows.len(), primary.points.len());

        // Primary reaches back eight weeks; the short comparison has no data
        // there, and the absent second comparison contributes nothing ever.
        let far_out = rows.iter().find(|row| row.week_index == 6).unwrap();
        assert_eq!(far_out.others[0], None);
        assert_eq!(far_out.others[1], None);

        let event_week = rows.iter().find(|row| row.week_index == 0).unwrap();
        assert_eq!(event_week.others[0], Some(3.0));

        // The comparison's padded lead-in week holds a real zero.
        let lead_in = rows.iter().find(|row| row.week_index == 2).unwrap();
        assert_eq!(lead_in.others[0], Some(0.0));
    }

    #[test]
    fn alignment_is_stable_under_a_whole_year_shift() {
        let records = vec![
            record("2024-03-08", 2.0),
            record("2024-03-22", 1.0),
            record("2024-04-12", 4.0),
        ];
        let event = date("2024-04-19");

        let original = build_series(&records, Some(event), None);
        let replayed = build_series(
            &shifted(&records, 364),
            Some(event + Duration::days(364)),
            None,
        );

        assert_eq!(original.points.len(), replayed.points.len());
        for (a, b) in original.points.iter().zip(replayed.points.iter()) {
            assert_eq!(a.weeks_before_event, b.weeks_before_event);
            assert_eq!(a.cumulative, b.cumulative);
        }
    }

    #[test]
    fn offsetting_by_seven_days_moves_markers_one_index() {
        let windows = vec![DiscountWindow {
            label: Some("Early bird".to_string()),
            starts_at: week::parse_civil_datetime("2025-03-01"),
            ends_at: week::parse_civil_datetime("2025-04-11"),
        }];
        let event = Some(date("2025-05-23"));
        let valid: BTreeSet<i32> = (-2..=10).collect();

        let unshifted = discount_markers(&windows, event, &valid, 0);
        let shifted = discount_markers(&windows, event, &valid, 7);

        assert_eq!(unshifted.keys().copied().collect::<Vec<_>>(), vec![6]);
        assert_eq!(shifted.keys().copied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn out_of_range_markers_are_dropped() {
        let windows = vec![DiscountWindow {
            label: Some("Flash sale".to_string()),
            starts_at: None,
            ends_at: week::parse_civil_datetime("2020-01-10"),
        }];
        let valid: BTreeSet<i32> = (-2..=10).collect();
        let markers = discount_markers(&windows, Some(date("2025-05-23")), &valid, 0);
        assert!(markers.is_empty());
    }

    #[test]
    fn blank_labels_fall_back_to_price_change() {
        let windows = vec![DiscountWindow {
            label: Some("   ".to_string()),
            starts_at: None,
            ends_at: week::parse_civil_datetime("2025-05-16"),
        }];
        let valid: BTreeSet<i32> = (-2..=10).collect();
        let markers = discount_markers(&windows, Some(date("2025-05-23")), &valid, 0);
        assert_eq!(markers.get(&1).unwrap(), &vec!["Price change".to_string()]);
    }

    #[test]
    fn markers_without_an_event_date_are_empty() {
        let windows = vec![DiscountWindow {
            label: Some("Early bird".to_string()),
            starts_at: None,
            ends_at: week::parse_civil_datetime("2025-04-11"),
        }];
        let valid: BTreeSet<i32> = (-2..=10).collect();
        assert!(discount_markers(&windows, None, &valid, 0).is_empty());
    }
}
