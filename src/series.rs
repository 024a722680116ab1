use chrono::{Duration, NaiveDate};

use crate::models::{RawRecord, WeeklyPoint, WeeklySeries};
use crate::week;

/// A registration week has to reach this many paid records before the
/// campaign is considered underway.
pub const MIN_WEEKLY_REGISTRATIONS: usize = 10;

/// Build the cumulative weekly curve for one group and metric.
///
/// Paid records with a resolvable date are bucketed by week-ending Friday and
/// accumulated in calendar order. The window pads one week past the observed
/// min/max, is cut at `window_start` on the left, and extends to one week
/// past the event date on the right when the event lies beyond the data.
/// No records, or an inverted window, yields an empty series rather than an
/// error.
pub fn build_series(
    records: &[RawRecord],
    event_date: Option<NaiveDate>,
    window_start: Option<NaiveDate>,
) -> WeeklySeries {
    let dated: Vec<(NaiveDate, f64)> = records
        .iter()
        .filter(|record| record.is_paid && record.amount != 0.0 && record.amount.is_finite())
        .filter_map(|record| record.resolved_date().map(|date| (date, record.amount)))
        .collect();

    if dated.is_empty() {
        return WeeklySeries::default();
    }

    let mut min_date = dated[0].0;
    let mut max_date = dated[0].0;
    for (date, _) in &dated {
        if *date < min_date {
            min_date = *date;
        }
        if *date > max_date {
            max_date = *date;
        }
    }

    let padded_min = min_date - Duration::weeks(1);
    let padded_max = max_date + Duration::weeks(1);
    let start = match window_start {
        Some(limit) if limit > padded_min => limit,
        _ => padded_min,
    };
    let end = match event_date {
        Some(event) => {
            let event_padded = event + Duration::weeks(1);
            if event_padded > padded_max {
                event_padded
            } else {
                padded_max
            }
        }
        None => padded_max,
    };

    if end < start {
        return WeeklySeries::default();
    }

    let first_friday = week::week_ending(start);
    let last_friday = week::week_ending(end);
    let event_week_ending = event_date.map(week::week_ending).unwrap_or(last_friday);
    let week_count = ((last_friday - first_friday).num_days() / 7) as usize + 1;

    // Per-week sums live in a slot-indexed vector so a missing week is just a
    // zero slot, never an ambiguous map miss.
    let mut added_by_slot = vec![0.0f64; week_count];
    for (date, amount) in &dated {
        let friday = week::week_ending(*date);
        if friday < first_friday || friday > last_friday {
            continue;
        }
        let slot = ((friday - first_friday).num_days() / 7) as usize;
        if let Some(bucket) = added_by_slot.get_mut(slot) {
            *bucket += amount;
        }
    }

    let mut points = Vec::with_capacity(week_count);
    let mut cumulative = 0.0;
    for (slot, added) in added_by_slot.iter().enumerate() {
        cumulative += added;
        let friday = first_friday + Duration::weeks(slot as i64);
        points.push(WeeklyPoint {
            week_ending: friday,
            cumulative,
            weeks_before_event: week::weeks_before_event(friday, event_week_ending),
        });
    }

    let last_data_friday = week::week_ending(max_date);
    let last_data_index = points
        .iter()
        .position(|point| point.week_ending == last_data_friday);

    WeeklySeries {
        points,
        total: cumulative,
        last_data_index,
    }
}

/// Where the campaign actually starts: one week before the first week with at
/// least `min_per_week` paid records. Trickle registrations from the long
/// pre-launch tail would otherwise stretch the chart back months.
pub fn campaign_start(records: &[RawRecord], min_per_week: usize) -> Option<NaiveDate> {
    let mut count_by_week = std::collections::BTreeMap::new();
    for record in records {
        if !record.is_paid {
            continue;
        }
        let Some(date) = record.resolved_date() else {
            continue;
        };
        *count_by_week.entry(week::week_ending(date)).or_insert(0usize) += 1;
    }

    count_by_week
        .into_iter()
        .find(|(_, count)| *count >= min_per_week)
        .map(|(friday, _)| friday - Duration::weeks(1))
}
