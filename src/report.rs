use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::align;
use crate::models::{
    ChartRow, CombineMode, GroupData, Metric, ProjectionResult, RawRecord, ReportSummary,
    WeeklySeries, WeightedSource,
};
use crate::projection::{self, ProjectionParams};
use crate::series::{self, MIN_WEEKLY_REGISTRATIONS};
use crate::week;

/// Everything the caller chose about this render.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub category: String,
    pub year: i32,
    pub compare_year: Option<i32>,
    pub compare2_year: Option<i32>,
    pub offset_days: i64,
    /// `Some` means a projection was requested as of this date.
    pub projection_date: Option<NaiveDate>,
    pub combine_override: Option<CombineMode>,
    pub source_weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSection {
    pub metric: Metric,
    pub rows: Vec<ChartRow>,
    pub summary: ReportSummary,
}

/// The full render handed to the dashboard: both metrics, merged, annotated,
/// and possibly projected.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignReport {
    pub category: String,
    pub year: i32,
    pub event_date: Option<NaiveDate>,
    pub compare_year: Option<i32>,
    pub compare2_year: Option<i32>,
    pub offset_days: i64,
    pub projection_date: Option<NaiveDate>,
    pub registrations: MetricSection,
    pub donations: MetricSection,
}

pub fn week_label(week_index: i32) -> String {
    if week_index == 0 {
        "Event".to_string()
    } else if week_index < 0 {
        format!("{}w after", -week_index)
    } else {
        format!("{}w", week_index)
    }
}

/// Assemble the whole report from freshly fetched group data. Pure and
/// deterministic: same inputs and config, same output, bit for bit.
pub fn build_campaign_report(
    config: &ReportConfig,
    primary: &GroupData,
    compare: Option<&GroupData>,
    compare2: Option<&GroupData>,
    sources: &[&GroupData],
) -> CampaignReport {
    CampaignReport {
        category: config.category.clone(),
        year: config.year,
        event_date: primary.event_date,
        compare_year: compare.and(config.compare_year),
        compare2_year: compare2.and(config.compare2_year),
        offset_days: config.offset_days,
        projection_date: config.projection_date,
        registrations: build_metric_section(
            Metric::Registrations,
            config,
            primary,
            compare,
            compare2,
            sources,
        ),
        donations: build_metric_section(
            Metric::Donations,
            config,
            primary,
            compare,
            compare2,
            sources,
        ),
    }
}

fn metric_records(metric: Metric, data: &GroupData) -> &[RawRecord] {
    match metric {
        Metric::Registrations => &data.entries,
        Metric::Donations => &data.donations,
    }
}

fn metric_window(metric: Metric, data: &GroupData) -> Option<NaiveDate> {
    match metric {
        Metric::Registrations => series::campaign_start(&data.entries, MIN_WEEKLY_REGISTRATIONS),
        Metric::Donations => None,
    }
}

fn build_metric_section(
    metric: Metric,
    config: &ReportConfig,
    primary: &GroupData,
    compare: Option<&GroupData>,
    compare2: Option<&GroupData>,
    sources: &[&GroupData],
) -> MetricSection {
    let primary_series = series::build_series(
        metric_records(metric, primary),
        primary.event_date,
        metric_window(metric, primary),
    );

    let offset = Duration::days(config.offset_days);
    let build_comparison = |data: &GroupData| {
        series::build_series(
            metric_records(metric, data),
            data.event_date.map(|date| date + offset),
            metric_window(metric, data),
        )
    };
    let compare_series = compare.map(build_comparison);
    let compare2_series = compare2.map(build_comparison);

    let weighted: Vec<WeightedSource> = sources
        .iter()
        .enumerate()
        .map(|(pos, data)| WeightedSource {
            series: series::build_series(
                metric_records(metric, data),
                data.event_date,
                metric_window(metric, data),
            ),
            weight: config.source_weights.get(pos).copied().unwrap_or(0.0),
        })
        .filter(|source| source.weight > 0.0)
        .collect();

    let pivot_index = match (config.projection_date, primary.event_date) {
        (Some(as_of), Some(event)) => {
            Some(week::weeks_before_event(as_of, week::week_ending(event)))
        }
        _ => None,
    };

    let projection = match pivot_index {
        Some(pivot) => projection::project(
            &primary_series,
            &weighted,
            &ProjectionParams {
                pivot_index: pivot,
                combine: config.combine_override.unwrap_or(metric.default_combine()),
                recent_scale_bounds: metric.recent_scale_bounds(),
                final_total_cap: metric.final_total_cap(),
            },
        ),
        None => ProjectionResult::none(),
    };

    let valid_indexes: BTreeSet<i32> = primary_series
        .points
        .iter()
        .map(|point| point.weeks_before_event)
        .collect();
    let (markers_primary, markers_compare) = match metric {
        Metric::Registrations => (
            align::discount_markers(&primary.discounts, primary.event_date, &valid_indexes, 0),
            compare
                .map(|data| {
                    align::discount_markers(
                        &data.discounts,
                        data.event_date,
                        &valid_indexes,
                        config.offset_days,
                    )
                })
                .unwrap_or_default(),
        ),
        Metric::Donations => (BTreeMap::new(), BTreeMap::new()),
    };

    let mut rows = chart_rows(
        &primary_series,
        compare_series.as_ref(),
        compare2_series.as_ref(),
        &projection,
        pivot_index,
        &markers_primary,
        &markers_compare,
    );
    append_event_marker(&mut rows, primary.event_date);

    let summary = summarize(
        &primary_series,
        &rows,
        &projection,
        pivot_index,
        compare_series.as_ref(),
        compare2_series.as_ref(),
    );

    MetricSection {
        metric,
        rows,
        summary,
    }
}

/// Merge the aligned series, projection, and markers into render-ready rows.
/// While a projection is active, actuals past the pivot are withheld so the
/// dashed curve carries the chart from "now" to the event.
pub fn chart_rows(
    primary: &WeeklySeries,
    compare: Option<&WeeklySeries>,
    compare2: Option<&WeeklySeries>,
    projection: &ProjectionResult,
    pivot_index: Option<i32>,
    markers_primary: &BTreeMap<i32, Vec<String>>,
    markers_compare: &BTreeMap<i32, Vec<String>>,
) -> Vec<ChartRow> {
    let aligned = align::align(primary, &[compare, compare2]);
    let has_projection = !projection.per_week.is_empty();

    aligned
        .into_iter()
        .enumerate()
        .map(|(pos, row)| {
            let projected = projection.per_week.get(pos).copied().flatten();
            let primary_value = match pivot_index {
                Some(pivot) if has_projection && row.week_index < pivot => None,
                _ => Some(row.primary),
            };
            ChartRow {
                week_index: row.week_index,
                week_label: week_label(row.week_index),
                week_ending: row.week_ending,
                primary: primary_value,
                compare: row.others.first().copied().flatten(),
                compare2: row.others.get(1).copied().flatten(),
                projection: projected,
                markers_primary: markers_primary
                    .get(&row.week_index)
                    .cloned()
                    .unwrap_or_default(),
                markers_compare: markers_compare
                    .get(&row.week_index)
                    .cloned()
                    .unwrap_or_default(),
            }
        })
        .collect()
}

fn append_event_marker(rows: &mut [ChartRow], event_date: Option<NaiveDate>) {
    if event_date.is_none() {
        return;
    }
    if let Some(row) = rows.iter_mut().find(|row| row.week_index == 0) {
        if row.primary.is_some() || row.projection.is_some() {
            row.markers_primary.push("Event day".to_string());
        }
    }
}

pub fn summarize(
    primary: &WeeklySeries,
    rows: &[ChartRow],
    projection: &ProjectionResult,
    pivot_index: Option<i32>,
    compare: Option<&WeeklySeries>,
    compare2: Option<&WeeklySeries>,
) -> ReportSummary {
    let current_pos = pivot_index
        .and_then(|pivot| primary.position_of(pivot))
        .or(primary.last_data_index)
        .unwrap_or(primary.points.len().saturating_sub(1));

    let current_total = primary
        .points
        .get(current_pos)
        .map(|point| point.cumulative)
        .unwrap_or(primary.total);

    ReportSummary {
        current_total,
        projected_total: projection.projected_final_total,
        primary_total: primary.total,
        compare_total: compare.map(|series| series.total),
        compare2_total: compare2.map(|series| series.total),
        compare_at_current: compare.and(rows.get(current_pos).and_then(|row| row.compare)),
        compare2_at_current: compare2.and(rows.get(current_pos).and_then(|row| row.compare2)),
        scale_at_pivot: projection
            .projected_final_total
            .map(|_| projection.scale_at_pivot),
        scale_recent_trend: projection
            .projected_final_total
            .map(|_| projection.scale_recent_trend),
    }
}

fn format_value(metric: Metric, value: f64) -> String {
    match metric {
        Metric::Registrations => format!("{:.0}", value),
        Metric::Donations => format!("${:.2}", value),
    }
}

fn format_optional(metric: Metric, value: Option<f64>) -> String {
    match value {
        Some(value) => format_value(metric, value),
        None => "-".to_string(),
    }
}

pub fn render_markdown(report: &CampaignReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {} {} Campaign Pace", report.category, report.year);
    match report.event_date {
        Some(date) => {
            let _ = writeln!(output, "Event date: {}", date.format("%a %-d %b %Y"));
        }
        None => {
            let _ = writeln!(output, "Event date: TBD");
        }
    }
    if let Some(year) = report.compare_year {
        if report.offset_days != 0 {
            let _ = writeln!(
                output,
                "Compared with {} (aligned {:+} days)",
                year, report.offset_days
            );
        } else {
            let _ = writeln!(output, "Compared with {}", year);
        }
    }
    if let Some(year) = report.compare2_year {
        let _ = writeln!(output, "Also compared with {}", year);
    }
    if let Some(date) = report.projection_date {
        let _ = writeln!(output, "Projection as of {}", date.format("%a %-d %b %Y"));
    }

    render_section(&mut output, report, &report.registrations, "Registrations");
    render_section(&mut output, report, &report.donations, "Donations");

    output
}

fn render_section(
    output: &mut String,
    report: &CampaignReport,
    section: &MetricSection,
    title: &str,
) {
    let metric = section.metric;
    let summary = &section.summary;

    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");

    let _ = writeln!(
        output,
        "Current: {}",
        format_value(metric, summary.current_total)
    );
    if let Some(projected) = summary.projected_total {
        let _ = writeln!(
            output,
            "Projected final: {} (pivot scale {:.2}, recent trend {:.2})",
            format_value(metric, projected),
            summary.scale_at_pivot.unwrap_or(1.0),
            summary.scale_recent_trend.unwrap_or(1.0)
        );
    }
    let _ = writeln!(
        output,
        "Season total: {}",
        format_value(metric, summary.primary_total)
    );
    if let (Some(year), Some(total)) = (report.compare_year, summary.compare_total) {
        match summary.compare_at_current {
            Some(value) => {
                let _ = writeln!(
                    output,
                    "{}: {} at this point, {} final",
                    year,
                    format_value(metric, value),
                    format_value(metric, total)
                );
            }
            None => {
                let _ = writeln!(output, "{}: {} final", year, format_value(metric, total));
            }
        }
    }
    if let (Some(year), Some(total)) = (report.compare2_year, summary.compare2_total) {
        match summary.compare2_at_current {
            Some(value) => {
                let _ = writeln!(
                    output,
                    "{}: {} at this point, {} final",
                    year,
                    format_value(metric, value),
                    format_value(metric, total)
                );
            }
            None => {
                let _ = writeln!(output, "{}: {} final", year, format_value(metric, total));
            }
        }
    }

    if section.rows.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No {} found for this group.", title.to_lowercase());
        return;
    }

    let has_projection = section.rows.iter().any(|row| row.projection.is_some());

    let mut header = format!("| Week | Week ending | {}", report.year);
    let mut columns = 3;
    if let Some(year) = report.compare_year {
        let _ = write!(header, " | {year}");
        columns += 1;
    }
    if let Some(year) = report.compare2_year {
        let _ = write!(header, " | {year}");
        columns += 1;
    }
    if has_projection {
        header.push_str(" | Projection");
        columns += 1;
    }
    header.push_str(" | Notes |");
    columns += 1;

    let _ = writeln!(output);
    let _ = writeln!(output, "{header}");
    let _ = writeln!(output, "{}|", "| --- ".repeat(columns));

    for row in &section.rows {
        let mut line = format!(
            "| {} | {} | {}",
            row.week_label,
            row.week_ending,
            format_optional(metric, row.primary)
        );
        if report.compare_year.is_some() {
            let _ = write!(line, " | {}", format_optional(metric, row.compare));
        }
        if report.compare2_year.is_some() {
            let _ = write!(line, " | {}", format_optional(metric, row.compare2));
        }
        if has_projection {
            let _ = write!(line, " | {}", format_optional(metric, row.projection));
        }
        let mut notes: Vec<String> = row.markers_primary.clone();
        notes.extend(
            row.markers_compare
                .iter()
                .map(|label| format!("{label} (comparison)")),
        );
        let _ = write!(line, " | {} |", notes.join("; "));
        let _ = writeln!(output, "{line}");
    }
}

pub fn render_json(report: &CampaignReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
