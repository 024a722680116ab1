use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

/// One timestamped paid registration or net donation, as handed over by the
/// fetch layer. Registrations carry an amount of 1.0; donations carry the net
/// amount (gross minus refund). Built fresh per report and never persisted.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub paid_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub is_paid: bool,
    pub amount: f64,
}

impl RawRecord {
    /// The date the record counts under: paid date, falling back to created
    /// date. `None` means the record cannot be bucketed and is excluded.
    pub fn resolved_date(&self) -> Option<NaiveDate> {
        self.paid_at.or(self.created_at).map(|dt| dt.date())
    }
}

#[derive(Debug, Clone)]
pub struct WeeklyPoint {
    pub week_ending: NaiveDate,
    pub cumulative: f64,
    pub weeks_before_event: i32,
}

/// Cumulative weekly curve ordered by calendar date. `weeks_before_event` is
/// the join key once curves from different years are compared; after
/// alignment the calendar date plays no further part.
#[derive(Debug, Clone, Default)]
pub struct WeeklySeries {
    pub points: Vec<WeeklyPoint>,
    pub total: f64,
    /// Position of the last week that actually has data, as opposed to the
    /// flat padding out to the event date.
    pub last_data_index: Option<usize>,
}

impl WeeklySeries {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn value_at(&self, week_index: i32) -> Option<f64> {
        self.points
            .iter()
            .find(|point| point.weeks_before_event == week_index)
            .map(|point| point.cumulative)
    }

    pub fn position_of(&self, week_index: i32) -> Option<usize> {
        self.points
            .iter()
            .position(|point| point.weeks_before_event == week_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Registrations,
    Donations,
}

impl Metric {
    pub fn default_combine(self) -> CombineMode {
        match self {
            Metric::Registrations => CombineMode::WeightedAverage,
            Metric::Donations => CombineMode::WeightedMedian,
        }
    }

    /// Bounds on the recent-trend scale before it feeds the projected curve.
    /// Donations swing harder week to week, so they get the tighter band.
    pub fn recent_scale_bounds(self) -> (f64, f64) {
        match self {
            Metric::Registrations => (0.6, 1.6),
            Metric::Donations => (0.8, 1.2),
        }
    }

    /// Cap on the projected final total, as a multiple of the baseline final
    /// total. Only donations are capped.
    pub fn final_total_cap(self) -> Option<f64> {
        match self {
            Metric::Registrations => None,
            Metric::Donations => Some(1.1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineMode {
    WeightedAverage,
    WeightedMedian,
}

/// A prior-year curve contributing to the projection baseline. Weight 0
/// excludes the source without error; negative weights are a caller defect.
#[derive(Debug, Clone)]
pub struct WeightedSource {
    pub series: WeeklySeries,
    pub weight: f64,
}

/// Outcome of one projection run. `per_week` is parallel to the primary
/// series when a projection was produced and empty when the basis was
/// insufficient; "no projection" is a normal, displayable state.
#[derive(Debug, Clone)]
pub struct ProjectionResult {
    pub per_week: Vec<Option<f64>>,
    pub projected_final_total: Option<f64>,
    pub scale_at_pivot: f64,
    pub scale_recent_trend: f64,
}

impl ProjectionResult {
    pub fn none() -> Self {
        Self {
            per_week: Vec::new(),
            projected_final_total: None,
            scale_at_pivot: 1.0,
            scale_recent_trend: 1.0,
        }
    }

    pub fn is_none(&self) -> bool {
        self.projected_final_total.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct GroupInfo {
    pub id: Uuid,
    pub category: String,
    pub year: i32,
}

/// A price-window boundary to annotate on the chart.
#[derive(Debug, Clone)]
pub struct DiscountWindow {
    pub label: Option<String>,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
}

/// Everything the fetch layer loads for one campaign group.
#[derive(Debug, Clone, Default)]
pub struct GroupData {
    pub entries: Vec<RawRecord>,
    pub donations: Vec<RawRecord>,
    pub event_date: Option<NaiveDate>,
    pub discounts: Vec<DiscountWindow>,
}

/// One row of the merged, annotated, possibly-projected output handed to the
/// rendering collaborator. Absent series stay `None`; a `None` is "no data at
/// this index", which is not the same thing as zero progress.
#[derive(Debug, Clone, Serialize)]
pub struct ChartRow {
    pub week_index: i32,
    pub week_label: String,
    pub week_ending: NaiveDate,
    pub primary: Option<f64>,
    pub compare: Option<f64>,
    pub compare2: Option<f64>,
    pub projection: Option<f64>,
    pub markers_primary: Vec<String>,
    pub markers_compare: Vec<String>,
}

/// Header scalars for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub current_total: f64,
    pub projected_total: Option<f64>,
    pub primary_total: f64,
    pub compare_total: Option<f64>,
    pub compare2_total: Option<f64>,
    pub compare_at_current: Option<f64>,
    pub compare2_at_current: Option<f64>,
    pub scale_at_pivot: Option<f64>,
    pub scale_recent_trend: Option<f64>,
}
