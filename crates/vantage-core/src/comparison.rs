//! Current vs previous period arithmetic for summary cards.

use serde::{Deserialize, Serialize};

pub const CURRENT_SORT_ORDER: u8 = 1;
pub const PREVIOUS_SORT_ORDER: u8 = 2;

/// One half of the batched summary query, tagged so the two halves can be
/// told apart regardless of the order the store returns them in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummaryRow {
    #[serde(rename = "sortOrder")]
    pub sort_order: u8,
    pub all: i64,
    pub unique: i64,
    #[serde(default)]
    pub sdur: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub all: i64,
    pub unique: i64,
    pub sdur: f64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub current: PeriodMetrics,
    pub previous: PeriodMetrics,
    pub change: i64,
    pub unique_change: i64,
    /// Previous minus current: a falling bounce rate reads as a positive change.
    pub bounce_rate_change: f64,
    pub sdur_change: f64,
    pub change_pct: f64,
}

/// Split summary rows into `(current, previous)` by their sort tag.
pub fn order_summary_rows(mut rows: Vec<SummaryRow>) -> (Option<SummaryRow>, Option<SummaryRow>) {
    rows.sort_by_key(|row| row.sort_order);
    let mut current = None;
    let mut previous = None;
    for row in rows {
        match row.sort_order {
            CURRENT_SORT_ORDER if current.is_none() => current = Some(row),
            PREVIOUS_SORT_ORDER if previous.is_none() => previous = Some(row),
            _ => {}
        }
    }
    (current, previous)
}

/// Bounce rate is undefined when a custom-event filter narrows the view.
pub fn bounce_rate(all: i64, unique: i64, custom_event_filter_applied: bool) -> f64 {
    if all <= 0 || custom_event_filter_applied {
        return 0.0;
    }
    (1000.0 * unique as f64 / all as f64).round() / 10.0
}

pub fn period_metrics(
    row: Option<&SummaryRow>,
    custom_event_filter_applied: bool,
) -> PeriodMetrics {
    let Some(row) = row else {
        return PeriodMetrics::default();
    };
    PeriodMetrics {
        all: row.all,
        unique: row.unique,
        sdur: row.sdur.filter(|v| v.is_finite()).unwrap_or(0.0),
        bounce_rate: bounce_rate(row.all, row.unique, custom_event_filter_applied),
    }
}

fn change_pct(current: i64, previous: i64) -> f64 {
    match (current, previous) {
        (0, 0) => 0.0,
        (c, 0) if c > 0 => 100.0,
        (_, 0) => 0.0,
        (c, p) => (10_000.0 * (c - p) as f64 / p as f64).round() / 100.0,
    }
}

pub fn compare_periods(current: PeriodMetrics, previous: PeriodMetrics) -> PeriodComparison {
    PeriodComparison {
        current,
        previous,
        change: current.all - previous.all,
        unique_change: current.unique - previous.unique,
        bounce_rate_change: (current.bounce_rate - previous.bounce_rate) * -1.0,
        sdur_change: current.sdur - previous.sdur,
        change_pct: change_pct(current.all, previous.all),
    }
}

/// `all`-time summaries have no previous window; compare against zero.
pub fn compare_against_zero(current: PeriodMetrics) -> PeriodComparison {
    compare_periods(current, PeriodMetrics::default())
}
