use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const MIN_FUNNEL_STEPS: usize = 2;
pub const MAX_FUNNEL_STEPS: usize = 10;

/// Sessions whose furthest matched step was `level` (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelLevelCount {
    pub level: u32,
    pub c: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStep {
    pub value: String,
    pub events: i64,
    pub events_perc: f64,
    pub events_perc_step: f64,
    pub dropoff: i64,
    pub dropoff_perc_step: f64,
}

pub fn validate_funnel_steps(steps: &[String]) -> Result<(), ValidationError> {
    if !(MIN_FUNNEL_STEPS..=MAX_FUNNEL_STEPS).contains(&steps.len()) {
        return Err(ValidationError::InvalidFunnel(format!(
            "a funnel needs between {MIN_FUNNEL_STEPS} and {MAX_FUNNEL_STEPS} steps, got {}",
            steps.len()
        )));
    }
    if steps.iter().any(|step| step.trim().is_empty()) {
        return Err(ValidationError::InvalidFunnel(
            "funnel steps must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Fill in every level from 1 to `total_steps`.
///
/// The store only reports the furthest level each session reached, and only
/// for levels with at least one session. A session at level N also passed
/// every level below it, so counts are accumulated from the top down.
pub fn backfill_funnel(levels: &[FunnelLevelCount], total_steps: usize) -> Vec<FunnelLevelCount> {
    let mut reached: HashMap<u32, i64> = HashMap::new();
    for row in levels {
        *reached.entry(row.level).or_default() += row.c;
    }

    let mut acc = 0;
    let mut out: Vec<FunnelLevelCount> = (1..=total_steps as u32)
        .rev()
        .map(|level| {
            acc += reached.get(&level).copied().unwrap_or(0);
            FunnelLevelCount { level, c: acc }
        })
        .collect();
    out.reverse();
    out
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(100.0 * part as f64 / whole as f64)
    }
}

/// Step percentages from backfilled counts. `counts[i]` belongs to `pages[i]`;
/// missing counts are zero.
pub fn format_funnel(counts: &[i64], pages: &[String]) -> Vec<FunnelStep> {
    let count_at = |idx: usize| counts.get(idx).copied().unwrap_or(0);
    let first = count_at(0);

    pages
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            let events = count_at(idx);
            if idx == 0 {
                return FunnelStep {
                    value: page.clone(),
                    events,
                    events_perc: 100.0,
                    events_perc_step: 100.0,
                    dropoff: 0,
                    dropoff_perc_step: 0.0,
                };
            }
            let prev = count_at(idx - 1);
            let dropoff = prev - events;
            FunnelStep {
                value: page.clone(),
                events,
                events_perc: percent(events, first),
                events_perc_step: percent(events, prev),
                dropoff,
                dropoff_perc_step: percent(dropoff, prev),
            }
        })
        .collect()
}

/// The shape returned when no session matched: every step, all zeros.
pub fn empty_funnel(pages: &[String]) -> Vec<FunnelStep> {
    pages
        .iter()
        .map(|page| FunnelStep {
            value: page.clone(),
            events: 0,
            events_perc: 0.0,
            events_perc_step: 0.0,
            dropoff: 0,
            dropoff_perc_step: 0.0,
        })
        .collect()
}

/// Backfill raw level rows and format them, or the empty funnel if no
/// session entered it.
pub fn funnel_from_levels(levels: &[FunnelLevelCount], pages: &[String]) -> Vec<FunnelStep> {
    let backfilled = backfill_funnel(levels, pages.len());
    let counts: Vec<i64> = backfilled.iter().map(|row| row.c).collect();
    if counts.first().copied().unwrap_or(0) == 0 {
        return empty_funnel(pages);
    }
    format_funnel(&counts, pages)
}
