//! Dense chart axes and scattering of sparse grouped rows onto them.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::debug;

use crate::analytics::TimeBucket;
use crate::timeframe::{add_bucket, local_to_utc, start_of, SafeTimezone, TimeRange};

pub fn label_format(bucket: TimeBucket) -> &'static str {
    match bucket {
        TimeBucket::Minute => "%Y-%m-%d %H:%M:00",
        TimeBucket::Hour => "%Y-%m-%d %H:00:00",
        TimeBucket::Day => "%Y-%m-%d",
        TimeBucket::Month => "%Y-%m",
        TimeBucket::Year => "%Y",
    }
}

/// One label per bucket between two bounds, inclusive.
///
/// Points are generated in the request's local time because the store
/// buckets on `toTimeZone(created, tz)`. `shifted` holds the local labels
/// rows are matched against; `utc` the same instants rendered in UTC.
#[derive(Debug, Clone)]
pub struct ChartAxis {
    pub bucket: TimeBucket,
    pub utc: Vec<String>,
    pub shifted: Vec<String>,
    index: HashMap<String, usize>,
}

impl ChartAxis {
    pub fn for_range(range: &TimeRange) -> Self {
        Self::generate(
            range.time_bucket,
            range.from_local,
            range.to_local,
            range.timezone,
        )
    }

    pub fn generate(
        bucket: TimeBucket,
        from_local: NaiveDateTime,
        to_local: NaiveDateTime,
        timezone: SafeTimezone,
    ) -> Self {
        let format = label_format(bucket);
        let last = start_of(bucket, to_local);
        let mut cursor = start_of(bucket, from_local);

        let mut utc = Vec::new();
        let mut shifted = Vec::new();
        while cursor <= last {
            let label = cursor.format(format).to_string();
            if timezone.is_utc() {
                utc.push(label.clone());
            } else {
                utc.push(local_to_utc(timezone.tz(), cursor).format(format).to_string());
            }
            shifted.push(label);
            match add_bucket(bucket, cursor) {
                Some(next) => cursor = next,
                None => break,
            }
        }

        let mut index = HashMap::with_capacity(shifted.len());
        for (pos, label) in shifted.iter().enumerate() {
            index.entry(label.clone()).or_insert(pos);
        }

        Self {
            bucket,
            utc,
            shifted,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.shifted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifted.is_empty()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }
}

/// The group key columns every chart query selects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BucketKey {
    pub year: i32,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub day: Option<u32>,
    #[serde(default)]
    pub hour: Option<u32>,
    #[serde(default)]
    pub minute: Option<u32>,
}

impl BucketKey {
    /// Render in the same shape as the axis label of the matching bucket.
    pub fn canonical(&self) -> String {
        let year = self.year;
        match (self.month, self.day, self.hour, self.minute) {
            (Some(mo), Some(d), Some(h), Some(mi)) => {
                format!("{year:04}-{mo:02}-{d:02} {h:02}:{mi:02}:00")
            }
            (Some(mo), Some(d), Some(h), None) => format!("{year:04}-{mo:02}-{d:02} {h:02}:00:00"),
            (Some(mo), Some(d), None, _) => format!("{year:04}-{mo:02}-{d:02}"),
            (Some(mo), None, _, _) => format!("{year:04}-{mo:02}"),
            (None, _, _, _) => format!("{year:04}"),
        }
    }
}

/// Zero-filled, axis-aligned series keyed by name.
pub struct SeriesSet<'a, T = f64> {
    axis: &'a ChartAxis,
    series: BTreeMap<String, Vec<T>>,
    /// Slots that received a row, per series.
    written: BTreeMap<String, Vec<bool>>,
}

impl<'a, T: Clone + Default> SeriesSet<'a, T> {
    pub fn new(axis: &'a ChartAxis) -> Self {
        Self {
            axis,
            series: BTreeMap::new(),
            written: BTreeMap::new(),
        }
    }

    /// Pre-create series so they are present (all zeros) even without rows.
    pub fn with_series(mut self, names: &[&str]) -> Self {
        for name in names {
            self.series_mut(name);
        }
        self
    }

    fn series_mut(&mut self, name: &str) -> &mut Vec<T> {
        let len = self.axis.len();
        self.written
            .entry(name.to_string())
            .or_insert_with(|| vec![false; len]);
        self.series
            .entry(name.to_string())
            .or_insert_with(|| vec![T::default(); len])
    }

    /// Write `value` at the row's bucket. Rows outside the axis are dropped.
    pub fn put(&mut self, key: &BucketKey, name: &str, value: T) -> bool {
        let label = key.canonical();
        match self.axis.position(&label) {
            Some(pos) => {
                self.series_mut(name)[pos] = value;
                if let Some(slots) = self.written.get_mut(name) {
                    slots[pos] = true;
                }
                true
            }
            None => {
                debug!(label = %label, series = name, "Dropping row outside chart axis");
                false
            }
        }
    }

    /// Turn sparse running totals into a dense running total: every empty
    /// slot after a written one repeats the last written value. Leading
    /// slots keep the default. `None` applies to every series.
    pub fn carry_forward(&mut self, names: Option<&[&str]>) {
        for (name, values) in self.series.iter_mut() {
            if names.is_some_and(|names| !names.contains(&name.as_str())) {
                continue;
            }
            let Some(slots) = self.written.get(name) else {
                continue;
            };
            let mut last: Option<T> = None;
            for (value, written) in values.iter_mut().zip(slots) {
                if *written {
                    last = Some(value.clone());
                } else if let Some(last) = &last {
                    *value = last.clone();
                }
            }
        }
    }

    pub fn into_series(self) -> BTreeMap<String, Vec<T>> {
        self.series
    }
}
