//! Time range resolution.
//!
//! Requests name their window either as an explicit `from`/`to` pair or as a
//! relative period token (`today`, `7d`, `3M`, `all`, ...). Both are resolved
//! into local and UTC bounds snapped to the time bucket the chart will use.
//! Only a fixed set of buckets is legal for a given range length, see
//! [`allowed_buckets`].

use chrono::{
    DateTime, Datelike, Days, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    SubsecRound, TimeDelta, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};

use crate::analytics::TimeBucket;
use crate::error::ValidationError;

pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zone names treated as UTC without consulting the tz database.
pub const UTC_TIMEZONES: &[&str] = &[
    "Etc/GMT",
    "Etc/GMT0",
    "Etc/GMT+0",
    "Etc/GMT-0",
    "Etc/UTC",
    "Etc/UCT",
    "Etc/Universal",
    "Etc/Zulu",
    "Etc/Greenwich",
    "GMT",
    "GMT0",
    "GMT+0",
    "GMT-0",
    "UTC",
    "UCT",
    "Universal",
    "Zulu",
    "Greenwich",
];

pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Etc::GMT;

/// A timezone that is guaranteed to be usable. Unknown names fall back to
/// [`DEFAULT_TIMEZONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeTimezone {
    tz: Tz,
    utc: bool,
}

impl SafeTimezone {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(name) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };
        match name.parse::<Tz>() {
            Ok(tz) => Self {
                tz,
                utc: UTC_TIMEZONES.contains(&name) || UTC_TIMEZONES.contains(&tz.name()),
            },
            Err(_) => {
                tracing::debug!(timezone = name, "Unknown timezone, using default");
                Self::default()
            }
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    /// Zero-offset zone: local and UTC renderings coincide.
    pub fn is_utc(&self) -> bool {
        self.utc
    }
}

impl Default for SafeTimezone {
    fn default() -> Self {
        Self {
            tz: DEFAULT_TIMEZONE,
            utc: true,
        }
    }
}

impl Serialize for SafeTimezone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Largest day difference each tier covers, with the buckets legal in it,
/// finest first.
const BUCKET_STAIRCASE: &[(i64, &[TimeBucket])] = &[
    (0, &[TimeBucket::Minute, TimeBucket::Hour]),
    (7, &[TimeBucket::Hour, TimeBucket::Day, TimeBucket::Month]),
    (28, &[TimeBucket::Day, TimeBucket::Month]),
    (366, &[TimeBucket::Month]),
    (732, &[TimeBucket::Month]),
    (1464, &[TimeBucket::Month, TimeBucket::Year]),
    (99_999, &[TimeBucket::Year]),
];

/// Whole days between two instants, truncated.
pub fn day_diff(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_days()
}

pub fn allowed_buckets(days: i64) -> Result<&'static [TimeBucket], ValidationError> {
    BUCKET_STAIRCASE
        .iter()
        .find(|(max_days, _)| days <= *max_days)
        .map(|(_, buckets)| *buckets)
        .ok_or(ValidationError::RangeTooLarge)
}

pub fn check_bucket_allowed(
    bucket: TimeBucket,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<(), ValidationError> {
    let days = day_diff(from, to);
    if allowed_buckets(days)?.contains(&bucket) {
        Ok(())
    } else {
        Err(ValidationError::BucketNotAllowed {
            bucket: bucket.as_str(),
            days,
        })
    }
}

/// Finest bucket the staircase allows for `[from, to]`.
pub fn lowest_bucket_for_range(
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<TimeBucket, ValidationError> {
    allowed_buckets(day_diff(from, to))?
        .first()
        .copied()
        .ok_or(ValidationError::RangeTooLarge)
}

/// Default bucket for a period token when the caller did not choose one.
pub fn lowest_bucket_for_period(period: &Period, now: NaiveDateTime) -> TimeBucket {
    match period {
        Period::Relative {
            amount: 1,
            unit: PeriodUnit::Hour,
        } => TimeBucket::Minute,
        Period::Today | Period::Yesterday => TimeBucket::Hour,
        Period::Relative {
            amount: 1 | 7,
            unit: PeriodUnit::Day,
        } => TimeBucket::Hour,
        Period::Relative {
            amount: 4,
            unit: PeriodUnit::Week,
        } => TimeBucket::Day,
        Period::Relative {
            amount: 3 | 12 | 24,
            unit: PeriodUnit::Month,
        } => TimeBucket::Month,
        // Anything else: finest bucket the staircase allows for the span.
        // A flat `year` would be rejected for every span under four years.
        Period::Relative { amount, unit } => unit
            .sub_from(now, *amount)
            .and_then(|from| lowest_bucket_for_range(from, now).ok())
            .unwrap_or(TimeBucket::Year),
        Period::All => TimeBucket::Year,
    }
}

/// `lowestPossibleTimeBucket`: explicit ranges go through the staircase,
/// periods through their fixed defaults.
pub fn lowest_possible_time_bucket(
    period: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
    now: NaiveDateTime,
) -> Result<TimeBucket, ValidationError> {
    if let (Some(from), Some(to)) = (from, to) {
        let from = parse_date_input(from).ok_or(ValidationError::InvalidDate { field: "from" })?;
        let to = parse_date_input(to).ok_or(ValidationError::InvalidDate { field: "to" })?;
        return lowest_bucket_for_range(from, to);
    }
    match period {
        Some(raw) => Ok(lowest_bucket_for_period(&Period::parse(raw)?, now)),
        None => Ok(TimeBucket::Year),
    }
}

pub fn start_of(bucket: TimeBucket, dt: NaiveDateTime) -> NaiveDateTime {
    let midnight = dt.date().and_time(NaiveTime::MIN);
    match bucket {
        TimeBucket::Minute => {
            midnight + TimeDelta::minutes(i64::from(dt.hour() * 60 + dt.minute()))
        }
        TimeBucket::Hour => midnight + TimeDelta::hours(i64::from(dt.hour())),
        TimeBucket::Day => midnight,
        TimeBucket::Month => (dt.date() - Days::new(u64::from(dt.day0()))).and_time(NaiveTime::MIN),
        TimeBucket::Year => {
            (dt.date() - Days::new(u64::from(dt.ordinal0()))).and_time(NaiveTime::MIN)
        }
    }
}

/// Advance by one bucket unit. `None` only on calendar overflow.
pub fn add_bucket(bucket: TimeBucket, dt: NaiveDateTime) -> Option<NaiveDateTime> {
    match bucket {
        TimeBucket::Minute => dt.checked_add_signed(TimeDelta::minutes(1)),
        TimeBucket::Hour => dt.checked_add_signed(TimeDelta::hours(1)),
        TimeBucket::Day => dt.checked_add_days(Days::new(1)),
        TimeBucket::Month => dt.checked_add_months(Months::new(1)),
        TimeBucket::Year => dt.checked_add_months(Months::new(12)),
    }
}

/// Last second of the bucket containing `dt`.
pub fn end_of(bucket: TimeBucket, dt: NaiveDateTime) -> Option<NaiveDateTime> {
    add_bucket(bucket, start_of(bucket, dt)).map(|next| next - TimeDelta::seconds(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    fn sub_from(self, dt: NaiveDateTime, amount: u32) -> Option<NaiveDateTime> {
        match self {
            PeriodUnit::Hour => dt.checked_sub_signed(TimeDelta::hours(i64::from(amount))),
            PeriodUnit::Day => dt.checked_sub_days(Days::new(u64::from(amount))),
            PeriodUnit::Week => dt.checked_sub_days(Days::new(7 * u64::from(amount))),
            PeriodUnit::Month => dt.checked_sub_months(Months::new(amount)),
            PeriodUnit::Year => dt.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        }
    }
}

impl From<TimeBucket> for PeriodUnit {
    fn from(bucket: TimeBucket) -> Self {
        match bucket {
            // Minute-level periods are not a thing; an hour is the closest unit.
            TimeBucket::Minute | TimeBucket::Hour => PeriodUnit::Hour,
            TimeBucket::Day => PeriodUnit::Day,
            TimeBucket::Month => PeriodUnit::Month,
            TimeBucket::Year => PeriodUnit::Year,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    All,
    Relative { amount: u32, unit: PeriodUnit },
}

impl Period {
    /// `today`, `yesterday`, `all` or `<n><h|d|w|M|y>`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidPeriod(raw.to_string());
        match raw.trim() {
            "today" => Ok(Period::Today),
            "yesterday" => Ok(Period::Yesterday),
            "all" => Ok(Period::All),
            token => {
                let unit_at = token
                    .char_indices()
                    .last()
                    .map(|(idx, _)| idx)
                    .ok_or_else(invalid)?;
                let (digits, unit) = token.split_at(unit_at);
                let unit = match unit {
                    "h" => PeriodUnit::Hour,
                    "d" => PeriodUnit::Day,
                    "w" => PeriodUnit::Week,
                    "M" => PeriodUnit::Month,
                    "y" => PeriodUnit::Year,
                    _ => return Err(invalid()),
                };
                let amount: u32 = digits.parse().map_err(|_| invalid())?;
                if amount == 0 {
                    return Err(invalid());
                }
                Ok(Period::Relative { amount, unit })
            }
        }
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM[:SS]`, `YYYY-MM-DDTHH:MM:SS` and
/// RFC 3339 (converted to UTC).
pub fn parse_date_input(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in [DATE_TIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

/// Wall-clock time in `tz` to UTC. Ambiguous times take the earlier instant;
/// times inside a DST gap are moved forward by an hour.
pub fn local_to_utc(tz: Tz, local: NaiveDateTime) -> NaiveDateTime {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.naive_utc(),
        LocalResult::Ambiguous(a, b) => a.min(b).naive_utc(),
        LocalResult::None => tz
            .from_local_datetime(&(local + TimeDelta::hours(1)))
            .earliest()
            .map(|dt| dt.naive_utc())
            .unwrap_or(local),
    }
}

pub fn utc_to_local(tz: Tz, utc: NaiveDateTime) -> NaiveDateTime {
    tz.from_utc_datetime(&utc).naive_local()
}

/// A resolved window, always paired with the bucket it was snapped to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub from_local: NaiveDateTime,
    pub to_local: NaiveDateTime,
    #[serde(rename = "fromUTC")]
    pub from_utc: NaiveDateTime,
    #[serde(rename = "toUTC")]
    pub to_utc: NaiveDateTime,
    pub time_bucket: TimeBucket,
    pub timezone: SafeTimezone,
}

impl TimeRange {
    pub fn from_utc_str(&self) -> String {
        self.from_utc.format(DATE_TIME_FORMAT).to_string()
    }

    pub fn to_utc_str(&self) -> String {
        self.to_utc.format(DATE_TIME_FORMAT).to_string()
    }

    /// The same-length window ending one second before this one starts.
    pub fn previous_window(&self) -> (NaiveDateTime, NaiveDateTime) {
        let prev_to = self.from_utc - TimeDelta::seconds(1);
        let prev_from = prev_to - (self.to_utc - self.from_utc);
        (prev_from, prev_to)
    }
}

/// Everything a request says about its time window.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeframeQuery<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
    pub period: Option<&'a str>,
    pub timezone: Option<&'a str>,
    pub time_bucket: Option<TimeBucket>,
    /// For `all`: number of buckets between the first recorded event and now.
    pub all_time_diff: Option<i64>,
}

pub fn resolve_time_range(
    query: &TimeframeQuery<'_>,
    now: DateTime<Utc>,
) -> Result<TimeRange, ValidationError> {
    let timezone = SafeTimezone::parse(query.timezone);
    let tz = timezone.tz();

    if let (Some(from), Some(to)) = (query.from, query.to) {
        let from = parse_date_input(from).ok_or(ValidationError::InvalidDate { field: "from" })?;
        let to = parse_date_input(to).ok_or(ValidationError::InvalidDate { field: "to" })?;
        if from > to {
            return Err(ValidationError::InvertedRange);
        }
        let bucket = match query.time_bucket {
            Some(bucket) => {
                check_bucket_allowed(bucket, from, to)?;
                bucket
            }
            None => lowest_bucket_for_range(from, to)?,
        };

        let range = if from == to {
            let from_local = from.date().and_time(NaiveTime::MIN);
            let to_local = end_of(TimeBucket::Day, from_local)
                .ok_or(ValidationError::InvalidDate { field: "to" })?;
            TimeRange {
                from_local,
                to_local,
                from_utc: local_to_utc(tz, from_local),
                to_utc: local_to_utc(tz, to_local),
                time_bucket: bucket,
                timezone,
            }
        } else {
            let from_utc = start_of(bucket, from);
            let to_utc = end_of(bucket, to).ok_or(ValidationError::InvalidDate { field: "to" })?;
            TimeRange {
                from_local: utc_to_local(tz, from_utc),
                to_local: utc_to_local(tz, to_utc),
                from_utc,
                to_utc,
                time_bucket: bucket,
                timezone,
            }
        };
        return Ok(range);
    }

    let Some(raw_period) = query.period else {
        return Err(ValidationError::MissingTimeframe);
    };
    let period = Period::parse(raw_period)?;

    let now_utc = now.naive_utc().trunc_subsecs(0);
    let now = if timezone.is_utc() {
        now_utc
    } else {
        utc_to_local(tz, now_utc)
    };

    let bucket = match (query.time_bucket, period) {
        (Some(bucket), _) => bucket,
        (None, Period::All) if query.all_time_diff.map_or(true, |diff| diff <= 1) => {
            TimeBucket::Hour
        }
        (None, _) => lowest_bucket_for_period(&period, now),
    };
    let overflow = || ValidationError::RangeTooLarge;

    let (from_local, to_local) = match period {
        Period::Today => (start_of(TimeBucket::Day, now), now),
        Period::Yesterday => {
            let day = now.checked_sub_days(Days::new(1)).ok_or_else(overflow)?;
            (
                start_of(TimeBucket::Day, day),
                end_of(TimeBucket::Day, day).ok_or_else(overflow)?,
            )
        }
        Period::All => match query.all_time_diff {
            Some(diff) if diff > 1 => {
                let units = u32::try_from(diff - 1).map_err(|_| overflow())?;
                let from = PeriodUnit::from(bucket)
                    .sub_from(now, units)
                    .ok_or_else(overflow)?;
                (start_of(bucket, from), end_of(bucket, now).ok_or_else(overflow)?)
            }
            _ => (now - TimeDelta::days(1), now),
        },
        Period::Relative { amount, unit } => {
            let back = if amount == 1 { amount } else { amount - 1 };
            let from = unit.sub_from(now, back).ok_or_else(overflow)?;
            (start_of(bucket, from), end_of(bucket, now).ok_or_else(overflow)?)
        }
    };

    let convert = |local: NaiveDateTime| {
        if timezone.is_utc() {
            local
        } else {
            local_to_utc(tz, local)
        }
    };
    // An end at or just past `now` is anchored on the real instant: inside a
    // repeated DST hour the local wall clock maps back to the earlier one.
    let to_utc = match to_local - now {
        ahead if ahead >= TimeDelta::zero() && ahead < TimeDelta::hours(1) => now_utc + ahead,
        _ => convert(to_local),
    };
    let from_utc = convert(from_local);
    check_bucket_allowed(bucket, from_utc, to_utc)?;

    Ok(TimeRange {
        from_local,
        to_local,
        from_utc,
        to_utc,
        time_bucket: bucket,
        timezone,
    })
}

/// Bucket and bucket count for an `all` period whose data starts at
/// `first_event` (both instants local to the request's timezone).
///
/// Never finer than an hour. The count includes both end buckets, so the
/// resolved window always contains the first event.
pub fn all_time_bucket(
    first_event: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<(TimeBucket, i64), ValidationError> {
    let first_event = first_event.min(now);
    let mut candidates: Vec<TimeBucket> = allowed_buckets(day_diff(first_event, now))?
        .iter()
        .copied()
        .filter(|bucket| *bucket != TimeBucket::Minute)
        .collect();
    if candidates.is_empty() {
        candidates.push(TimeBucket::Hour);
    }
    // Snapping can widen the window into the next staircase tier.
    candidates.push(TimeBucket::Year);

    let mut last_err = ValidationError::RangeTooLarge;
    for bucket in candidates {
        let diff = buckets_between(bucket, first_event, now);
        let from = start_of(bucket, first_event);
        let Some(to) = end_of(bucket, now) else {
            continue;
        };
        match check_bucket_allowed(bucket, from, to) {
            Ok(()) => return Ok((bucket, diff)),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Buckets touched by `[from, to]`, counting both ends.
fn buckets_between(bucket: TimeBucket, from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    let (from, to) = (start_of(bucket, from), start_of(bucket, to));
    let span = match bucket {
        TimeBucket::Minute => (to - from).num_minutes(),
        TimeBucket::Hour => (to - from).num_hours(),
        TimeBucket::Day => (to - from).num_days(),
        TimeBucket::Month => {
            i64::from(to.year() - from.year()) * 12 + i64::from(to.month())
                - i64::from(from.month())
        }
        TimeBucket::Year => i64::from(to.year() - from.year()),
    };
    span + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(raw: &str) -> NaiveDateTime {
        parse_date_input(raw).expect("valid datetime")
    }

    fn now() -> DateTime<Utc> {
        dt("2024-03-15 13:45:30").and_utc()
    }

    #[test]
    fn staircase_boundaries() {
        assert_eq!(
            allowed_buckets(0).expect("d=0"),
            &[TimeBucket::Minute, TimeBucket::Hour]
        );
        assert_eq!(
            allowed_buckets(1).expect("d=1"),
            &[TimeBucket::Hour, TimeBucket::Day, TimeBucket::Month]
        );
        assert_eq!(allowed_buckets(400).expect("d=400"), &[TimeBucket::Month]);
        assert_eq!(allowed_buckets(100_000), Err(ValidationError::RangeTooLarge));

        let err = check_bucket_allowed(
            TimeBucket::Minute,
            dt("2024-01-01"),
            dt("2024-01-02"),
        )
        .expect_err("minute is too fine for a day");
        assert_eq!(
            err,
            ValidationError::BucketNotAllowed {
                bucket: "minute",
                days: 1
            }
        );
    }

    #[test]
    fn today_in_utc_runs_from_midnight_to_now() {
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("today"),
                timezone: Some("Etc/GMT"),
                ..Default::default()
            },
            now(),
        )
        .expect("today");
        assert_eq!(range.from_utc, dt("2024-03-15 00:00:00"));
        assert_eq!(range.to_utc, dt("2024-03-15 13:45:30"));
        assert_eq!(range.from_local, range.from_utc);
        assert_eq!(range.time_bucket, TimeBucket::Hour);
    }

    #[test]
    fn today_in_offset_zone_converts_local_midnight() {
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("today"),
                timezone: Some("Europe/Kyiv"),
                ..Default::default()
            },
            now(),
        )
        .expect("today");
        // Kyiv is UTC+2 in mid March.
        assert_eq!(range.from_local, dt("2024-03-15 00:00:00"));
        assert_eq!(range.from_utc, dt("2024-03-14 22:00:00"));
        assert_eq!(range.to_utc, dt("2024-03-15 13:45:30"));
    }

    #[test]
    fn today_ends_at_the_real_now_inside_a_repeated_hour() {
        // 01:30 UTC on 2024-10-27 is the second 03:30 on Kyiv wall clocks.
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("today"),
                timezone: Some("Europe/Kyiv"),
                ..Default::default()
            },
            dt("2024-10-27 01:30:00").and_utc(),
        )
        .expect("today");
        assert_eq!(range.to_local, dt("2024-10-27 03:30:00"));
        assert_eq!(range.to_utc, dt("2024-10-27 01:30:00"));
        assert_eq!(range.from_utc, dt("2024-10-26 21:00:00"));

        let last_hour = resolve_time_range(
            &TimeframeQuery {
                period: Some("1h"),
                timezone: Some("Europe/Kyiv"),
                ..Default::default()
            },
            dt("2024-10-27 01:30:00").and_utc(),
        )
        .expect("1h");
        assert_eq!(last_hour.time_bucket, TimeBucket::Minute);
        assert_eq!(last_hour.to_utc, dt("2024-10-27 01:30:59"));
    }

    #[test]
    fn explicit_range_is_idempotent_and_snapped() {
        let query = TimeframeQuery {
            from: Some("2024-01-01"),
            to: Some("2024-01-03"),
            time_bucket: Some(TimeBucket::Day),
            ..Default::default()
        };
        let first = resolve_time_range(&query, now()).expect("range");
        let second = resolve_time_range(&query, now()).expect("range");
        assert_eq!(first, second);
        assert_eq!(first.from_utc_str(), "2024-01-01 00:00:00");
        assert_eq!(first.to_utc_str(), "2024-01-03 23:59:59");
    }

    #[test]
    fn single_day_range_covers_the_local_day() {
        let range = resolve_time_range(
            &TimeframeQuery {
                from: Some("2024-06-10"),
                to: Some("2024-06-10"),
                timezone: Some("America/New_York"),
                time_bucket: Some(TimeBucket::Hour),
                ..Default::default()
            },
            now(),
        )
        .expect("range");
        assert_eq!(range.from_utc, dt("2024-06-10 04:00:00"));
        assert_eq!(range.to_utc, dt("2024-06-11 03:59:59"));
    }

    #[test]
    fn explicit_range_errors() {
        let resolve = |from: &'static str, to: &'static str| {
            resolve_time_range(
                &TimeframeQuery {
                    from: Some(from),
                    to: Some(to),
                    ..Default::default()
                },
                now(),
            )
        };
        assert_eq!(
            resolve("yesterday-ish", "2024-01-01"),
            Err(ValidationError::InvalidDate { field: "from" })
        );
        assert_eq!(
            resolve("2024-02-01", "2024-01-01"),
            Err(ValidationError::InvertedRange)
        );
        assert_eq!(
            resolve_time_range(&TimeframeQuery::default(), now()),
            Err(ValidationError::MissingTimeframe)
        );
    }

    #[test]
    fn relative_periods_subtract_one_less_unit() {
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("7d"),
                time_bucket: Some(TimeBucket::Day),
                ..Default::default()
            },
            now(),
        )
        .expect("7d");
        assert_eq!(range.from_utc, dt("2024-03-09 00:00:00"));
        assert_eq!(range.to_utc, dt("2024-03-15 23:59:59"));

        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("1d"),
                ..Default::default()
            },
            now(),
        )
        .expect("1d");
        assert_eq!(range.time_bucket, TimeBucket::Hour);
        assert_eq!(range.from_utc, dt("2024-03-14 13:00:00"));
    }

    #[test]
    fn resolved_window_is_rechecked_against_the_bucket() {
        let result = resolve_time_range(
            &TimeframeQuery {
                period: Some("7d"),
                time_bucket: Some(TimeBucket::Minute),
                ..Default::default()
            },
            now(),
        );
        assert!(matches!(
            result,
            Err(ValidationError::BucketNotAllowed { bucket: "minute", .. })
        ));
    }

    #[test]
    fn period_tokens_parse() {
        assert_eq!(
            Period::parse("12M"),
            Ok(Period::Relative {
                amount: 12,
                unit: PeriodUnit::Month
            })
        );
        assert_eq!(Period::parse("all"), Ok(Period::All));
        assert!(Period::parse("0d").is_err());
        assert!(Period::parse("3x").is_err());
        assert!(Period::parse("").is_err());
    }

    #[test]
    fn fixed_periods_map_to_default_buckets() {
        let now = now().naive_utc();
        let bucket =
            |raw: &str| lowest_bucket_for_period(&Period::parse(raw).expect("period"), now);
        assert_eq!(bucket("1h"), TimeBucket::Minute);
        assert_eq!(bucket("today"), TimeBucket::Hour);
        assert_eq!(bucket("7d"), TimeBucket::Hour);
        assert_eq!(bucket("4w"), TimeBucket::Day);
        assert_eq!(bucket("12M"), TimeBucket::Month);
        assert_eq!(bucket("all"), TimeBucket::Year);
        assert_eq!(
            lowest_possible_time_bucket(None, Some("2024-01-01"), Some("2024-01-20"), now),
            Ok(TimeBucket::Day)
        );
    }

    #[test]
    fn unlisted_periods_take_the_finest_allowed_bucket() {
        let now = now().naive_utc();
        let bucket =
            |raw: &str| lowest_bucket_for_period(&Period::parse(raw).expect("period"), now);
        assert_eq!(bucket("3d"), TimeBucket::Hour);
        assert_eq!(bucket("2w"), TimeBucket::Day);
        assert_eq!(bucket("6M"), TimeBucket::Month);

        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("3d"),
                ..Default::default()
            },
            self::now(),
        )
        .expect("3d resolves without an explicit bucket");
        assert_eq!(range.time_bucket, TimeBucket::Hour);
        assert!(check_bucket_allowed(TimeBucket::Year, range.from_utc, range.to_utc).is_err());
    }

    #[test]
    fn all_time_window_contains_first_event() {
        let now_local = dt("2024-08-09 10:00:00");
        let (bucket, diff) = all_time_bucket(dt("2024-05-01 08:00:00"), now_local).expect("all");
        assert_eq!(bucket, TimeBucket::Month);
        assert_eq!(diff, 4);

        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("all"),
                time_bucket: Some(bucket),
                all_time_diff: Some(diff),
                ..Default::default()
            },
            now_local.and_utc(),
        )
        .expect("all");
        assert_eq!(range.from_utc, dt("2024-05-01 00:00:00"));
        assert_eq!(range.to_utc, dt("2024-08-31 23:59:59"));
    }

    #[test]
    fn fresh_project_all_time_is_last_day() {
        let now_local = dt("2024-08-09 10:00:00");
        let (bucket, diff) = all_time_bucket(dt("2024-08-09 09:30:00"), now_local).expect("all");
        assert_eq!((bucket, diff), (TimeBucket::Hour, 2));
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("all"),
                time_bucket: Some(bucket),
                all_time_diff: Some(1),
                ..Default::default()
            },
            now_local.and_utc(),
        )
        .expect("all");
        assert_eq!(range.from_utc, dt("2024-08-08 10:00:00"));
    }

    #[test]
    fn all_time_without_events_defaults_to_hourly_last_day() {
        let range = resolve_time_range(
            &TimeframeQuery {
                period: Some("all"),
                ..Default::default()
            },
            now(),
        )
        .expect("all");
        assert_eq!(range.time_bucket, TimeBucket::Hour);
        assert_eq!(range.from_utc, dt("2024-03-14 13:45:30"));
    }

    #[test]
    fn unknown_timezone_falls_back_to_gmt() {
        let tz = SafeTimezone::parse(Some("Mars/Olympus"));
        assert_eq!(tz.name(), "Etc/GMT");
        assert!(tz.is_utc());
        assert!(!SafeTimezone::parse(Some("Europe/Kyiv")).is_utc());
        assert!(SafeTimezone::parse(Some("UTC")).is_utc());
    }

    #[test]
    fn previous_window_has_same_length() {
        let range = resolve_time_range(
            &TimeframeQuery {
                from: Some("2024-01-08"),
                to: Some("2024-01-14"),
                time_bucket: Some(TimeBucket::Day),
                ..Default::default()
            },
            now(),
        )
        .expect("range");
        let (prev_from, prev_to) = range.previous_window();
        assert_eq!(prev_to, dt("2024-01-07 23:59:59"));
        assert_eq!(prev_from, dt("2024-01-01 00:00:00"));
    }
}
