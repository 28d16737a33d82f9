//! Half-hour unit price slots
//!
//! Octopus publishes unit rates in half-hour slots starting at HH:00 and HH:30
//! local time. These helpers floor timestamps to slot starts and enumerate the
//! slots of a local day.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};

/// Slots in a (non-DST-change) day
pub const SLOTS_PER_DAY: usize = 48;

/// Length of one slot in minutes
pub const SLOT_MINUTES: u32 = 30;

/// Start of the half-hour slot containing `t`
pub fn unit_slot_start<Z: TimeZone>(t: &DateTime<Z>) -> DateTime<Z> {
    let minute = if t.minute() < SLOT_MINUTES { 0 } else { SLOT_MINUTES };
    let floored = t
        .time()
        .with_minute(minute)
        .and_then(|tm| tm.with_second(0))
        .and_then(|tm| tm.with_nanosecond(0))
        .unwrap_or_else(|| t.time());
    t.clone() - (t.time() - floored)
}

/// First slot boundary strictly after `t`
pub fn next_slot_boundary(t: DateTime<Utc>) -> DateTime<Utc> {
    unit_slot_start(&t) + TimeDelta::minutes(i64::from(SLOT_MINUTES))
}

/// Slot start times of a day, `00:00` to `23:30`
pub fn day_slot_times() -> impl Iterator<Item = NaiveTime> {
    (0..SLOTS_PER_DAY as u32).filter_map(|i| {
        NaiveTime::from_hms_opt(i / 2, (i % 2) * SLOT_MINUTES, 0)
    })
}

/// Resolve a local wall-clock time to UTC, taking the earlier instant across
/// DST folds and skipping times that do not exist.
pub fn local_to_utc<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// UTC bounds `[start, end)` of a local calendar day
pub fn local_day_bounds<Z: TimeZone>(tz: &Z, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_to_utc(tz, date.and_time(NaiveTime::MIN))?;
    let next = date.succ_opt()?;
    let end = local_to_utc(tz, next.and_time(NaiveTime::MIN))?;
    Some((start, end))
}
