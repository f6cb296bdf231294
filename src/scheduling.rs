use chrono::{DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::models::RequestStatus;

/// Time zone in which customers' preferred slots are expressed.
#[derive(Debug, Clone, Copy)]
pub enum LocalZone {
    System,
    Fixed(FixedOffset),
}

impl LocalZone {
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .and_then(fixed_offset)
            .map(LocalZone::Fixed)
            .unwrap_or(LocalZone::System)
    }

    /// Combine a preferred date and time into the absolute instant of the visit.
    ///
    /// Returns `None` when the wall-clock time does not exist in the zone
    /// (a daylight-saving gap). Ambiguous times resolve to the earlier instant.
    pub fn scheduled_instant(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        let naive = date.and_time(time);
        match self {
            LocalZone::System => resolve(Local.from_local_datetime(&naive)),
            LocalZone::Fixed(offset) => resolve(offset.from_local_datetime(&naive)),
        }
    }

    /// Wall-clock rendering of an instant, e.g. "Jun 01, 2025 at 10:00".
    pub fn display(&self, instant: DateTime<Utc>) -> String {
        let local: NaiveDateTime = match self {
            LocalZone::System => instant.with_timezone(&Local).naive_local(),
            LocalZone::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        };
        local.format("%b %d, %Y at %H:%M").to_string()
    }
}

/// A UTC offset given in minutes, `None` unless strictly inside ±24h.
pub fn fixed_offset(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}

fn resolve<Tz: TimeZone>(local: LocalResult<DateTime<Tz>>) -> Option<DateTime<Utc>> {
    local.earliest().map(|dt| dt.with_timezone(&Utc))
}

pub fn preferred_display(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} at {}", date.format("%b %d, %Y"), time.format("%H:%M"))
}

/// Aggregates shown on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = RequestStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut counts, status| {
            counts.total += 1;
            match status {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Completed => counts.completed += 1,
                _ => {}
            }
            counts
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn june_first() -> (NaiveDate, NaiveTime) {
        (
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn huge_offsets_fall_back_instead_of_overflowing() {
        assert!(fixed_offset(40_000_000).is_none());
        assert!(fixed_offset(i32::MIN).is_none());
        assert!(fixed_offset(24 * 60).is_none());
        assert_eq!(fixed_offset(-300).map(|o| o.local_minus_utc()), Some(-18_000));
        assert!(matches!(LocalZone::from_offset_minutes(Some(40_000_000)), LocalZone::System));
    }

    #[test]
    fn utc_zone_keeps_wall_clock() {
        let (date, time) = june_first();
        let zone = LocalZone::from_offset_minutes(Some(0));
        let instant = zone.scheduled_instant(date, time).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-06-01T10:00:00+00:00");
    }

    #[test]
    fn offset_zone_shifts_to_utc() {
        let (date, time) = june_first();
        let zone = LocalZone::from_offset_minutes(Some(120));
        let instant = zone.scheduled_instant(date, time).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-06-01T08:00:00+00:00");
        assert_eq!(zone.display(instant), "Jun 01, 2025 at 10:00");
    }

    #[test]
    fn system_zone_round_trips_through_display() {
        let (date, time) = june_first();
        let zone = LocalZone::System;
        let instant = zone.scheduled_instant(date, time).unwrap();
        assert_eq!(zone.display(instant), "Jun 01, 2025 at 10:00");
    }

    #[test]
    fn preferred_slot_display() {
        let (date, time) = june_first();
        assert_eq!(preferred_display(date, time), "Jun 01, 2025 at 10:00");
    }

    #[test]
    fn out_of_range_offset_falls_back_to_system_zone() {
        assert!(matches!(LocalZone::from_offset_minutes(Some(24 * 60)), LocalZone::System));
        assert!(matches!(LocalZone::from_offset_minutes(None), LocalZone::System));
    }

    #[test]
    fn counts_by_status() {
        let counts = StatusCounts::tally([
            RequestStatus::Pending,
            RequestStatus::Pending,
            RequestStatus::Completed,
            RequestStatus::Scheduled,
            RequestStatus::Rejected,
        ]);
        assert_eq!(counts, StatusCounts { total: 5, pending: 2, completed: 1 });
        assert_eq!(StatusCounts::tally([]), StatusCounts::default());
    }
}
