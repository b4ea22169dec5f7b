use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::slot::{NewSlot, Slot};

const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Half-open interval overlap: touching windows do not conflict.
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn slot_window(slot: &Slot) -> (NaiveDateTime, NaiveDateTime) {
    (
        slot.interview_date.and_time(slot.start_time),
        slot.interview_date.and_time(slot.end_time),
    )
}

/// Graph returns local times such as `2026-11-02T09:00:00.0000000` next to
/// a separate time zone name.
pub fn parse_graph_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, GRAPH_DATETIME_FORMAT))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

pub fn format_graph_datetime(value: NaiveDateTime) -> String {
    value.format(GRAPH_DATETIME_FORMAT).to_string()
}

/// A single-day slot covering `[start, end)`. Events spanning midnight have
/// no slot representation.
pub fn slot_from_window(start: NaiveDateTime, end: NaiveDateTime) -> Option<NewSlot> {
    if end <= start || start.date() != end.date() {
        return None;
    }
    Some(NewSlot {
        interview_date: start.date(),
        start_time: start.time(),
        end_time: end.time(),
    })
}

pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
