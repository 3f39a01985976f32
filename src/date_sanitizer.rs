//! Timezone-aware parsing of user-entered calendar dates.
//!
//! The UI sends a local calendar date with no timezone. Before storage it is
//! anchored to midnight local time at the caller's UTC offset and converted
//! to a single absolute instant.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use log::warn;

use crate::app_response::AppResponse;

/// Fixed local format the UI's date picker produces.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Convert a calendar date string plus the caller's UTC offset into an
/// absolute instant.
///
/// `utc_offset_minutes` is minutes WEST of UTC (positive when the caller is
/// behind UTC), the convention host environments report. The sign is taken
/// from the raw signed value, and offsets are applied in whole minutes, so
/// sub-hour zones like UTC+5:30 resolve exactly.
///
/// Returns a `ValidationError` for malformed dates or out-of-range offsets;
/// no database call happens before this check.
pub fn sanitize_date(date: &str, utc_offset_minutes: i32) -> Result<DateTime<Utc>, AppResponse> {
    let offset_seconds_east = utc_offset_minutes
        .checked_mul(60)
        .map(|seconds_west| -seconds_west)
        .ok_or_else(|| {
            AppResponse::ValidationError(format!(
                "UTC offset out of range: {utc_offset_minutes} minutes"
            ))
        })?;

    let offset = FixedOffset::east_opt(offset_seconds_east).ok_or_else(|| {
        AppResponse::ValidationError(format!(
            "UTC offset out of range: {utc_offset_minutes} minutes"
        ))
    })?;

    let calendar_date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|e| {
        warn!("Rejected malformed date '{date}': {e}");
        AppResponse::ValidationError(format!("Invalid date '{date}': {e}"))
    })?;

    let local_midnight = calendar_date.and_hms_opt(0, 0, 0).ok_or_else(|| {
        AppResponse::ValidationError(format!("Invalid date '{date}': no midnight"))
    })?;

    // A fixed offset has no DST gaps, so this resolves to exactly one instant.
    let anchored = local_midnight
        .and_local_timezone(offset)
        .single()
        .ok_or_else(|| {
            AppResponse::ValidationError(format!("Ambiguous local time for date '{date}'"))
        })?;

    Ok(anchored.with_timezone(&Utc))
}

/// The current process-local UTC offset, in minutes west of UTC. The save
/// port uses this the way the original adapter used the browser's offset.
pub fn local_utc_offset_minutes() -> i32 {
    let seconds_east = chrono::Local::now().offset().local_minus_utc();
    -(seconds_east / 60)
}
