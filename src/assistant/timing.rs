//! Date-time helpers for event drafts and the prompt.
//!
//! Draft times come in two shapes: RFC 3339 with an offset, or a local
//! date-time (no offset) that is read in the draft's zone.

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta,
    TimeZone,
};
use chrono_tz::Tz;

const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const LOCAL_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Why a draft time could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimingError {
    /// Not an IANA zone name.
    #[error("unknown time zone {0:?}")]
    UnknownZone(String),
    /// Neither RFC 3339 nor a local date-time.
    #[error("invalid date-time {0:?}")]
    InvalidDateTime(String),
    /// A local time skipped by a daylight-saving transition.
    #[error("{0} does not exist in {1}")]
    NonexistentLocal(String, String),
    /// Arithmetic left the representable range.
    #[error("date-time out of range")]
    OutOfRange,
}

/// Parse an IANA zone label.
///
/// # Errors
///
/// Returns [`TimingError::UnknownZone`] for unknown labels.
pub fn parse_zone(label: &str) -> Result<Tz, TimingError> {
    label
        .trim()
        .parse()
        .map_err(|_| TimingError::UnknownZone(label.to_owned()))
}

fn parse_local(date_time: &str) -> Option<NaiveDateTime> {
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(date_time, fmt).ok())
}

fn localize(naive: NaiveDateTime, zone: Tz, raw: &str) -> Result<DateTime<Tz>, TimingError> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(TimingError::NonexistentLocal(
            raw.to_owned(),
            zone.name().to_owned(),
        )),
    }
}

/// Interpret a draft time as an instant.
///
/// # Errors
///
/// Returns [`TimingError`] when `date_time` is unparseable or names a
/// local time that does not exist in `zone`.
pub fn parse_instant(date_time: &str, zone: Tz) -> Result<DateTime<FixedOffset>, TimingError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_time) {
        return Ok(dt);
    }
    let naive =
        parse_local(date_time).ok_or_else(|| TimingError::InvalidDateTime(date_time.to_owned()))?;
    Ok(localize(naive, zone, date_time)?.fixed_offset())
}

/// The draft time one hour of elapsed time after `date_time`, in the
/// same textual shape.
///
/// Offset inputs keep their offset. Local inputs are advanced as instants
/// in `zone` and rendered back as local time, so DST transitions are
/// respected.
///
/// # Errors
///
/// Returns [`TimingError`] when the input cannot be interpreted.
pub fn one_hour_after(date_time: &str, zone: Tz) -> Result<String, TimingError> {
    let hour = TimeDelta::hours(1);

    if let Ok(dt) = DateTime::parse_from_rfc3339(date_time) {
        let end = dt.checked_add_signed(hour).ok_or(TimingError::OutOfRange)?;
        let use_z = date_time.ends_with('Z') || date_time.ends_with('z');
        return Ok(end.to_rfc3339_opts(SecondsFormat::AutoSi, use_z));
    }

    let naive =
        parse_local(date_time).ok_or_else(|| TimingError::InvalidDateTime(date_time.to_owned()))?;
    let end = localize(naive, zone, date_time)?
        .checked_add_signed(hour)
        .ok_or(TimingError::OutOfRange)?;
    Ok(end
        .with_timezone(&zone)
        .naive_local()
        .format(LOCAL_OUTPUT_FORMAT)
        .to_string())
}

/// The calendar date after `now`'s date in `now`'s zone.
pub fn next_day(now: DateTime<Tz>) -> NaiveDate {
    let today = now.date_naive();
    today.succ_opt().unwrap_or(today)
}
