//! Time ranges bounding a measurement query.

use time::format_description::well_known::Rfc3339;
use time::macros::datetime;
use time::macros::format_description;
use time::Date;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::UtcOffset;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("start {start} is after end {end}")]
    Inverted { start: String, end: String },

    #[error("invalid date-time '{0}': expected RFC 3339, YYYY-MM-DDTHH:MM[:SS] or YYYY-MM-DD")]
    InvalidInstant(String),
}

/// The `[start, end]` instant pair bounding a measurement query.
///
/// Always satisfies `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl TimeRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::Inverted {
                start: iso_millis(start),
                end: iso_millis(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds with [`parse_instant`] and check their order.
    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        Self::new(parse_instant(start)?, parse_instant(end)?)
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    /// Start instant as sent in the `givenStart` query parameter.
    pub fn start_iso(&self) -> String {
        iso_millis(self.start)
    }

    /// End instant as sent in the `givenEnd` query parameter.
    pub fn end_iso(&self) -> String {
        iso_millis(self.end)
    }

    /// `DD-MM-YYYY HH:mm to DD-MM-YYYY HH:mm`
    pub fn display_label(&self) -> String {
        format!("{} to {}", short_label(self.start), short_label(self.end))
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            start: datetime!(2024-03-01 0:00 UTC),
            end: datetime!(2024-06-30 0:00 UTC),
        }
    }
}

/// Parse a user-supplied instant.
///
/// Accepts RFC 3339, a naive date-time (taken as UTC) or a bare date
/// (midnight UTC).
pub fn parse_instant(input: &str) -> Result<OffsetDateTime, RangeError> {
    let input = input.trim();

    if let Ok(dt) = OffsetDateTime::parse(input, &Rfc3339) {
        return Ok(dt);
    }

    let with_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(input, with_seconds) {
        return Ok(dt.assume_utc());
    }

    let without_seconds = format_description!("[year]-[month]-[day]T[hour]:[minute]");
    if let Ok(dt) = PrimitiveDateTime::parse(input, without_seconds) {
        return Ok(dt.assume_utc());
    }

    let date_only = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(input, date_only) {
        return Ok(date.midnight().assume_utc());
    }

    Err(RangeError::InvalidInstant(input.to_string()))
}

fn iso_millis(instant: OffsetDateTime) -> String {
    let utc = instant.to_offset(UtcOffset::UTC);
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    );
    // The description only contains components every OffsetDateTime has.
    utc.format(format).unwrap_or_else(|_| utc.to_string())
}

fn short_label(instant: OffsetDateTime) -> String {
    let format = format_description!("[day]-[month]-[year] [hour]:[minute]");
    instant
        .to_offset(UtcOffset::UTC)
        .format(format)
        .unwrap_or_else(|_| instant.to_string())
}
