//! Error types for calendar events

use thiserror::Error;

/// Result type for calendar operations
pub type CalendarResult<T> = Result<T, CalendarError>;

/// Errors raised building or parsing a calendar event
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CalendarError {
    /// A persisted field has the wrong shape
    #[error("invalid value for field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// An epoch timestamp cannot be represented in the time zone
    #[error("timestamp {millis} in field {field} is out of range")]
    InvalidTimestamp { field: &'static str, millis: i64 },

    /// The event would end at or before its start
    #[error("event ends at or before its start")]
    EmptySpan,
}
