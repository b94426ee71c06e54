//! Recurring calendar events for casa
//!
//! A [`CalendarEvent`] describes a single or repeating date/time span and
//! answers two questions: is the event active at an instant, and which
//! active sub-intervals fall within a range. Rules use it as a time
//! condition oracle.

mod day_set;
mod error;
mod event;
mod fields;

pub use day_set::DaySet;
pub use error::{CalendarError, CalendarResult};
pub use event::{CalendarEvent, TimeSlot};
