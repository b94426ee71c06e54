//! casa controller runtime
//!
//! The [`Controller`] ties the value store, device registry, bridges and
//! polling scheduler of one deployment together.

mod controller;

pub use controller::Controller;
