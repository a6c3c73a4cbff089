//! Run monitors.
//!
//! Interactive sessions get a cooperative terminal table redrawn on a
//! 500 ms tick; headless sessions get a summary log line every 5 seconds.

mod headless;
mod interactive;

pub(crate) use headless::run_headless;
pub(crate) use interactive::run_interactive;
