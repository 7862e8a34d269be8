//! Shared services used by every wallet session.

pub mod log_sink;
pub mod store;
