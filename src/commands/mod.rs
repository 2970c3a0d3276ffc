//! CLI command implementations

pub mod live;
pub mod monitor;
