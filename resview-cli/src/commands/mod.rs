//! CLI command implementations.

pub mod common;
pub mod config;
pub mod generate;
pub mod ids;
pub mod lookup;
pub mod scan;
pub mod watch;
