//! CLI command implementations.

pub mod bench;
pub mod destroy;
pub mod run;
