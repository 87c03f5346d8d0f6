//! CLI command implementations.

pub mod common;
pub mod info;
pub mod instruments;
pub mod render;
