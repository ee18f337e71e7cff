//! CLI command implementations.

pub mod backends;
pub mod classify;
pub mod config;
pub mod context;
pub mod demo;
