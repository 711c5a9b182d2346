// ABOUTME: Library root for berth - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod config;
pub mod credential;
pub mod deadline;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod runtime;
pub mod ssh;
pub mod types;
