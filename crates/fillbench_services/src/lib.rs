//! Fillbench Services Layer
//!
//! Process-level configuration for the bench binary.

pub mod settings;

pub use settings::{BenchSettings, SettingsError};
