//! # quarry-core
//!
//! Core types shared by every quarry crate: the error taxonomy, settings and
//! their loaders, and tracing setup. This crate has no database knowledge.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine settings and the global settings cell
//! - [`settings_loader`] - Loading settings from TOML, JSON and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{QuarryError, QuarryResult, ValidationError};
pub use settings::{OrmSettings, Settings, SETTINGS};
