//! # whiskpilot Config
//!
//! Settings for an automation run: prompts, pacing, randomization, download
//! destination, browser endpoint, page selectors and timings.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
