//! rotary core - Shared types, configuration, error handling, and log folder validation

pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod types;

pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use types::*;
