//! Shared domain types for the Platelog project.

pub mod config;
pub mod food;
pub mod vision;

mod errors;

pub use errors::{PlatelogError, Result, ValidationError};
