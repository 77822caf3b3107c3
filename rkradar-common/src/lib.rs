//! # Riigikogu Radar Common Library
//!
//! Shared code for the Riigikogu Radar service:
//! - Vote decision normalization and party resolution
//! - Database models and typed queries
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod domain;
pub mod error;

pub use error::{Error, Result};
