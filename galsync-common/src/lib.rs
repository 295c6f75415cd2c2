//! # galsync Common Library
//!
//! Shared code for the galsync tools including:
//! - Error types
//! - Configuration loading and resolution
//! - Tabular (CSV) I/O with column inference

pub mod config;
pub mod error;
pub mod table;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use table::Table;
