//! # UPC Common Library
//!
//! Shared code for the UPC processing workers including:
//! - Error types
//! - Bootstrap configuration loading
//! - Database connection setup and schema creation
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
