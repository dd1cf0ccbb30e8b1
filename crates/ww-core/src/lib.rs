//! Core types for the webwii loader
//!
//! This crate provides the error taxonomy, configuration, and logging
//! setup shared by the loader, staging and integration crates.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{Result, WebWiiError};
