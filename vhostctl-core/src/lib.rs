//! Vhostctl Core Library
//!
//! This crate provides the types shared by every vhostctl crate:
//! the error taxonomy and the configurator options.

pub mod config;
pub mod error;

pub use error::{Error, Result};

/// Vhostctl version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
