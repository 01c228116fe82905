//! Common utilities and types shared across the TurfGuard crates.
//!
//! This module provides the error taxonomy and the small value types that
//! every layer of the security subsystem agrees on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Environment, SensitiveBytes};
