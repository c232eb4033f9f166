//! Service layer for the datalens analytics assistant.
//!
//! The binary wires these together; they live in a library so the HTTP
//! routes can be driven from integration tests.

pub mod config;
pub mod error;
pub mod server;

pub use config::{Config, ConfigError};
pub use error::{Error, Result};
