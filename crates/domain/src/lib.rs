//! Shared types for the Tollgate admission gateway: configuration, the error
//! taxonomy, and the request / response / usage-record shapes exchanged with
//! calling agents and the logging sink.

pub mod config;
pub mod error;
pub mod request;
pub mod usage;

pub use error::{Error, Result};
