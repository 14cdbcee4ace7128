//! Exchange price lookups.
//!
//! This crate provides the REST-backed `PriceSource` used by the scheduler.

pub mod error;
pub mod rest;

pub use error::*;
pub use rest::*;
