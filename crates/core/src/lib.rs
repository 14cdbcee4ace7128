//! Core data types for the price step alert bot.

pub mod alert;
pub mod error;
pub mod price;

pub use alert::*;
pub use error::*;
pub use price::*;
