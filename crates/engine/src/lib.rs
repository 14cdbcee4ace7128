//! Alert evaluation engine.
//!
//! This crate contains the step decision rule and the polling scheduler
//! that drives it, plus the collaborator traits the scheduler depends on:
//!
//! - `evaluator` - pure fire / hold / initialize decision per alert
//! - `scheduler` - timed tick loop with per-symbol price fan-out
//! - `ports` - `PriceSource`, `AlertStore` and `Notifier` seams
//! - `payload` - the `PriceMove` handed to notifiers

pub mod error;
pub mod evaluator;
pub mod mock;
pub mod payload;
pub mod ports;
pub mod scheduler;

pub use error::*;
pub use evaluator::*;
pub use payload::*;
pub use ports::*;
pub use scheduler::*;
