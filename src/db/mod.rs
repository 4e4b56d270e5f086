//! Database module.
//!
//! SQLite storage for the per-device presence record.

mod models;
mod store;

pub use models::*;
pub use store::*;
