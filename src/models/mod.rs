//! Data models for the shared reservation document.
//!
//! Field names follow the JSON document the booking widget reads and writes.

mod document;
mod reservation;
mod tent;

pub use document::*;
pub use reservation::*;
pub use tent::*;
