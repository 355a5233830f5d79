//! Core domain types for EntityX Monitor.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod category;
mod ids;
mod record;

pub use category::ContentCategory;
pub use ids::{DEFAULT_SESSION_ID, EntityId, SessionId};
pub use record::{HistoryRecord, ParseLabelError, RecordType, RiskLevel};
