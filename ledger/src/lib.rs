//! Volatile trust and history state for EntityX Monitor.
//!
//! - [`TrustLedger`]: per-session trust scores with atomic deductions
//! - [`HistoryStore`]: bounded FIFO of monitored events, queried newest first
//! - [`HistoryRecorder`]: bounded queue feeding the history store from one writer task
//!
//! Nothing here touches disk. Both stores live as long as the owning
//! application keeps them.

mod history;
mod recorder;
mod trust;

pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryPage, HistoryQuery, HistoryStore};
pub use recorder::{DEFAULT_RECORDER_QUEUE_CAPACITY, HistoryRecorder, RecorderError};
pub use trust::{DEFAULT_INITIAL_SCORE, TrustLedger, TrustUpdate, round_to};
