//! Memory subsystem: per-guest conversation history held in process memory.
//!
//! Nothing is persisted: a restart starts every guest from a clean slate.
//!
//! - [`HistoryStore`] keeps a rolling window of the last `W` exchange pairs
//!   per user id.
//! - [`UserLocks`] hands out one async mutex per user id so a single guest's
//!   messages are answered strictly one at a time.

mod history;
mod locks;

pub use history::HistoryStore;
pub use locks::UserLocks;
