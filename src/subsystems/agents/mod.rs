//! Agents subsystem: the wedding concierge.
//!
//! [`orchestrator::Orchestrator`] owns the conversation loop; the system
//! prompt comes from [`prompt`] and every reply passes through
//! [`sanitize`] before it is stored or sent.

pub mod orchestrator;
pub mod prompt;
pub mod sanitize;

pub use orchestrator::Orchestrator;
