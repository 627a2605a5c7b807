//! Subsystem modules for the wedding concierge.

pub mod agents;
pub mod comms;
pub mod memory;
pub mod runtime;
pub mod tools;
pub mod voice;
