//! Glue between the engine's callback model and Rust subscribers.

pub mod subscribers;
pub mod trampoline;
