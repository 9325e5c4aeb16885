//! Connection lifecycle management.
//!
//! Exactly one transport exists per process-level manager. Concurrent
//! `connect` calls while an attempt is in flight all wait on that attempt
//! and receive the same transport (or the same error).

mod manager;

pub use manager::{ConnectionManager, Session};
