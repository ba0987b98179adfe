//! Session Limiter - per-session admission guard
//!
//! This crate decides, for each caller-supplied session id, whether one more
//! request may go through to a generative-text backend. Every session is
//! counted in three fixed windows (minute, hour and day) held in process
//! memory. Admitted counts are mirrored to a persistent store in the
//! background, but the store is never consulted for a decision.

pub mod config;
pub mod error;
pub mod gate;
pub mod persistence;
pub mod ratelimit;
