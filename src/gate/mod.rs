//! Caller-side gate for rate limited operations.
//!
//! Callers ask the gate before invoking the generative-text backend. A refusal
//! comes back as a [`RateLimitExceeded`] error carrying the remaining request
//! counts so the UI layer can show them.

mod lines;
mod middleware;

pub use lines::{serve_lines, Decision};
pub use middleware::{GateError, RateLimitExceeded, RateLimitGate};
