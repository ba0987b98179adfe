//! Rate limiting logic and state management.

mod backend;
mod limiter;
mod limits;
mod window;

pub use backend::AdmissionControl;
pub use limiter::{RateLimitInfo, RateLimitState, RateLimiter};
pub use limits::{WindowLimits, DEFAULT_PER_DAY, DEFAULT_PER_HOUR, DEFAULT_PER_MINUTE};
pub use window::{RateLimitWindow, TimeWindow};
