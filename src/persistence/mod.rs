//! Best-effort mirroring of session counters to a persistent store.
//!
//! The mirror is write-only: nothing in this module is ever read back to make
//! an admission decision.

mod mirror;
mod record;
mod store;

pub use mirror::{MirrorHandle, MirrorStats, PersistenceMirror};
pub use record::RateLimitRecord;
pub use store::{FileStore, MemoryStore, RateLimitStore};
