//! Session persistence and invalidation.
//!
//! One deliberate policy shapes everything here: a user has exactly one
//! intended valid session. Every successful authentication invalidates all
//! prior sessions before creating the new one, trading multi-device
//! convenience for a smaller token-theft blast radius. Invalidating a
//! session always blacklists both of its token ids in the same operation —
//! access id first, so a crash mid-sequence fails closed.

pub mod error;
pub mod manager;
pub mod model;
pub mod repository;

pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use model::{Session, SessionContext};
pub use repository::{InMemorySessionRepository, SessionRepository};
