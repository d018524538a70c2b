//! Common error types for the WardFlow authentication core.
//!
//! Every externally observable failure carries a stable machine code (for
//! the calling layer to branch on) and a deliberately generic client
//! message. Locked accounts and wrong passwords render identically to the
//! outside; the distinction only ever reaches the security audit sink.

pub mod codes;
pub mod types;

pub use codes::*;
pub use types::*;
