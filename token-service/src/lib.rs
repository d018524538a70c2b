//! Token issuance, verification, blacklisting and rotation.
//!
//! Access and refresh tokens are signed JWTs with distinct signing keys per
//! type, so a captured refresh token can never be replayed where an access
//! token is expected. Tokens themselves are never persisted; only their ids
//! are tracked through the append-only blacklist and the session store.

pub mod blacklist;
pub mod claims;
pub mod error;
pub mod service;

pub use blacklist::{BlacklistReason, BlacklistStore, BlacklistedToken, InMemoryBlacklistStore};
pub use claims::{Claims, Role, TokenPayload, TokenType};
pub use error::{TokenError, TokenResult};
pub use service::{IssuedToken, TokenConfig, TokenKeys, TokenService};
