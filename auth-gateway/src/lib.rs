//! Authentication orchestrator for WardFlow Engine.
//!
//! This crate is the single entry point the surrounding application calls
//! for credential verification, multi-factor step-up, token refresh,
//! logout and password changes. It wires the sibling crates together:
//! `auth-crypto` verifies passwords, `device-fingerprint` binds sessions
//! to clients, `token-service` signs and revokes tokens, `session-store`
//! enforces the single-active-session policy and `anomaly-detection`
//! scores every authentication after the fact without ever blocking it.
//!
//! Every operation returns an [`AuthResponse`] result object rather than
//! an error for expected failures; client-visible messages stay generic
//! while the full diagnostic story goes to the `security-audit` sink.

pub mod config;
pub mod models;
pub mod repository;
pub mod service;
pub mod totp;
pub mod webauthn;

pub use config::GatewayConfig;
pub use models::{
    AuthResponse, CredentialRecord, LoginFlow, LoginState, PasswordHistoryEntry, RequestContext,
    TokenPair,
};
pub use repository::{InMemoryUserRepository, UserRepository};
pub use service::{AuthGateway, GatewayComponents};
pub use webauthn::{CredentialListVerifier, WebAuthnVerifier};
