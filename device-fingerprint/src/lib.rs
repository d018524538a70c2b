//! Device fingerprinting for session binding and spoof detection.
//!
//! A fingerprint summarizes stable request characteristics (IP, normalized
//! user agent, accept headers, client hints) into two derived values: an
//! HMAC form keyed with a server-held secret, which a client can echo but
//! never forge, and an unkeyed public hash that is safe to compare against
//! client-supplied material. Similarity between two fingerprints is always
//! computed over the plaintext component vector with per-field weights —
//! never over digest bytes, which carry no similarity signal.

pub mod attributes;
pub mod engine;
pub mod error;
pub mod store;
pub mod validation;

pub use attributes::{ClientHints, FingerprintComponents, RequestAttributes};
pub use engine::{
    weighted_similarity, ComponentWeights, Fingerprint, FingerprintConfig, FingerprintEngine,
};
pub use error::{FingerprintError, FingerprintResult};
pub use store::{FingerprintRecord, FingerprintStore, InMemoryFingerprintStore};
pub use validation::{
    FingerprintValidation, SessionCheck, SessionCheckClassification, ValidationReason,
};
