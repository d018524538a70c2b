use async_trait::async_trait;
use uuid::Uuid;

/// Seam for WebAuthn assertion verification. The cryptographic protocol
/// (challenge/attestation/assertion handling) is an external verified
/// capability; the orchestrator only consumes its yes/no answer.
#[async_trait]
pub trait WebAuthnVerifier: Send + Sync {
    async fn verify(&self, user_id: Uuid, credential: &str, registered: &[String]) -> bool;
}

/// Development/test verifier: accepts a credential iff it is registered
/// for the user.
pub struct CredentialListVerifier;

#[async_trait]
impl WebAuthnVerifier for CredentialListVerifier {
    async fn verify(&self, _user_id: Uuid, credential: &str, registered: &[String]) -> bool {
        registered.iter().any(|known| known == credential)
    }
}
