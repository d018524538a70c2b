use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::blacklist::{BlacklistReason, BlacklistStore, BlacklistedToken};
use crate::claims::{Claims, TokenPayload, TokenType};
use crate::error::{TokenError, TokenResult};

/// Signing keys, one pair per token type. Distinct keys mean a refresh
/// token can never verify where an access token is expected, independent of
/// the embedded type claim.
pub struct TokenKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenKeys {
    pub fn from_secrets(access_key: &str, refresh_key: &str) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_key.as_bytes()),
            access_decoding: DecodingKey::from_secret(access_key.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_key.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_key.as_bytes()),
        }
    }

    fn encoding(&self, token_type: TokenType) -> &EncodingKey {
        match token_type {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        }
    }

    fn decoding(&self, token_type: TokenType) -> &DecodingKey {
        match token_type {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Remaining lifetime below which an access token is proactively rotated.
    pub rotation_window: Duration,
    /// How long a rotation marker suppresses duplicate rotations of the
    /// same token id.
    pub rotation_marker_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            rotation_window: Duration::minutes(15),
            rotation_marker_ttl: Duration::seconds(30),
        }
    }
}

/// The issued token plus what the caller needs to track it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub id: Uuid,
    /// Seconds until expiry, for the cookie/bearer layer.
    pub expires_in: i64,
}

pub struct TokenService {
    keys: TokenKeys,
    config: TokenConfig,
    blacklist: Arc<dyn BlacklistStore>,
    recent_rotations: DashMap<Uuid, chrono::DateTime<Utc>>,
}

impl TokenService {
    pub fn new(keys: TokenKeys, config: TokenConfig, blacklist: Arc<dyn BlacklistStore>) -> Self {
        Self {
            keys,
            config,
            blacklist,
            recent_rotations: DashMap::new(),
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Sign a token of the given type.
    ///
    /// A fresh random id is generated unless the payload pre-assigned one.
    pub fn issue(&self, payload: TokenPayload, token_type: TokenType) -> TokenResult<IssuedToken> {
        let ttl = match token_type {
            TokenType::Access => self.config.access_ttl,
            TokenType::Refresh => self.config.refresh_ttl,
        };
        let now = Utc::now();
        let id = payload.token_id.unwrap_or_else(Uuid::new_v4);

        let claims = Claims {
            jti: id,
            sub: payload.user_id,
            role: payload.role,
            permissions: payload.permissions,
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        let token = encode(&Header::default(), &claims, self.keys.encoding(token_type))
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            id,
            expires_in: ttl.num_seconds(),
        })
    }

    /// Verify signature, type and blacklist state.
    ///
    /// The blacklist check runs last so a structurally valid but
    /// blacklisted token still fails, with its own error variant.
    pub async fn verify(&self, token: &str, expected: TokenType) -> TokenResult<Claims> {
        let claims = self.decode_claims(token, expected)?;

        if self.blacklist.contains(claims.jti).await {
            return Err(TokenError::Blacklisted);
        }

        Ok(claims)
    }

    /// Append a token id to the blacklist. Idempotent: re-blacklisting an
    /// id reports `false` and keeps the original reason.
    pub async fn blacklist_token(
        &self,
        token_id: Uuid,
        user_id: Uuid,
        reason: BlacklistReason,
    ) -> bool {
        let inserted = self
            .blacklist
            .insert(BlacklistedToken {
                token_id,
                user_id,
                reason,
                blacklisted_at: Utc::now(),
            })
            .await;

        if inserted {
            tracing::info!(%token_id, %user_id, reason = reason.as_str(), "token blacklisted");
        }
        inserted
    }

    /// Whether an access token is close enough to expiry to rotate.
    pub fn needs_rotation(&self, claims: &Claims) -> bool {
        let remaining = claims.exp - Utc::now().timestamp();
        remaining < self.config.rotation_window.num_seconds()
    }

    /// Rotate an access token: blacklist the old id and issue a fresh token
    /// with the same subject claims.
    ///
    /// Two concurrent requests carrying the same near-expiry token race
    /// here; the rotation marker is checked-and-set atomically and the
    /// loser gets `Ok(None)`, continuing with the original token instead of
    /// erroring.
    pub async fn rotate(&self, current_access_token: &str) -> TokenResult<Option<IssuedToken>> {
        let claims = self.decode_claims(current_access_token, TokenType::Access)?;

        self.sweep_rotation_markers();
        let now = Utc::now();
        let won = match self.recent_rotations.entry(claims.jti) {
            Entry::Occupied(mut occupied) => {
                if now.signed_duration_since(*occupied.get()) < self.config.rotation_marker_ttl {
                    false
                } else {
                    occupied.insert(now);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        };

        if !won {
            tracing::debug!(token_id = %claims.jti, "rotation already in flight, keeping original token");
            return Ok(None);
        }

        if self.blacklist.contains(claims.jti).await {
            return Err(TokenError::Blacklisted);
        }

        self.blacklist_token(claims.jti, claims.sub, BlacklistReason::Rotation)
            .await;

        let payload = TokenPayload {
            user_id: claims.sub,
            role: claims.role,
            permissions: claims.permissions,
            token_id: None,
        };
        let rotated = self.issue(payload, TokenType::Access)?;

        tracing::info!(
            old_token_id = %claims.jti,
            new_token_id = %rotated.id,
            user_id = %claims.sub,
            "access token rotated"
        );
        Ok(Some(rotated))
    }

    fn decode_claims(&self, token: &str, expected: TokenType) -> TokenResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, self.keys.decoding(expected), &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;

        if data.claims.token_type != expected {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }

    fn sweep_rotation_markers(&self) {
        let ttl = self.config.rotation_marker_ttl;
        let now = Utc::now();
        self.recent_rotations
            .retain(|_, set_at| now.signed_duration_since(*set_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blacklist::InMemoryBlacklistStore;
    use crate::claims::Role;

    fn service(config: TokenConfig) -> TokenService {
        TokenService::new(
            TokenKeys::from_secrets(
                "unit-access-key-0123456789abcdefgh",
                "unit-refresh-key-0123456789abcdefg",
            ),
            config,
            Arc::new(InMemoryBlacklistStore::new()),
        )
    }

    fn payload() -> TokenPayload {
        TokenPayload::new(
            Uuid::new_v4(),
            Role::Physician,
            vec!["patients:read".into(), "patients:write".into()],
        )
    }

    #[tokio::test]
    async fn access_token_round_trip() {
        let svc = service(TokenConfig::default());
        let p = payload();
        let issued = svc.issue(p.clone(), TokenType::Access).unwrap();

        let claims = svc.verify(&issued.token, TokenType::Access).await.unwrap();
        assert_eq!(claims.sub, p.user_id);
        assert_eq!(claims.role, Role::Physician);
        assert_eq!(claims.permissions, p.permissions);
        assert_eq!(claims.jti, issued.id);
        assert_eq!(issued.expires_in, 15 * 60);
    }

    #[tokio::test]
    async fn access_token_fails_as_refresh() {
        let svc = service(TokenConfig::default());
        let issued = svc.issue(payload(), TokenType::Access).unwrap();

        assert_eq!(
            svc.verify(&issued.token, TokenType::Refresh).await,
            Err(TokenError::Invalid)
        );
    }

    #[tokio::test]
    async fn expired_token_is_typed_distinctly() {
        let svc = service(TokenConfig {
            access_ttl: Duration::seconds(-120),
            ..TokenConfig::default()
        });
        let issued = svc.issue(payload(), TokenType::Access).unwrap();

        assert_eq!(
            svc.verify(&issued.token, TokenType::Access).await,
            Err(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let svc = service(TokenConfig::default());
        assert_eq!(
            svc.verify("not-a-jwt", TokenType::Access).await,
            Err(TokenError::Invalid)
        );
    }

    #[tokio::test]
    async fn blacklisted_token_fails_despite_valid_signature() {
        let svc = service(TokenConfig::default());
        let p = payload();
        let issued = svc.issue(p.clone(), TokenType::Access).unwrap();

        assert!(
            svc.blacklist_token(issued.id, p.user_id, BlacklistReason::Logout)
                .await
        );
        // Second blacklisting of the same id is a no-op, not an error.
        assert!(
            !svc.blacklist_token(issued.id, p.user_id, BlacklistReason::Logout)
                .await
        );

        assert_eq!(
            svc.verify(&issued.token, TokenType::Access).await,
            Err(TokenError::Blacklisted)
        );
    }

    #[tokio::test]
    async fn fresh_id_generated_unless_preassigned() {
        let svc = service(TokenConfig::default());
        let a = svc.issue(payload(), TokenType::Access).unwrap();
        let b = svc.issue(payload(), TokenType::Access).unwrap();
        assert_ne!(a.id, b.id);

        let preassigned = Uuid::new_v4();
        let mut p = payload();
        p.token_id = Some(preassigned);
        let c = svc.issue(p, TokenType::Access).unwrap();
        assert_eq!(c.id, preassigned);
    }

    #[tokio::test]
    async fn rotation_blacklists_old_and_reuses_claims() {
        let svc = service(TokenConfig {
            access_ttl: Duration::minutes(5),
            ..TokenConfig::default()
        });
        let p = payload();
        let issued = svc.issue(p.clone(), TokenType::Access).unwrap();

        let old_claims = svc.verify(&issued.token, TokenType::Access).await.unwrap();
        assert!(svc.needs_rotation(&old_claims));

        let rotated = svc.rotate(&issued.token).await.unwrap().unwrap();
        assert_ne!(rotated.id, issued.id);

        let new_claims = svc.verify(&rotated.token, TokenType::Access).await.unwrap();
        assert_eq!(new_claims.sub, p.user_id);
        assert_eq!(new_claims.permissions, p.permissions);

        assert_eq!(
            svc.verify(&issued.token, TokenType::Access).await,
            Err(TokenError::Blacklisted)
        );
    }

    #[tokio::test]
    async fn duplicate_rotation_loses_quietly() {
        let svc = service(TokenConfig {
            access_ttl: Duration::minutes(5),
            ..TokenConfig::default()
        });
        let issued = svc.issue(payload(), TokenType::Access).unwrap();

        let first = svc.rotate(&issued.token).await.unwrap();
        assert!(first.is_some());

        // Same token again within the marker TTL: the loser proceeds with
        // the original token rather than erroring.
        let second = svc.rotate(&issued.token).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn long_lived_token_does_not_need_rotation() {
        let svc = service(TokenConfig {
            access_ttl: Duration::hours(2),
            ..TokenConfig::default()
        });
        let issued = svc.issue(payload(), TokenType::Access).unwrap();
        let claims = svc.verify(&issued.token, TokenType::Access).await.unwrap();
        assert!(!svc.needs_rotation(&claims));
    }
}
