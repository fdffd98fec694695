//! HS256 bearer tokens and short-lived signed-resource tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Lifetime of a signed download token.
pub const SIGNED_URL_TTL_SECS: i64 = 300;

const RESOURCE_PREFIX: &str = "resource:";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Invalid(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Signs and verifies tokens with one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn create_token(&self, subject: &str, ttl_secs: i64) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            exp: iat + ttl_secs,
            iat,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Encoding(e.to_string()))
    }

    pub fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Token that grants access to a single resource for a few minutes.
    pub fn create_signed_url_token(&self, resource_id: &str) -> Result<String, AuthError> {
        self.create_token(&format!("{RESOURCE_PREFIX}{resource_id}"), SIGNED_URL_TTL_SECS)
    }

    pub fn verify_signed_url_token(&self, token: &str, resource_id: &str) -> bool {
        match self.decode_token(token) {
            Ok(claims) => claims
                .sub
                .strip_prefix(RESOURCE_PREFIX)
                .is_some_and(|id| id == resource_id),
            Err(e) => {
                tracing::debug!(error = %e, "Signed URL token rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    #[test]
    fn token_round_trip() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.create_token("alice", 3600).unwrap();
        let claims = signer.decode_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_token_rejected() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.create_token("alice", -120).unwrap();
        assert!(matches!(signer.decode_token(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = TokenSigner::new(SECRET).create_token("alice", 60).unwrap();
        let other = TokenSigner::new("another-secret-also-long-enough-0000");
        assert!(matches!(other.decode_token(&token), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn garbage_rejected() {
        let signer = TokenSigner::new(SECRET);
        assert!(matches!(signer.decode_token("not.a.jwt"), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn signed_url_token_bound_to_resource() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.create_signed_url_token("report-1").unwrap();
        assert!(signer.verify_signed_url_token(&token, "report-1"));
        assert!(!signer.verify_signed_url_token(&token, "report-2"));

        let plain = signer.create_token("report-1", 60).unwrap();
        assert!(!signer.verify_signed_url_token(&plain, "report-1"));
    }
}
