//! Session tokens: HS256-signed JWTs carrying the user id and email

use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::interceptor::AuthInfo;

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub email: String,
    pub exp: u64, // Expiration timestamp (Unix seconds)
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Invalid algorithm: expected HS256, got {0:?}")]
    Algorithm(Algorithm),

    #[error("Token expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    #[error("System clock is before the Unix epoch")]
    Clock,
}

fn now_secs() -> Result<u64, TokenError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TokenError::Clock)
}

/// Issues and verifies session tokens with the server's HMAC secret
#[derive(Clone)]
pub struct TokenManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenManager {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token expiring `ttl` from now
    pub fn issue(&self, user_id: i64, email: &str) -> Result<String, TokenError> {
        let claims = Claims {
            uid: user_id,
            email: email.to_string(),
            exp: now_secs()? + self.ttl.as_secs(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry and return the claims
    pub fn verify_claims(&self, token: &str) -> Result<Claims, TokenError> {
        // Pin the algorithm before touching the signature
        let header = decode_header(token)?;
        if header.alg != Algorithm::HS256 {
            return Err(TokenError::Algorithm(header.alg));
        }

        // Expiry is checked below without leeway
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)?.claims;

        if claims.exp <= now_secs()? {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    pub fn verify(&self, token: &str) -> Result<AuthInfo, TokenError> {
        let claims = self.verify_claims(token)?;
        Ok(AuthInfo {
            user_id: claims.uid,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new(b"test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = manager();
        let token = tokens.issue(42, "alice@example.com").unwrap();

        // header.payload.signature
        assert_eq!(token.split('.').count(), 3);

        let claims = tokens.verify_claims(&token).unwrap();
        assert_eq!(claims.uid, 42);
        assert_eq!(claims.email, "alice@example.com");

        let now = now_secs().unwrap();
        assert!(claims.exp >= now + 3599 && claims.exp <= now + 3600);

        let info = tokens.verify(&token).unwrap();
        assert_eq!(info.user_id, 42);
        assert_eq!(info.email, "alice@example.com");
    }

    #[test]
    fn test_expired_token() {
        let tokens = TokenManager::new(b"test-secret", Duration::ZERO);
        let token = tokens.issue(1, "a@b.c").unwrap();

        // exp == now is already expired
        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_wrong_secret() {
        let token = manager().issue(1, "a@b.c").unwrap();
        let other = TokenManager::new(b"another-secret", Duration::from_secs(3600));

        assert!(matches!(other.verify(&token), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_other_hmac_algorithms_are_rejected() {
        let claims = Claims {
            uid: 1,
            email: "a@b.c".to_string(),
            exp: now_secs().unwrap() + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(
            manager().verify(&token),
            Err(TokenError::Algorithm(Algorithm::HS512))
        ));
    }

    #[test]
    fn test_asymmetric_and_none_headers_are_rejected() {
        // {"uid":1,"email":"a@b.c","exp":99999999999}
        let payload = "eyJ1aWQiOjEsImVtYWlsIjoiYUBiLmMiLCJleHAiOjk5OTk5OTk5OTk5fQ";

        // {"alg":"RS256","typ":"JWT"}
        let rs256 = format!("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{}.c2ln", payload);
        assert!(matches!(
            manager().verify(&rs256),
            Err(TokenError::Algorithm(Algorithm::RS256))
        ));

        // {"alg":"none","typ":"JWT"} with an empty signature
        let none = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{}.", payload);
        assert!(manager().verify(&none).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let tokens = manager();
        for token in ["", "abc", "a.b.c", "Bearer x.y.z"] {
            assert!(tokens.verify(token).is_err(), "accepted {:?}", token);
        }
    }
}
