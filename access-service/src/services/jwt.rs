use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::services::error::AccessError;

/// HS256 signer/verifier for access tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

/// Claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Subject id, empty for client-only tokens
    pub sub: String,
    pub client_id: String,
    /// Subject role, `"client"` for client-credentials tokens
    pub role: String,
    pub scopes: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    /// Unique per token so two tokens minted in the same second never collide
    pub jti: String,
}

impl JwtService {
    pub fn new(secret: &SecretString) -> Self {
        let key = secret.expose_secret().as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
        }
    }

    pub fn sign(&self, claims: &AccessTokenClaims) -> Result<String, AccessError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AccessError::Internal(anyhow::anyhow!("Failed to encode access token: {}", e)))
    }

    /// Signature and `exp` check. An expired signature reports `ExpiredToken`;
    /// every other failure is `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, AccessError> {
        decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AccessError::ExpiredToken,
                _ => {
                    tracing::debug!(error = %e, "Access token rejected");
                    AccessError::InvalidToken
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service(secret: &str) -> JwtService {
        JwtService::new(&SecretString::new(secret.to_string()))
    }

    fn claims(exp_offset: i64) -> AccessTokenClaims {
        let now = Utc::now().timestamp();
        AccessTokenClaims {
            sub: "u1".to_string(),
            client_id: "c1".to_string(),
            role: "admin".to_string(),
            scopes: vec!["read".to_string(), "write".to_string()],
            exp: now + exp_offset,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let jwt = service("test-secret-key-with-enough-length!!");
        let original = claims(300);
        let token = jwt.sign(&original).unwrap();

        assert_eq!(jwt.verify(&token).unwrap(), original);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = service("first-secret-key-with-enough-length!")
            .sign(&claims(300))
            .unwrap();

        let result = service("second-secret-key-with-enough-length").verify(&token);
        assert!(matches!(result, Err(AccessError::InvalidToken)));
    }

    #[test]
    fn test_expired_signature_is_expired_token() {
        let jwt = service("test-secret-key-with-enough-length!!");
        let token = jwt.sign(&claims(-60)).unwrap();

        assert!(matches!(jwt.verify(&token), Err(AccessError::ExpiredToken)));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let jwt = service("test-secret-key-with-enough-length!!");
        assert!(matches!(jwt.verify("not.a.jwt"), Err(AccessError::InvalidToken)));
    }
}
