use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{models::UserId, Error, Result};

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID (UUID string)
    pub user_id: String,
    /// User email
    pub email: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Parse the user id from the claims
    pub fn user_id(&self) -> Result<UserId> {
        UserId::parse(&self.user_id)
            .map_err(|_| Error::Authentication("Malformed user id in token".to_string()))
    }
}

/// JWT service for signing and verifying HS256 tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
    token_duration: Duration,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with an HS256 secret
    pub fn new(secret: &str, token_duration_hours: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Internal("JWT secret cannot be empty".to_string()));
        }

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            algorithm: Algorithm::HS256,
            token_duration: Duration::hours(token_duration_hours as i64),
        })
    }

    /// Sign a token for a user
    pub fn sign_token(&self, user_id: &UserId, email: &str) -> Result<String> {
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            exp: (Utc::now() + self.token_duration).timestamp(),
        };

        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign token: {e}")))
    }

    /// Verify a token and extract claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.leeway = 60; // 60 seconds leeway for clock skew

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Error::Authentication("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    Error::Authentication("Invalid token".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    Error::Authentication("Invalid token signature".to_string())
                }
                _ => Error::Authentication(format!("Token verification failed: {e}")),
            })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_jwt_service() -> JwtService {
        JwtService::new("test-secret-key-for-jwt", 24).unwrap()
    }

    #[test]
    fn test_sign_and_verify_token() {
        let jwt = create_jwt_service();
        let user_id = UserId::new();

        let token = jwt.sign_token(&user_id, "a@example.com").unwrap();
        let claims = jwt.verify_token(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn test_invalid_token() {
        let jwt = create_jwt_service();
        assert!(jwt.verify_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_tampered_token() {
        let jwt = create_jwt_service();
        let user_id = UserId::new();

        let token = jwt.sign_token(&user_id, "a@example.com").unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = "tampered_payload";
        let tampered_token = parts.join(".");

        assert!(jwt.verify_token(&tampered_token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let jwt = create_jwt_service();
        let other = JwtService::new("a-different-secret", 24).unwrap();
        let user_id = UserId::new();

        let token = jwt.sign_token(&user_id, "a@example.com").unwrap();
        assert!(other.verify_token(&token).is_err());
    }

    #[test]
    fn test_empty_secret() {
        assert!(JwtService::new("", 24).is_err());
    }
}
