use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::parse_duration_to_secs;
use crate::utils::ApiResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct JwtUtil {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in_secs: i64,
}

impl JwtUtil {
    pub fn new(secret: &str, expires_in: &str) -> Self {
        let expires_in_secs = parse_duration_to_secs(expires_in).unwrap_or_else(|e| {
            tracing::warn!("Invalid jwt_expires_in '{}': {}, falling back to 24h", expires_in, e);
            24 * 60 * 60
        }) as i64;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expires_in_secs,
        }
    }

    pub fn generate_token(&self, user_id: i64, username: &str, role: &str) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.expires_in_secs)).timestamp(),
        };

        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    pub fn verify_token(&self, token: &str) -> ApiResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_identity() {
        let jwt = JwtUtil::new("unit-test-secret", "1h");
        let token = jwt.generate_token(7, "coach_wang", "coach").unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "coach_wang");
        assert_eq!(claims.role, "coach");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let issuer = JwtUtil::new("secret-a", "1h");
        let verifier = JwtUtil::new("secret-b", "1h");
        let token = issuer.generate_token(1, "admin", "super_admin").unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }
}
