use crate::errors::{AppError, Result};
use crate::models::profile::Role;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

pub struct JwtManager {
    secret: String,
    ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            ttl: Duration::hours(24),
        }
    }

    pub fn generate_token(&self, profile_id: &Uuid, role: Role) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: profile_id.to_string(),
            role,
            exp: (now + self.ttl).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Failed to generate token: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))
    }
}

/// The caller behind a validated bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub profile_id: Uuid,
    pub role: Role,
    pub token_id: String,
}

impl AuthenticatedUser {
    pub fn require(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "{} accounts cannot perform this action",
                self.role
            )))
        }
    }
}

impl TryFrom<Claims> for AuthenticatedUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self> {
        let profile_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| AppError::ValidationError(format!("Invalid profile ID in token: {}", e)))?;

        Ok(Self {
            profile_id,
            role: claims.role,
            token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_role() {
        let manager = JwtManager::new("test-secret-test-secret".to_string());
        let id = Uuid::new_v4();
        let token = manager.generate_token(&id, Role::Cook).unwrap();

        let user = AuthenticatedUser::try_from(manager.validate_token(&token).unwrap().claims).unwrap();
        assert_eq!(user.profile_id, id);
        assert_eq!(user.role, Role::Cook);
        assert!(user.require(&[Role::Admin]).is_err());
        assert!(user.require(&[Role::Cook, Role::Admin]).is_ok());
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = JwtManager::new("one-secret-one-secret".to_string())
            .generate_token(&Uuid::new_v4(), Role::Customer)
            .unwrap();
        assert!(JwtManager::new("two-secret-two-secret".to_string())
            .validate_token(&token)
            .is_err());
    }
}
