use crate::database::sqlite::SqliteDatabase;
use crate::errors::{AppError, Result};
use crate::models::profile::{Profile, Role};
use crate::services::jwt::{AuthenticatedUser, JwtManager};
use crate::utils::crypto::PasswordManager;
use crate::utils::validation::Validator;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub full_name: String,
    pub mobile_number: String,
    pub password: String,
    pub role: Role,
    pub panchayat: Option<String>,
    pub ward: Option<i32>,
}

pub struct AuthService {
    jwt_manager: JwtManager,
    database: Arc<SqliteDatabase>,
}

impl AuthService {
    pub fn new(database: Arc<SqliteDatabase>, jwt_secret: String) -> Self {
        Self {
            jwt_manager: JwtManager::new(jwt_secret),
            database,
        }
    }

    /// Self-service sign-up; admin accounts are refused here.
    pub async fn register(&self, new_profile: NewProfile) -> Result<Profile> {
        if new_profile.role == Role::Admin {
            return Err(AppError::Forbidden(
                "Admin accounts can only be created by an operator".to_string(),
            ));
        }
        self.create_profile(new_profile).await
    }

    /// Creates a profile of any role, admin included. Used by the CLI.
    pub async fn create_profile(&self, new_profile: NewProfile) -> Result<Profile> {
        let full_name = new_profile.full_name.trim().to_string();
        let mobile_number = Validator::normalize_mobile(&new_profile.mobile_number)?;
        Validator::validate_full_name(&full_name)?;
        Validator::validate_password(&new_profile.password)?;
        if let Some(panchayat) = &new_profile.panchayat {
            Validator::validate_panchayat(panchayat)?;
        }
        if let Some(ward) = new_profile.ward {
            Validator::validate_ward(ward)?;
        }

        if self.database.get_profile_by_mobile(&mobile_number).await?.is_some() {
            info!(action = "register_mobile_conflict", mobile = %mobile_number);
            return Err(AppError::Conflict("Mobile number already registered".to_string()));
        }

        let now = Utc::now();
        let profile = Profile {
            id: Uuid::new_v4(),
            full_name,
            mobile_number,
            password_hash: PasswordManager::hash_password(&new_profile.password)?,
            role: new_profile.role,
            panchayat: new_profile.panchayat.map(|p| p.trim().to_string()),
            ward: new_profile.ward,
            created_at: now,
            updated_at: now,
        };
        self.database.create_profile(&profile).await?;

        info!(action = "register_success", profile_id = %profile.id, role = %profile.role);
        Ok(profile)
    }

    pub async fn authenticate(&self, mobile_number: &str, password: &str) -> Result<Profile> {
        let mobile_number = Validator::normalize_mobile(mobile_number).map_err(|_| {
            AppError::AuthenticationError("Invalid mobile number or password".to_string())
        })?;
        let profile = self
            .find_by_mobile(&mobile_number)
            .await?
            .ok_or_else(|| AppError::AuthenticationError("Invalid mobile number or password".to_string()))?;

        if !PasswordManager::verify_password(password, &profile.password_hash)? {
            warn!(action = "login_failed", profile_id = %profile.id);
            return Err(AppError::AuthenticationError(
                "Invalid mobile number or password".to_string(),
            ));
        }
        Ok(profile)
    }

    pub async fn login(&self, mobile_number: &str, password: &str) -> Result<(String, Profile)> {
        let profile = self.authenticate(mobile_number, password).await?;
        let token = self.jwt_manager.generate_token(&profile.id, profile.role)?;
        info!(action = "login_success", profile_id = %profile.id);
        Ok((token, profile))
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthenticatedUser> {
        let token_data = self.jwt_manager.validate_token(token)?;
        AuthenticatedUser::try_from(token_data.claims)
    }

    /// Looks a profile up by any accepted spelling of its mobile number.
    pub async fn find_by_mobile(&self, mobile_number: &str) -> Result<Option<Profile>> {
        let mobile_number = Validator::normalize_mobile(mobile_number)?;
        self.database.get_profile_by_mobile(&mobile_number).await
    }

    pub async fn get_profile(&self, profile_id: &Uuid) -> Result<Profile> {
        self.database.get_profile_by_id(profile_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(mobile: &str) -> NewProfile {
        NewProfile {
            full_name: "Meera Nair".to_string(),
            mobile_number: mobile.to_string(),
            password: "payasam42".to_string(),
            role: Role::Customer,
            panchayat: Some("Aroor".to_string()),
            ward: Some(4),
        }
    }

    async fn service() -> AuthService {
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        AuthService::new(db, "test-secret-test-secret".to_string())
    }

    #[tokio::test]
    async fn register_then_login() {
        let auth = service().await;
        let profile = auth.register(customer("9847000001")).await.unwrap();

        let (token, logged_in) = auth.login("9847000001", "payasam42").await.unwrap();
        assert_eq!(logged_in.id, profile.id);
        let user = auth.validate_token(&token).unwrap();
        assert_eq!(user.profile_id, profile.id);
        assert_eq!(user.role, Role::Customer);

        assert!(matches!(
            auth.login("9847000001", "wrong-pass1").await,
            Err(AppError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_mobile_is_a_conflict() {
        let auth = service().await;
        auth.register(customer("9847000002")).await.unwrap();
        assert!(matches!(
            auth.register(customer("9847000002")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn country_code_spelling_is_the_same_number() {
        let auth = service().await;
        let profile = auth.register(customer("9847012345")).await.unwrap();
        assert_eq!(profile.mobile_number, "9847012345");

        assert!(matches!(
            auth.register(customer("+919847012345")).await,
            Err(AppError::Conflict(_))
        ));
        let (_, logged_in) = auth.login("+919847012345", "payasam42").await.unwrap();
        assert_eq!(logged_in.id, profile.id);
    }

    #[tokio::test]
    async fn admin_self_registration_is_refused() {
        let auth = service().await;
        let mut admin = customer("9847000003");
        admin.role = Role::Admin;
        assert!(matches!(auth.register(admin.clone()).await, Err(AppError::Forbidden(_))));
        assert_eq!(auth.create_profile(admin).await.unwrap().role, Role::Admin);
    }
}
