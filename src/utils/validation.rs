use crate::errors::{AppError, Result};
use regex::Regex;

fn pattern(re: &str) -> Result<Regex> {
    Regex::new(re).map_err(|e| AppError::InternalError(format!("Regex error: {}", e)))
}

/// Upper bound for a single cart line.
pub const MAX_LINE_QUANTITY: i32 = 500;

pub struct Validator;

impl Validator {
    /// Indian mobile numbers, optionally prefixed with +91.
    pub fn validate_mobile(mobile: &str) -> Result<()> {
        let mobile = mobile.trim();
        if !pattern(r"^(\+91)?[6-9]\d{9}$")?.is_match(mobile) {
            return Err(AppError::ValidationError(
                "Mobile number must be 10 digits starting with 6-9".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates a mobile number and returns its bare 10-digit form, so `+91`
    /// and unprefixed spellings of one number resolve to the same account.
    pub fn normalize_mobile(mobile: &str) -> Result<String> {
        let mobile = mobile.trim();
        Self::validate_mobile(mobile)?;
        Ok(mobile.strip_prefix("+91").unwrap_or(mobile).to_string())
    }

    pub fn validate_full_name(name: &str) -> Result<()> {
        let name = name.trim();
        if name.len() < 2 {
            return Err(AppError::ValidationError("Name must be at least 2 characters long".to_string()));
        }
        if name.len() > 80 {
            return Err(AppError::ValidationError("Name must be less than 80 characters".to_string()));
        }
        if !pattern(r"^[\p{L} .'-]+$")?.is_match(name) {
            return Err(AppError::ValidationError(
                "Name can only contain letters, spaces, dots, apostrophes and hyphens".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_password(password: &str) -> Result<()> {
        if password.len() < 8 {
            return Err(AppError::ValidationError("Password must be at least 8 characters long".to_string()));
        }
        if password.len() > 128 {
            return Err(AppError::ValidationError("Password must be less than 128 characters".to_string()));
        }

        let has_letter = password.chars().any(|c| c.is_alphabetic());
        let has_digit = password.chars().any(|c| c.is_numeric());
        if !has_letter || !has_digit {
            return Err(AppError::ValidationError(
                "Password must contain at least one letter and one digit".to_string(),
            ));
        }
        Ok(())
    }

    /// Registration plates such as `KL 07 AB 1234` or `KL-07-1234`.
    pub fn validate_vehicle_number(number: &str) -> Result<()> {
        let number = number.trim().to_uppercase();
        if !pattern(r"^[A-Z]{2}[ -]?\d{1,2}[ -]?[A-Z]{0,3}[ -]?\d{1,4}$")?.is_match(&number) {
            return Err(AppError::ValidationError(format!("Invalid vehicle number: {}", number)));
        }
        Ok(())
    }

    pub fn validate_panchayat(panchayat: &str) -> Result<()> {
        let panchayat = panchayat.trim();
        if panchayat.is_empty() || panchayat.len() > 80 {
            return Err(AppError::ValidationError("Panchayat must be 1-80 characters".to_string()));
        }
        Ok(())
    }

    pub fn validate_ward(ward: i32) -> Result<()> {
        if !(1..=99).contains(&ward) {
            return Err(AppError::ValidationError("Ward must be between 1 and 99".to_string()));
        }
        Ok(())
    }

    pub fn validate_quantity(quantity: i32) -> Result<()> {
        if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
            return Err(AppError::ValidationError("Quantity must be between 1 and 500".to_string()));
        }
        Ok(())
    }
}
