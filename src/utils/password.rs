use bcrypt::{DEFAULT_COST, hash, verify};

use crate::utils::{ApiError, ApiResult};

pub fn hash_password(password: &str) -> ApiResult<String> {
    Ok(hash(password, DEFAULT_COST)?)
}

pub fn verify_password(password: &str, password_hash: &str) -> ApiResult<bool> {
    Ok(verify(password, password_hash)?)
}

/// 密码规则：8-16 位，至少包含字母、数字和特殊字符各一个
pub fn validate_password_strength(password: &str) -> ApiResult<()> {
    let len = password.chars().count();
    if !(8..=16).contains(&len) {
        return Err(ApiError::validation_error("密码长度必须为8-16位"));
    }

    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if !(has_letter && has_digit && has_special) {
        return Err(ApiError::validation_error("密码必须包含字母、数字和特殊字符"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_password() {
        assert!(validate_password_strength("Abc123!@").is_ok());
        assert!(validate_password_strength("pass_word9").is_ok());
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(validate_password_strength("a1!").is_err());
        assert!(validate_password_strength("abcdefgh12345678!").is_err());
    }

    #[test]
    fn rejects_missing_classes() {
        assert!(validate_password_strength("abcdefgh").is_err());
        assert!(validate_password_strength("abcd1234").is_err());
        assert!(validate_password_strength("abcd!@#$").is_err());
        assert!(validate_password_strength("1234!@#$").is_err());
    }

    #[test]
    fn hash_then_verify() {
        let hashed = hash_password("Secret#123").unwrap();
        assert!(verify_password("Secret#123", &hashed).unwrap());
        assert!(!verify_password("Secret#124", &hashed).unwrap());
    }
}
