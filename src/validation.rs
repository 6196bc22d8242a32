use crate::error::{AppError, AppResult};

const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Checks run before any remote call; failures surface as
/// `InvalidInput` next to the offending field.
pub fn validate_email(value: &str) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("Email is required"));
    }

    let mut parts = trimmed.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AppError::invalid_input("Please enter a valid email address"));
    }

    if trimmed.chars().any(char::is_whitespace) {
        return Err(AppError::invalid_input("Please enter a valid email address"));
    }

    Ok(())
}

pub fn validate_password(value: &str) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::invalid_input("Password is required"));
    }
    Ok(())
}

pub fn validate_display_name(value: &str) -> AppResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("Display name is required"));
    }
    if trimmed.len() > MAX_DISPLAY_NAME_LEN {
        return Err(AppError::invalid_input("Display name is too long"));
    }
    Ok(())
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn normalize_display_name(value: &str) -> String {
    value.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_expected_shapes() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("  alice@example.com  ").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("alice@nodot").is_err());
        assert!(validate_email("a lice@example.com").is_err());
    }

    #[test]
    fn password_must_not_be_blank() {
        assert!(validate_password("hunter2").is_ok());
        assert!(validate_password("").is_err());
    }

    #[test]
    fn display_name_rejects_blank_and_oversized() {
        assert!(validate_display_name("bob").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn normalization_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_display_name("  bob "), "bob");
    }
}
