use assembly_types::models::is_valid_period;

use crate::error::ApiError;

/// Trims `value` and checks its length in characters.
pub fn text(field: &str, value: &str, min: usize, max: usize) -> Result<String, ApiError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(ApiError::validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(trimmed.to_string())
}

/// Trimmed and lowercased. Only the shape is checked; deliverability is not.
pub fn email(value: &str) -> Result<String, ApiError> {
    let email = value.trim().to_lowercase();
    let valid = email.len() <= 254
        && !email.contains(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            });
    if !valid {
        return Err(ApiError::validation("email is not a valid address"));
    }
    Ok(email)
}

pub fn period(value: &str) -> Result<String, ApiError> {
    let period = value.trim();
    if !is_valid_period(period) {
        return Err(ApiError::validation("period must be formatted YYYY-MM"));
    }
    Ok(period.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(text("name", "  Aurora ", 1, 64).unwrap(), "Aurora");
        assert!(text("name", "   ", 1, 64).is_err());
        assert!(text("name", &"x".repeat(65), 1, 64).is_err());
        // Counted in characters, not bytes.
        assert!(text("name", "ééé", 1, 3).is_ok());
    }

    #[test]
    fn email_shape() {
        assert_eq!(email(" Rep@Example.COM ").unwrap(), "rep@example.com");
        for bad in ["", "rep", "rep@", "@example.com", "rep@example", "a b@example.com", "a@b@c.io", "rep@.io"] {
            assert!(email(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn period_shape() {
        assert_eq!(period(" 2026-10 ").unwrap(), "2026-10");
        assert!(period("2026-13").is_err());
    }
}
