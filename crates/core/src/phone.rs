use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number {0:?} cannot be normalized to E.164")]
    Unnormalizable(String),
}

/// Normalizes a CRM-supplied phone number to E.164.
///
/// Ten digits are assumed to be NANP and get a `+1` prefix; eleven digits
/// starting with 1 get `+`; longer strings are taken as already carrying a
/// country code. Anything shorter cannot be dialed.
pub fn normalize_e164(raw: &str) -> Result<String, PhoneError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PhoneError::Empty);
    }
    if trimmed.starts_with('+') && trimmed[1..].chars().all(|c| c.is_ascii_digit()) {
        return Ok(trimmed.to_string());
    }

    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        10 => Ok(format!("+1{digits}")),
        11 if digits.starts_with('1') => Ok(format!("+{digits}")),
        len if len > 11 => Ok(format!("+{digits}")),
        _ => Err(PhoneError::Unnormalizable(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_e164, PhoneError};

    #[test]
    fn ten_digit_numbers_get_the_nanp_country_code() {
        assert_eq!(normalize_e164("5035550100").as_deref(), Ok("+15035550100"));
        assert_eq!(normalize_e164("(503) 555-0100").as_deref(), Ok("+15035550100"));
    }

    #[test]
    fn eleven_digits_starting_with_one_get_a_plus() {
        assert_eq!(normalize_e164("15035550100").as_deref(), Ok("+15035550100"));
        assert_eq!(normalize_e164("1-503-555-0100").as_deref(), Ok("+15035550100"));
    }

    #[test]
    fn already_e164_numbers_pass_through() {
        assert_eq!(normalize_e164("+447911123456").as_deref(), Ok("+447911123456"));
    }

    #[test]
    fn longer_international_numbers_keep_their_digits() {
        assert_eq!(normalize_e164("4479111234567").as_deref(), Ok("+4479111234567"));
    }

    #[test]
    fn short_or_empty_numbers_are_rejected() {
        assert_eq!(normalize_e164("   "), Err(PhoneError::Empty));
        assert!(matches!(normalize_e164("555-0100"), Err(PhoneError::Unnormalizable(_))));
    }
}
