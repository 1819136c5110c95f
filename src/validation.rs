//! Contact-field checks for submitted leads.

use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

// RFC 5322 simplified: local@domain.tld
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

static EMAIL_REGEX: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Validate email format
///
/// Rejects addresses without `@` or `.` and placeholder addresses made of
/// repeated digits, which web forms see a lot of.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let fake_patterns = ["999999", "111111", "000000", "123456789"];
    if let Some(pattern) = fake_patterns.iter().find(|p| email.contains(*p)) {
        tracing::warn!("❌ Invalid email detected (fake pattern '{}'): {}", pattern, email);
        return false;
    }

    match EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN)) {
        Ok(re) if re.is_match(email) => true,
        Ok(_) => {
            tracing::warn!("❌ Invalid email format: {}", email);
            false
        }
        Err(e) => {
            tracing::error!("Email regex failed to compile: {}", e);
            false
        }
    }
}

/// Validate a Maltese phone number
///
/// Returns `(true, e164)` for a valid number, else `(false, reason)`.
/// The lead API stores the E.164 form of valid numbers and falls back to the
/// bare digits for anything else.
pub fn validate_mt_phone(raw: &str) -> (bool, String) {
    if raw.trim().is_empty() || raw.len() < 8 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::MT), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("✓ Valid MT phone: {} → {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("❌ Invalid MT phone number: {}", raw);
                (false, "Invalid Maltese phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("❌ Failed to parse MT phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}
