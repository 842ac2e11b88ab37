//! Form field validation.
//!
//! Local checks mirror the server's expectations so obviously-bad input
//! never leaves the client. Errors are data: each check returns a map
//! from field to message, and an empty map means the input passed.
//! Nothing here performs I/O or panics.

use std::collections::BTreeMap;

/// Number of digits in a reset passcode.
pub const OTP_LEN: usize = 4;

/// Minimum password length for registration and password reset.
const MIN_PASSWORD_LEN: usize = 8;

/// Form fields that can carry a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Name,
    Email,
    Password,
    ConfirmPassword,
    NewPassword,
    Otp,
}

/// Field-keyed validation errors, ordered for stable display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Check that a string looks like an email address: a non-empty local
/// part, one '@', and a domain with an interior dot.
pub fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = s.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = match parts.next() {
        Some(d) => d,
        None => return false,
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.find('.') {
        Some(i) => i > 0 && !domain.ends_with('.'),
        None => false,
    }
}

/// Check that a string is a complete passcode: exactly four ASCII digits.
pub fn is_valid_otp(s: &str) -> bool {
    s.len() == OTP_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

fn password_too_short(password: &str) -> bool {
    password.chars().count() < MIN_PASSWORD_LEN
}

/// Login form: email shape plus a non-empty password.
pub fn validate_login(email: &str, password: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if !is_valid_email(email) {
        errors.set(Field::Email, "Invalid email address");
    }
    if password.is_empty() {
        errors.set(Field::Password, "Password is required");
    }
    errors
}

/// Registration form: name, email shape, password length, confirmation.
/// A mismatch is reported on the confirmation field, not the password.
pub fn validate_register(
    name: &str,
    email: &str,
    password: &str,
    confirm_password: &str,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if name.trim().is_empty() {
        errors.set(Field::Name, "Name is required");
    }
    if !is_valid_email(email) {
        errors.set(Field::Email, "Invalid email address");
    }
    if password_too_short(password) {
        errors.set(Field::Password, "Password must be at least 8 characters long");
    }
    if password != confirm_password {
        errors.set(Field::ConfirmPassword, "Passwords do not match");
    }
    errors
}

/// First reset phase: only the email address is checked.
pub fn validate_reset_request(email: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if !is_valid_email(email) {
        errors.set(Field::Email, "Invalid email address");
    }
    errors
}

/// Second reset phase: passcode shape, new password length, confirmation.
pub fn validate_reset_submit(
    otp: &str,
    new_password: &str,
    confirm_password: &str,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if !is_valid_otp(otp) {
        errors.set(Field::Otp, "OTP must be 4 digits");
    }
    if password_too_short(new_password) {
        errors.set(Field::NewPassword, "Password must be at least 8 characters long");
    }
    if new_password != confirm_password {
        errors.set(Field::ConfirmPassword, "Passwords do not match");
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last@sub.example.co"));

        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com")); // empty local part
        assert!(!is_valid_email("user@")); // empty domain
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com")); // dot leads the domain
        assert!(!is_valid_email("user@domain.")); // dot ends the domain
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user name@example.com")); // whitespace
    }

    #[test]
    fn test_is_valid_otp() {
        assert!(is_valid_otp("1234"));
        assert!(is_valid_otp("0000"));

        assert!(!is_valid_otp(""));
        assert!(!is_valid_otp("123"));
        assert!(!is_valid_otp("12345"));
        assert!(!is_valid_otp("12a4"));
        assert!(!is_valid_otp("12 4"));
    }

    #[test]
    fn test_validate_login() {
        assert!(validate_login("a@b.com", "hunter2").is_empty());

        let errors = validate_login("not-an-email", "");
        assert_eq!(errors.get(Field::Email), Some("Invalid email address"));
        assert_eq!(errors.get(Field::Password), Some("Password is required"));
    }

    #[test]
    fn test_validate_register() {
        assert!(validate_register("Ada", "ada@example.com", "longenough", "longenough").is_empty());

        let errors = validate_register("", "ada@example.com", "short", "short");
        assert_eq!(errors.get(Field::Name), Some("Name is required"));
        assert_eq!(
            errors.get(Field::Password),
            Some("Password must be at least 8 characters long")
        );
        assert!(errors.get(Field::ConfirmPassword).is_none());
    }

    #[test]
    fn test_register_mismatch_lands_on_confirmation() {
        let errors = validate_register("Ada", "ada@example.com", "abcdefgh", "abcdefghX");
        assert!(errors.get(Field::Password).is_none());
        assert_eq!(errors.get(Field::ConfirmPassword), Some("Passwords do not match"));
    }

    #[test]
    fn test_validate_reset_submit() {
        assert!(validate_reset_submit("1234", "abcdefgh", "abcdefgh").is_empty());

        let errors = validate_reset_submit("12x4", "abcdefgh", "abcdefghX");
        assert_eq!(errors.get(Field::Otp), Some("OTP must be 4 digits"));
        assert_eq!(errors.get(Field::ConfirmPassword), Some("Passwords do not match"));
        assert!(errors.get(Field::NewPassword).is_none());
    }
}
