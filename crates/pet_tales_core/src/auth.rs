//! crates/pet_tales_core/src/auth.rs
//!
//! Sign-in and sign-up failures as the writer sees them.

/// Why an authentication attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("Invalid login credentials.")]
    InvalidCredentials,
    /// Reported to the writer exactly like bad credentials.
    #[error("Invalid login credentials.")]
    EmailNotConfirmed,
    #[error("User already registered")]
    EmailTaken,
    #[error("Password should be at least {0} characters.")]
    WeakPassword(usize),
    #[error("{0}")]
    Other(String),
}

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

impl AuthFailure {
    /// The message shown to the writer.
    pub fn user_message(&self) -> String {
        match self {
            AuthFailure::Other(message) if message.trim().is_empty() => {
                "An unexpected error occurred.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Checks sign-up input before anything is stored.
pub fn validate_signup(email: &str, password: &str) -> Result<(), AuthFailure> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(AuthFailure::Other("Unable to validate email address: invalid format".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthFailure::WeakPassword(MIN_PASSWORD_LEN));
    }
    Ok(())
}

/// Success toast after signing in; new accounts are greeted by name.
pub fn welcome_message(display_name: Option<&str>, new_account: bool) -> String {
    match (new_account, display_name.map(str::trim).filter(|n| !n.is_empty())) {
        (true, Some(name)) => format!("Welcome {}! Your account is ready.", name),
        (true, None) => "Welcome! Your account is ready.".to_string(),
        (false, _) => "Welcome back!".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfirmed_email_reads_like_bad_credentials() {
        assert_eq!(
            AuthFailure::EmailNotConfirmed.user_message(),
            AuthFailure::InvalidCredentials.user_message()
        );
        assert_eq!(
            AuthFailure::EmailNotConfirmed.user_message(),
            "Invalid login credentials."
        );
    }

    #[test]
    fn empty_messages_get_a_fallback() {
        assert_eq!(
            AuthFailure::Other(String::new()).user_message(),
            "An unexpected error occurred."
        );
    }

    #[test]
    fn signup_validation() {
        assert!(validate_signup("a@b.co", "secret").is_ok());
        assert_eq!(
            validate_signup("a@b.co", "short"),
            Err(AuthFailure::WeakPassword(6))
        );
        assert!(validate_signup("not-an-email", "secret1").is_err());
    }

    #[test]
    fn welcome_texts() {
        assert_eq!(welcome_message(Some("Sam"), true), "Welcome Sam! Your account is ready.");
        assert_eq!(welcome_message(Some("Sam"), false), "Welcome back!");
    }
}
