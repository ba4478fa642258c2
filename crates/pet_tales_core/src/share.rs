//! crates/pet_tales_core/src/share.rs
//!
//! Pre-filled compose links for sending a tale.

use serde::Serialize;

/// Subject line of shared e-mails.
pub const SHARE_SUBJECT: &str = "A story from PetTalesAI for you!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareLinks {
    pub email: String,
    pub sms: String,
}

impl ShareLinks {
    pub fn for_text(text: &str) -> Self {
        Self {
            email: email_url(text),
            sms: sms_url(text),
        }
    }
}

/// Web mail compose URL with the tale as body.
pub fn email_url(text: &str) -> String {
    format!(
        "https://mail.google.com/mail/?view=cm&fs=1&su={}&body={}",
        urlencoding::encode(SHARE_SUBJECT),
        urlencoding::encode(text)
    )
}

pub fn sms_url(text: &str) -> String {
    format!("sms:?&body={}", urlencoding::encode(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_are_percent_encoded() {
        let links = ShareLinks::for_text("Rex & me: 100% fun!");
        assert_eq!(links.sms, "sms:?&body=Rex%20%26%20me%3A%20100%25%20fun%21");
        assert!(links
            .email
            .starts_with("https://mail.google.com/mail/?view=cm&fs=1&su=A%20story%20from%20PetTalesAI%20for%20you%21&body="));
        assert!(links.email.ends_with("&body=Rex%20%26%20me%3A%20100%25%20fun%21"));
    }
}
