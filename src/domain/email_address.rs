use std::fmt;
use std::str::FromStr;

use regex::Regex;

use unicode_segmentation::UnicodeSegmentation;

const MAX_LEN: usize = 256;

/// An e-mail address accepted as a member identity on the remote service
#[derive(Debug, PartialEq, Clone)]
pub struct EmailAddress(String);

impl FromStr for EmailAddress {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        lazy_static::lazy_static! {
            static ref EMAIL_REGEX: Regex =
                Regex::new(r"^[\w.+\-]+@[\w\-]+(\.[\w\-]+)+$").expect("valid e-mail pattern");
        }

        let value = value.trim();

        if value.is_empty() {
            return Err("Email address cannot be empty".into());
        }
        if value.graphemes(true).count() > MAX_LEN {
            return Err("Email address too long".into());
        }
        if !EMAIL_REGEX.is_match(value) {
            return Err(format!("Email address of incorrect format: {}", value));
        }

        // Normalize
        Ok(Self(value.to_lowercase()))
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<EmailAddress> for String {
    fn from(value: EmailAddress) -> Self {
        value.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
