//! Email Address

use lazy_static::lazy_static;
use lettre::Address;
use regex::Regex;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^@\s<>\p{Cc}]+@[^@\s<>\p{Cc}]+\.[^@\s<>.\p{Cc}][^@\s<>\p{Cc}]*$"
    )
    .expect("email regex is valid");
}

use std::fmt;

use thiserror::Error;

use EmailAddressError::*;

/// An error that can occur when creating an email address
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailAddressError {
    /// The email address is empty
    #[error("email is empty")]
    EmptyEmailAddress,

    /// The email address contains a carriage return or line feed
    #[error("email contains CR or LF")]
    ContainsLineBreak,

    /// The email address is invalid
    #[error("email is invalid")]
    InvalidEmailAddress,
}

/// An email address
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new email address
    ///
    /// Line breaks are checked before trimming, so a trailing `\r\n` is rejected
    /// rather than silently removed.
    pub fn new(raw: &str) -> Result<Self, EmailAddressError> {
        if contains_line_break(raw) {
            return Err(ContainsLineBreak);
        }

        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(EmptyEmailAddress);
        }

        if !EMAIL_REGEX.is_match(trimmed) || trimmed.parse::<Address>().is_err() {
            return Err(InvalidEmailAddress);
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address in the form lettre's SMTP commands take
    pub fn to_address(&self) -> Result<Address, EmailAddressError> {
        self.0.parse().map_err(|_| InvalidEmailAddress)
    }
}

/// Returns true if `value` contains a carriage return or a line feed.
pub fn contains_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EmailAddress> for String {
    fn from(email: EmailAddress) -> Self {
        email.0
    }
}
