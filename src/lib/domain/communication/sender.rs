//! Sender and credentials

use std::{convert::Infallible, fmt, str::FromStr, sync::Arc};

use super::authenticator::Authenticator;

/// An SMTP password. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wrap a raw password
    pub fn new(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// Whether the password is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for Password {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(raw))
    }
}

impl fmt::Display for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

/// How the sender authenticates against the relay
#[derive(Clone, Debug)]
pub enum Credential {
    /// Username and password, sent with the PLAIN mechanism
    Password {
        /// Authentication identity
        username: String,
        /// Secret
        password: Password,
    },

    /// A caller supplied mechanism
    Authenticator(Arc<dyn Authenticator>),
}

/// The party submitting the message
#[derive(Clone, Debug)]
pub struct Sender {
    /// Relay address as `host:port`
    pub server_address: String,

    /// Envelope sender and `From` address
    pub email: String,

    /// Display name for the `From` header
    pub name: String,

    /// Credential used for `AUTH`
    pub credential: Credential,
}

impl Sender {
    /// A sender authenticating with a username and password
    pub fn with_password(server_address: &str, email: &str, username: &str, password: &str) -> Self {
        Self {
            server_address: server_address.to_string(),
            email: email.to_string(),
            name: String::new(),
            credential: Credential::Password {
                username: username.to_string(),
                password: Password::new(password),
            },
        }
    }

    /// A sender authenticating with an injected [`Authenticator`]
    pub fn with_authenticator(
        server_address: &str,
        email: &str,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            server_address: server_address.to_string(),
            email: email.to_string(),
            name: String::new(),
            credential: Credential::Authenticator(authenticator),
        }
    }

    /// Set the display name used in the `From` header
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}
