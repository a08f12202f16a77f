//! Relay server address

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Submission endpoint of Gmail's public relay.
pub const GMAIL_SMTP_HOST_PORT: &str = "smtp.gmail.com:587";

/// Errors that can occur when parsing a `host:port` pair
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerAddressError {
    /// The address has no `:port` suffix
    #[error("missing port in address")]
    MissingPort,

    /// The host part is empty
    #[error("missing host in address")]
    MissingHost,

    /// An unbracketed IPv6 literal or similar
    #[error("too many colons in address")]
    TooManyColons,

    /// The port is not a number between 1 and 65535
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

/// A relay address, split into host and port
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    /// Create a server address from its parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name (or IP literal, without brackets)
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ServerAddress {
    type Err = ServerAddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (host, port) = match raw.strip_prefix('[') {
            Some(rest) => {
                let (host, rest) = rest.split_once(']').ok_or(ServerAddressError::MissingPort)?;
                let port = rest
                    .strip_prefix(':')
                    .ok_or(ServerAddressError::MissingPort)?;
                (host, port)
            }
            None => {
                let (host, port) = raw.rsplit_once(':').ok_or(ServerAddressError::MissingPort)?;
                if host.contains(':') {
                    return Err(ServerAddressError::TooManyColons);
                }
                (host, port)
            }
        };

        if host.trim().is_empty() || host.chars().any(char::is_whitespace) {
            return Err(ServerAddressError::MissingHost);
        }

        let port = match port.parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => return Err(ServerAddressError::InvalidPort(port.to_string())),
        };

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
