//! Error types for the communication module

use std::fmt;

use thiserror::Error;

use super::{
    authenticator::AuthError, email_addresses::EmailAddressError,
    server_address::ServerAddressError,
};

/// Step of an SMTP transaction, used to report where a send failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// TCP connect, greeting and EHLO
    Connect,
    /// TLS upgrade
    StartTls,
    /// AUTH exchange
    Auth,
    /// MAIL FROM
    Mail,
    /// RCPT TO
    Rcpt,
    /// DATA and message transfer
    Data,
    /// QUIT
    Quit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::StartTls => "STARTTLS",
            Stage::Auth => "AUTH",
            Stage::Mail => "MAIL",
            Stage::Rcpt => "RCPT",
            Stage::Data => "DATA",
            Stage::Quit => "QUIT",
        };

        f.write_str(name)
    }
}

impl Stage {
    /// Wrap a transport error raised during this stage
    pub fn fail(self, source: SessionError) -> SendError {
        match self {
            Stage::Connect | Stage::StartTls => SendError::Connection {
                stage: self,
                source,
            },
            _ => SendError::Protocol {
                stage: self,
                source,
            },
        }
    }
}

/// A send request is missing a field or has a malformed one
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is empty
    #[error("{0} is required")]
    MissingField(&'static str),

    /// An address field is not a valid email
    #[error("{field}: {source}")]
    InvalidEmail {
        /// The offending field, e.g. `to[1].email`
        field: String,
        /// Why the address was refused
        source: EmailAddressError,
    },

    /// The relay address is not a `host:port` pair
    #[error("sender.server_address {address:?}: {source}")]
    InvalidServerAddress {
        /// The raw address
        address: String,
        /// Why it was refused
        source: ServerAddressError,
    },

    /// To, Cc and Bcc are all empty
    #[error("no recipients")]
    NoRecipients,

    /// An extra header would replace a generated one
    #[error("header {0:?} is generated and cannot be overridden")]
    ReservedHeader(String),

    /// An extra header name is not a valid field name
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
}

/// Errors raised by the transport layer
#[derive(Debug, Error)]
pub enum SessionError {
    /// The relay answered with a negative reply
    #[error("server replied {code} {message}")]
    Rejected {
        /// Reply code
        code: u16,
        /// Reply text
        message: String,
    },

    /// The relay answered with a positive reply other than the expected one
    #[error("unexpected reply {code} {message}, expected {expected}")]
    UnexpectedReply {
        /// Code the protocol step requires
        expected: u16,
        /// Code received
        code: u16,
        /// Reply text
        message: String,
    },

    /// A `334` challenge was not valid base64
    #[error("malformed authentication challenge")]
    MalformedChallenge,

    /// The authenticator refused to continue
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Unknown error
    #[error(transparent)]
    UnknownError(#[from] anyhow::Error),
}

/// Errors returned by a send
#[derive(Debug, Error)]
pub enum SendError {
    /// The request was refused before any network I/O
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A field that ends up on a protocol or header line contains CR or LF
    #[error("{field} must not contain CR or LF")]
    LineBreak {
        /// The offending field
        field: String,
    },

    /// Dialing or upgrading the connection failed
    #[error("{stage} failed: {source}")]
    Connection {
        /// Failing stage
        stage: Stage,
        /// Transport error
        source: SessionError,
    },

    /// The relay refused a command
    #[error("{stage} failed: {source}")]
    Protocol {
        /// Failing stage
        stage: Stage,
        /// Transport error
        source: SessionError,
    },

    /// The caller cancelled the send
    #[error("cancelled during {stage}")]
    Cancelled {
        /// Stage in flight when the send was cancelled
        stage: Stage,
    },

    /// The caller's deadline elapsed
    #[error("deadline elapsed during {stage}")]
    TimedOut {
        /// Stage in flight when the deadline elapsed
        stage: Stage,
    },
}

impl SendError {
    /// Whether the request was refused before any network I/O
    pub fn is_validation(&self) -> bool {
        matches!(self, SendError::Validation(_) | SendError::LineBreak { .. })
    }

    /// The protocol stage that failed, if the send got as far as the network
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SendError::Validation(_) | SendError::LineBreak { .. } => None,
            SendError::Connection { stage, .. }
            | SendError::Protocol { stage, .. }
            | SendError::Cancelled { stage }
            | SendError::TimedOut { stage } => Some(*stage),
        }
    }
}
