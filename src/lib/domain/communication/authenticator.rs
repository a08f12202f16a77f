//! SMTP authentication mechanisms

use std::fmt;

use thiserror::Error;

use super::sender::Password;

/// Errors raised by an [`Authenticator`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Refusing to send credentials over a plaintext connection
    #[error("refusing to authenticate over an unencrypted connection")]
    Unencrypted,

    /// The connected host is not the one the credentials were created for
    #[error("wrong host name: expected {expected}, connected to {actual}")]
    WrongHost {
        /// Host the authenticator was created for
        expected: String,
        /// Host of the current connection
        actual: String,
    },

    /// The server sent a challenge the mechanism does not understand
    #[error("unexpected server challenge {0:?}")]
    UnexpectedChallenge(String),
}

/// What the session driver knows about the relay at authentication time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    /// Host name the connection was dialed with
    pub host: String,

    /// Whether the connection has been upgraded to TLS
    pub tls: bool,
}

/// First step of an AUTH exchange
#[derive(Clone, PartialEq, Eq)]
pub struct AuthStart {
    /// SASL mechanism name sent with `AUTH`
    pub mechanism: String,

    /// Initial response, sent on the `AUTH` line when present
    pub initial_response: Option<Vec<u8>>,
}

impl fmt::Debug for AuthStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStart")
            .field("mechanism", &self.mechanism)
            .field("initial_response", &self.initial_response.as_ref().map(|_| "********"))
            .finish()
    }
}

/// A SASL mechanism able to drive an SMTP `AUTH` exchange.
///
/// The session driver handles base64 framing; implementations only deal in
/// decoded challenge and response bytes.
pub trait Authenticator: fmt::Debug + Send + Sync {
    /// Begin the exchange with the given server.
    fn start(&self, server: &ServerInfo) -> Result<AuthStart, AuthError>;

    /// Answer a `334` challenge.
    fn next(&self, challenge: &[u8]) -> Result<Vec<u8>, AuthError>;
}

fn check_server(expected: &str, server: &ServerInfo) -> Result<(), AuthError> {
    if !server.tls {
        return Err(AuthError::Unencrypted);
    }

    if !server.host.eq_ignore_ascii_case(expected) {
        return Err(AuthError::WrongHost {
            expected: expected.to_string(),
            actual: server.host.clone(),
        });
    }

    Ok(())
}

/// PLAIN authentication (RFC 4616) bound to a single host
#[derive(Clone, Debug)]
pub struct PlainAuthenticator {
    identity: String,
    username: String,
    password: Password,
    host: String,
}

impl PlainAuthenticator {
    /// Create a PLAIN authenticator that only authenticates against `host`
    pub fn new(username: &str, password: Password, host: &str) -> Self {
        Self {
            identity: String::new(),
            username: username.to_string(),
            password,
            host: host.to_string(),
        }
    }

    /// Authorize as a different identity than the one authenticating
    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }
}

impl Authenticator for PlainAuthenticator {
    fn start(&self, server: &ServerInfo) -> Result<AuthStart, AuthError> {
        check_server(&self.host, server)?;

        let response = format!(
            "{}\0{}\0{}",
            self.identity,
            self.username,
            self.password.expose()
        );

        Ok(AuthStart {
            mechanism: "PLAIN".to_string(),
            initial_response: Some(response.into_bytes()),
        })
    }

    fn next(&self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        Err(AuthError::UnexpectedChallenge(
            String::from_utf8_lossy(challenge).into_owned(),
        ))
    }
}

/// LOGIN authentication, still required by some providers
#[derive(Clone, Debug)]
pub struct LoginAuthenticator {
    username: String,
    password: Password,
    host: String,
}

impl LoginAuthenticator {
    /// Create a LOGIN authenticator that only authenticates against `host`
    pub fn new(username: &str, password: Password, host: &str) -> Self {
        Self {
            username: username.to_string(),
            password,
            host: host.to_string(),
        }
    }
}

impl Authenticator for LoginAuthenticator {
    fn start(&self, server: &ServerInfo) -> Result<AuthStart, AuthError> {
        check_server(&self.host, server)?;

        Ok(AuthStart {
            mechanism: "LOGIN".to_string(),
            initial_response: None,
        })
    }

    fn next(&self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
        let challenge = String::from_utf8_lossy(challenge);

        match challenge.trim() {
            "User Name" | "Username:" | "Username" => Ok(self.username.clone().into_bytes()),
            "Password" | "Password:" => Ok(self.password.expose().as_bytes().to_vec()),
            other => Err(AuthError::UnexpectedChallenge(other.to_string())),
        }
    }
}
