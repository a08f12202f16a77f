//! SMTP session primitives

use std::fmt;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lettre::transport::smtp::commands::{Data, Mail, Quit, Rcpt};
use tracing::debug;

#[cfg(test)]
use mockall::mock;

use super::{
    authenticator::{AuthError, Authenticator, ServerInfo},
    email_addresses::EmailAddress,
    errors::SessionError,
    server_address::ServerAddress,
};

/// Upper bound on `334` round-trips in one AUTH exchange
const MAX_AUTH_ROUNDS: usize = 8;

/// A positive server reply
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Three digit reply code
    pub code: u16,

    /// Reply text, one entry per line
    pub lines: Vec<String>,
}

impl Reply {
    /// A single line reply
    pub fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            lines: vec![text.to_string()],
        }
    }

    /// The first line of text, or an empty string
    pub fn first_line(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

/// An open connection to a relay, after greeting and EHLO.
///
/// `command` and `message` resolve to `Ok` only for positive (2xx/3xx)
/// replies; negative ones come back as [`SessionError::Rejected`].
#[async_trait]
pub trait SmtpSession: Send {
    /// Upgrade the connection with STARTTLS, verifying the certificate against `host`.
    async fn starttls(&mut self, host: &str) -> Result<(), SessionError>;

    /// Send one command line (without CRLF) and read the reply.
    async fn command(&mut self, line: &str) -> Result<Reply, SessionError>;

    /// Send a message payload after `354`, dot-stuffed and terminated by `CRLF.CRLF`.
    async fn message(&mut self, payload: &[u8]) -> Result<Reply, SessionError>;

    /// Best-effort teardown after a failure. Never fails.
    async fn close(&mut self);
}

/// Opens sessions to a relay
#[async_trait]
pub trait Dialer: Send + Sync {
    /// The session type produced by this dialer
    type Session: SmtpSession;

    /// Connect to `server`, read the greeting and say EHLO.
    async fn dial(&self, server: &ServerAddress) -> Result<Self::Session, SessionError>;
}

#[cfg(test)]
mock! {
    pub Dialer {}

    #[async_trait]
    impl Dialer for Dialer {
        type Session = crate::domain::communication::session::fake::FakeSession;

        async fn dial(&self, server: &ServerAddress) -> Result<crate::domain::communication::session::fake::FakeSession, SessionError>;
    }
}

/// Discrete SMTP commands on top of an [`SmtpSession`]
pub(crate) struct Client<'a, S: SmtpSession> {
    session: &'a mut S,
}

impl<'a, S: SmtpSession> Client<'a, S> {
    pub(crate) fn new(session: &'a mut S) -> Self {
        Self { session }
    }

    /// Run an AUTH exchange (RFC 4954) driven by `authenticator`.
    pub(crate) async fn auth(
        &mut self,
        authenticator: &dyn Authenticator,
        server: &ServerInfo,
    ) -> Result<(), SessionError> {
        let start = authenticator.start(server)?;
        debug!(mechanism = %start.mechanism, "authenticating");

        let mut line = match &start.initial_response {
            Some(response) if response.is_empty() => format!("AUTH {} =", start.mechanism),
            Some(response) => format!("AUTH {} {}", start.mechanism, STANDARD.encode(response)),
            None => format!("AUTH {}", start.mechanism),
        };

        for _ in 0..MAX_AUTH_ROUNDS {
            let reply = self.session.command(&line).await?;

            match reply.code {
                235 => return Ok(()),
                334 => {
                    let response = match STANDARD.decode(reply.first_line().trim()) {
                        Ok(challenge) => authenticator.next(&challenge),
                        Err(_) => {
                            self.cancel_auth().await;
                            return Err(SessionError::MalformedChallenge);
                        }
                    };

                    match response {
                        Ok(response) => line = STANDARD.encode(response),
                        Err(err) => {
                            self.cancel_auth().await;
                            return Err(err.into());
                        }
                    }
                }
                _ => return Err(unexpected(235, reply)),
            }
        }

        self.cancel_auth().await;
        Err(AuthError::UnexpectedChallenge("too many challenges".to_string()).into())
    }

    async fn cancel_auth(&mut self) {
        if let Err(err) = self.session.command("*").await {
            debug!(%err, "AUTH cancellation not acknowledged");
        }
    }

    pub(crate) async fn mail(&mut self, from: &EmailAddress) -> Result<(), SessionError> {
        let command = Mail::new(Some(address(from)?), Vec::new());
        let reply = self.session.command(&line(command)).await?;
        expect(reply, &[250]).map(drop)
    }

    pub(crate) async fn rcpt(&mut self, to: &EmailAddress) -> Result<(), SessionError> {
        let command = Rcpt::new(address(to)?, Vec::new());
        let reply = self.session.command(&line(command)).await?;
        expect(reply, &[250, 251]).map(drop)
    }

    pub(crate) async fn data(&mut self, payload: &[u8]) -> Result<Reply, SessionError> {
        let reply = self.session.command(&line(Data)).await?;
        expect(reply, &[354])?;

        let reply = self.session.message(payload).await?;
        expect(reply, &[250])
    }

    pub(crate) async fn quit(&mut self) -> Result<(), SessionError> {
        let reply = self.session.command(&line(Quit)).await?;
        expect(reply, &[221]).map(drop)
    }
}

/// A lettre command rendered without its trailing CRLF
fn line(command: impl fmt::Display) -> String {
    let mut line = command.to_string();
    line.truncate(line.trim_end_matches("\r\n").len());
    line
}

fn address(email: &EmailAddress) -> Result<lettre::Address, SessionError> {
    email
        .to_address()
        .map_err(|err| SessionError::UnknownError(err.into()))
}

fn expect(reply: Reply, codes: &[u16]) -> Result<Reply, SessionError> {
    if codes.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(unexpected(codes[0], reply))
    }
}

fn unexpected(expected: u16, reply: Reply) -> SessionError {
    SessionError::UnexpectedReply {
        expected,
        code: reply.code,
        message: reply.lines.join(" "),
    }
}

/// In-memory relay used by tests
#[cfg(test)]
pub mod fake {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Everything a [`FakeSession`] saw
    #[derive(Debug, Default)]
    pub struct Transcript {
        pub commands: Vec<String>,
        pub payload: Option<Vec<u8>>,
        pub closed: bool,
    }

    /// Scripted session: replies positively unless told otherwise
    #[derive(Debug, Default)]
    pub struct FakeSession {
        transcript: Arc<Mutex<Transcript>>,
        overrides: Vec<(String, Reply)>,
        refuse_tls: bool,
    }

    impl FakeSession {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer commands equal to or starting with `prefix` with `reply`
        pub fn reply_to(mut self, prefix: &str, reply: Reply) -> Self {
            self.overrides.push((prefix.to_string(), reply));
            self
        }

        pub fn refuse_tls(mut self) -> Self {
            self.refuse_tls = true;
            self
        }

        pub fn transcript(&self) -> Arc<Mutex<Transcript>> {
            self.transcript.clone()
        }

        fn record(&self, line: &str) {
            self.transcript
                .lock()
                .expect("transcript lock")
                .commands
                .push(line.to_string());
        }

        fn respond(reply: Reply) -> Result<Reply, SessionError> {
            if reply.code >= 400 {
                Err(SessionError::Rejected {
                    code: reply.code,
                    message: reply.lines.join(" "),
                })
            } else {
                Ok(reply)
            }
        }
    }

    #[async_trait]
    impl SmtpSession for FakeSession {
        async fn starttls(&mut self, host: &str) -> Result<(), SessionError> {
            self.record(&format!("STARTTLS {host}"));

            if self.refuse_tls {
                return Err(SessionError::Rejected {
                    code: 454,
                    message: "TLS not available".to_string(),
                });
            }

            Ok(())
        }

        async fn command(&mut self, line: &str) -> Result<Reply, SessionError> {
            self.record(line);

            if let Some((_, reply)) = self
                .overrides
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            {
                return Self::respond(reply.clone());
            }

            let verb = line.split([' ', ':']).next().unwrap_or_default();
            let reply = match verb {
                "AUTH" => Reply::new(235, "2.7.0 Authentication successful"),
                "MAIL" | "RCPT" => Reply::new(250, "2.1.0 OK"),
                "DATA" => Reply::new(354, "Go ahead"),
                "QUIT" => Reply::new(221, "2.0.0 Bye"),
                _ => Reply::new(500, "5.5.2 Unrecognized command"),
            };

            Self::respond(reply)
        }

        async fn message(&mut self, payload: &[u8]) -> Result<Reply, SessionError> {
            self.transcript.lock().expect("transcript lock").payload = Some(payload.to_vec());

            Ok(Reply::new(250, "2.0.0 OK queued"))
        }

        async fn close(&mut self) {
            self.transcript.lock().expect("transcript lock").closed = true;
        }
    }
}
