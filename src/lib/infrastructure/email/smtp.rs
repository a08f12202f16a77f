//! SMTP transport implementation

use std::{error::Error as _, time::Duration};

use async_trait::async_trait;
use clap::Parser;
use lettre::transport::smtp::{
    client::{AsyncSmtpConnection, TlsParameters},
    extension::ClientId,
    response::Response,
    Error as LettreError,
};
use tokio::time;
use tracing::{debug, warn};

use crate::domain::communication::{
    context::SendContext,
    errors::{SendError, SessionError},
    mailer::SmtpMailer,
    message::SendRequest,
    sender::{Credential, Password, Sender},
    server_address::{ServerAddress, GMAIL_SMTP_HOST_PORT},
    session::{Dialer, Reply, SmtpSession},
};

/// How long a best-effort close may take before the socket is dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// SMTP configuration
#[derive(Clone, Debug, Parser)]
pub struct SmtpConfig {
    /// The relay address as host:port
    #[clap(long, env = "SMTP_SERVER", default_value = GMAIL_SMTP_HOST_PORT)]
    pub server: String,

    /// The sender email address
    #[clap(long, env = "SMTP_SENDER")]
    pub sender: String,

    /// The sender display name
    #[clap(long, env = "SMTP_SENDER_NAME", default_value = "")]
    pub sender_name: String,

    /// The SMTP username, defaults to the sender address
    #[clap(long, env = "SMTP_USER")]
    pub username: Option<String>,

    /// The SMTP password
    #[clap(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub password: Password,

    /// Seconds allowed for a whole send, 0 for no deadline
    #[clap(long, env = "SMTP_TIMEOUT", default_value = "30")]
    pub timeout: u64,
}

impl SmtpConfig {
    /// The configured sender, authenticating with PLAIN
    pub fn sender(&self) -> Sender {
        Sender {
            server_address: self.server.clone(),
            email: self.sender.clone(),
            name: self.sender_name.clone(),
            credential: Credential::Password {
                username: self.username.clone().unwrap_or_else(|| self.sender.clone()),
                password: self.password.clone(),
            },
        }
    }

    /// A fresh context carrying the configured deadline
    pub fn context(&self) -> SendContext {
        match self.timeout {
            0 => SendContext::new(),
            secs => SendContext::with_timeout(Duration::from_secs(secs)),
        }
    }
}

/// Dials relays over TCP with lettre, upgrading with STARTTLS later
#[derive(Clone, Debug, Default)]
pub struct SmtpDialer {
    hello_name: ClientId,
}

impl SmtpDialer {
    /// A dialer announcing the local host name in EHLO
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Dialer for SmtpDialer {
    type Session = SmtpConnection;

    async fn dial(&self, server: &ServerAddress) -> Result<SmtpConnection, SessionError> {
        let inner = AsyncSmtpConnection::connect_tokio1(
            (server.host(), server.port()),
            None,
            &self.hello_name,
            None,
            None,
        )
        .await
        .map_err(session_error)?;

        debug!(%server, "connected");

        Ok(SmtpConnection {
            inner,
            hello_name: self.hello_name.clone(),
        })
    }
}

/// An open lettre connection
pub struct SmtpConnection {
    inner: AsyncSmtpConnection,
    hello_name: ClientId,
}

impl std::fmt::Debug for SmtpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnection")
            .field("hello_name", &self.hello_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SmtpSession for SmtpConnection {
    async fn starttls(&mut self, host: &str) -> Result<(), SessionError> {
        let parameters = TlsParameters::new(host.to_string()).map_err(session_error)?;

        self.inner
            .starttls(parameters, &self.hello_name)
            .await
            .map_err(session_error)
    }

    async fn command(&mut self, line: &str) -> Result<Reply, SessionError> {
        let response = self
            .inner
            .command(format!("{line}\r\n"))
            .await
            .map_err(session_error)?;

        Ok(reply(&response))
    }

    async fn message(&mut self, payload: &[u8]) -> Result<Reply, SessionError> {
        // lettre appends CRLF.CRLF itself
        let payload = payload.strip_suffix(b"\r\n").unwrap_or(payload);

        let response = self.inner.message(payload).await.map_err(session_error)?;

        Ok(reply(&response))
    }

    #[mutants::skip]
    async fn close(&mut self) {
        if time::timeout(CLOSE_TIMEOUT, self.inner.abort()).await.is_err() {
            warn!("timed out closing SMTP connection");
        }
    }
}

/// Send one HTML message through the relay named in the request.
///
/// Convenience for [`SmtpMailer::send_html`] with the default [`SmtpDialer`].
pub async fn send_html(ctx: &SendContext, request: SendRequest) -> Result<(), SendError> {
    SmtpMailer::new(SmtpDialer::new())
        .send_html(ctx, request)
        .await
}

fn reply(response: &Response) -> Reply {
    Reply {
        code: code(response),
        lines: response.message().map(str::to_string).collect(),
    }
}

fn code(response: &Response) -> u16 {
    response.code().to_string().parse().unwrap_or_default()
}

/// Negative replies keep only the relay's text; lettre's own rendering repeats the code.
fn session_error(err: LettreError) -> SessionError {
    match err.status() {
        Some(code) => SessionError::Rejected {
            code: code.to_string().parse().unwrap_or_default(),
            message: err
                .source()
                .map(ToString::to_string)
                .unwrap_or_default(),
        },
        None => SessionError::UnknownError(err.into()),
    }
}
