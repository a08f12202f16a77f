//! SMTP session driver

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{
    authenticator::ServerInfo,
    composer::compose,
    context::SendContext,
    errors::{SendError, Stage},
    message::SendRequest,
    session::{Client, Dialer, SmtpSession},
    submission::Submission,
};

/// Submits one message per call through a relay reached with `D`.
///
/// Holds no per-send state, so one mailer can be shared between tasks. Each
/// send opens and closes its own connection.
#[derive(Debug, Clone, Default)]
pub struct SmtpMailer<D> {
    dialer: D,
}

impl<D: Dialer> SmtpMailer<D> {
    /// Create a mailer dialing relays with `dialer`
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    /// Validate, compose and submit an HTML message.
    ///
    /// # Arguments
    /// * `ctx` - Cancellation token and deadline honored by every network step.
    /// * `request` - Sender, recipients, message and extra headers.
    ///
    /// # Returns
    /// - [`Ok`] once the relay accepted the message and the session was closed.
    /// - [`Err`] containing a [`SendError`] naming the failing stage otherwise.
    ///   Validation failures happen before any connection is attempted.
    pub async fn send_html(&self, ctx: &SendContext, request: SendRequest) -> Result<(), SendError> {
        let submission = Submission::validate(request).map_err(|err| {
            warn!(%err, "refusing to send");
            err
        })?;

        let payload = compose(&submission, Utc::now());

        self.submit(ctx, &submission, &payload).await
    }

    /// Submit an already composed payload for a validated submission.
    pub async fn submit(
        &self,
        ctx: &SendContext,
        submission: &Submission,
        payload: &[u8],
    ) -> Result<(), SendError> {
        let server = submission.server();

        debug!(%server, "dialing relay");
        let mut session = ctx.run(Stage::Connect, self.dialer.dial(server)).await?;

        let result = transact(ctx, &mut session, submission, payload).await;

        match &result {
            Ok(()) => info!(
                %server,
                recipients = submission.envelope().recipients.len(),
                bytes = payload.len(),
                "message submitted"
            ),
            Err(err @ (SendError::Cancelled { .. } | SendError::TimedOut { .. })) => {
                warn!(%server, %err, "send abandoned, dropping connection");
            }
            Err(err) => {
                warn!(%server, %err, "send failed, closing connection");
                session.close().await;
            }
        }

        result
    }
}

async fn transact<S: SmtpSession>(
    ctx: &SendContext,
    session: &mut S,
    submission: &Submission,
    payload: &[u8],
) -> Result<(), SendError> {
    let host = submission.server().host();
    let envelope = submission.envelope();

    debug!(host, "upgrading to TLS");
    ctx.run(Stage::StartTls, session.starttls(host)).await?;

    let server = ServerInfo {
        host: host.to_string(),
        tls: true,
    };
    let mut client = Client::new(session);

    ctx.run(Stage::Auth, client.auth(submission.authenticator(), &server))
        .await?;

    debug!(from = %envelope.from, "MAIL");
    ctx.run(Stage::Mail, client.mail(&envelope.from)).await?;

    for recipient in &envelope.recipients {
        debug!(to = %recipient, "RCPT");
        ctx.run(Stage::Rcpt, client.rcpt(recipient)).await?;
    }

    debug!(bytes = payload.len(), "DATA");
    ctx.run(Stage::Data, client.data(payload)).await?;

    ctx.run(Stage::Quit, client.quit()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use testresult::TestResult;
    use tokio::time::{self, Duration};

    use super::*;
    use crate::domain::communication::{
        authenticator::{AuthError, AuthStart, Authenticator},
        errors::SessionError,
        message::{Message, Recipient},
        sender::Sender,
        server_address::ServerAddress,
        session::{fake::FakeSession, MockDialer, Reply},
    };

    fn request() -> SendRequest {
        let sender = Sender::with_password("smtp.example.com:587", "a@x.com", "a@x.com", "password");

        SendRequest::new(sender, Message::new("Hi", "Hello"))
    }

    fn dialer_for(session: FakeSession) -> MockDialer {
        let mut session = Some(session);
        let mut dialer = MockDialer::new();

        dialer
            .expect_dial()
            .times(1)
            .withf(|server| server.host() == "smtp.example.com" && server.port() == 587)
            .returning(move |_| Ok(session.take().expect("dialed once")));

        dialer
    }

    #[tokio::test]
    async fn test_end_to_end_against_fake_relay() -> TestResult {
        let session = FakeSession::new();
        let transcript = session.transcript();
        let mailer = SmtpMailer::new(dialer_for(session));

        mailer
            .send_html(&SendContext::new(), request().to(Recipient::new("b@y.com")))
            .await?;

        let transcript = transcript.lock().unwrap();
        let commands: Vec<&str> = transcript.commands.iter().map(String::as_str).collect();

        assert_eq!(commands[0], "STARTTLS smtp.example.com");
        assert!(commands[1].starts_with("AUTH PLAIN "));
        assert_eq!(
            &commands[2..],
            &["MAIL FROM:<a@x.com>", "RCPT TO:<b@y.com>", "DATA", "QUIT"]
        );

        let payload = String::from_utf8(transcript.payload.clone().unwrap_or_default())?;
        assert!(payload.contains("\r\nTo: <b@y.com>\r\n"));
        assert!(payload.contains("\r\nSubject: Hi\r\n"));
        assert!(payload.ends_with("Hello\r\n"));
        assert!(!transcript.closed);

        Ok(())
    }

    #[tokio::test]
    async fn test_bcc_in_envelope_not_in_payload() -> TestResult {
        let session = FakeSession::new();
        let transcript = session.transcript();
        let mailer = SmtpMailer::new(dialer_for(session));

        mailer
            .send_html(
                &SendContext::new(),
                request()
                    .to(Recipient::new("b@y.com"))
                    .cc(Recipient::new("c@y.com"))
                    .bcc(Recipient::new("secret@y.com")),
            )
            .await?;

        let transcript = transcript.lock().unwrap();
        let rcpts: Vec<&str> = transcript
            .commands
            .iter()
            .filter(|line| line.starts_with("RCPT"))
            .map(String::as_str)
            .collect();

        assert_eq!(
            rcpts,
            vec!["RCPT TO:<b@y.com>", "RCPT TO:<c@y.com>", "RCPT TO:<secret@y.com>"]
        );

        let payload = String::from_utf8(transcript.payload.clone().unwrap_or_default())?;
        assert!(!payload.contains("secret@y.com"));

        Ok(())
    }

    #[tokio::test]
    async fn test_no_recipients_never_dials() {
        let mut dialer = MockDialer::new();
        dialer.expect_dial().times(0);

        let result = SmtpMailer::new(dialer)
            .send_html(&SendContext::new(), request())
            .await;

        assert!(matches!(result, Err(ref err) if err.is_validation()));
    }

    #[tokio::test]
    async fn test_line_break_in_address_never_dials() {
        let mut dialer = MockDialer::new();
        dialer.expect_dial().times(0);
        let mailer = SmtpMailer::new(dialer);

        let result = mailer
            .send_html(
                &SendContext::new(),
                request().to(Recipient::new("b@y.com\r\nRCPT TO:<evil@y.com>")),
            )
            .await;
        assert!(matches!(result, Err(SendError::LineBreak { .. })));

        let mut request = request().to(Recipient::new("b@y.com"));
        request.sender.email = "a@x.com\nRSET".to_string();

        let result = mailer.send_html(&SendContext::new(), request).await;
        assert!(matches!(result, Err(SendError::LineBreak { .. })));
    }

    #[tokio::test]
    async fn test_rcpt_rejection_aborts_before_data() {
        let session = FakeSession::new().reply_to(
            "RCPT TO:<nobody@y.com>",
            Reply::new(550, "5.1.1 No such user"),
        );
        let transcript = session.transcript();
        let mailer = SmtpMailer::new(dialer_for(session));

        let result = mailer
            .send_html(
                &SendContext::new(),
                request()
                    .to(Recipient::new("b@y.com"))
                    .to(Recipient::new("nobody@y.com")),
            )
            .await;

        assert!(matches!(
            result,
            Err(SendError::Protocol {
                stage: Stage::Rcpt,
                source: SessionError::Rejected { code: 550, .. }
            })
        ));

        let transcript = transcript.lock().unwrap();
        assert!(!transcript.commands.iter().any(|line| line == "DATA"));
        assert!(transcript.payload.is_none());
        assert!(transcript.closed);
    }

    #[tokio::test]
    async fn test_starttls_failure_is_connection_error() {
        let session = FakeSession::new().refuse_tls();
        let transcript = session.transcript();
        let mailer = SmtpMailer::new(dialer_for(session));

        let result = mailer
            .send_html(&SendContext::new(), request().to(Recipient::new("b@y.com")))
            .await;

        assert!(matches!(
            result,
            Err(SendError::Connection {
                stage: Stage::StartTls,
                ..
            })
        ));

        let transcript = transcript.lock().unwrap();
        assert_eq!(transcript.commands, vec!["STARTTLS smtp.example.com"]);
        assert!(transcript.closed);
    }

    #[tokio::test]
    async fn test_auth_rejection_stops_before_mail() {
        let session = FakeSession::new().reply_to("AUTH", Reply::new(535, "5.7.8 Bad credentials"));
        let transcript = session.transcript();
        let mailer = SmtpMailer::new(dialer_for(session));

        let result = mailer
            .send_html(&SendContext::new(), request().to(Recipient::new("b@y.com")))
            .await;

        assert!(matches!(
            result,
            Err(SendError::Protocol {
                stage: Stage::Auth,
                ..
            })
        ));
        assert!(!transcript
            .lock()
            .unwrap()
            .commands
            .iter()
            .any(|line| line.starts_with("MAIL")));
    }

    #[tokio::test]
    async fn test_dial_failure_is_connection_error() {
        let mut dialer = MockDialer::new();
        dialer
            .expect_dial()
            .times(1)
            .returning(|_| Err(SessionError::UnknownError(anyhow::anyhow!("connection refused"))));

        let result = SmtpMailer::new(dialer)
            .send_html(&SendContext::new(), request().to(Recipient::new("b@y.com")))
            .await;

        assert!(matches!(
            result,
            Err(SendError::Connection {
                stage: Stage::Connect,
                ..
            })
        ));
    }

    #[derive(Debug, Clone)]
    struct HangingDialer;

    #[async_trait]
    impl Dialer for HangingDialer {
        type Session = FakeSession;

        async fn dial(&self, _server: &ServerAddress) -> Result<FakeSession, SessionError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_before_connect_completes() {
        let ctx = SendContext::new();
        let canceller = ctx.clone();

        tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = time::timeout(
            Duration::from_secs(5),
            SmtpMailer::new(HangingDialer).send_html(&ctx, request().to(Recipient::new("b@y.com"))),
        )
        .await;

        assert!(matches!(
            result,
            Ok(Err(SendError::Cancelled {
                stage: Stage::Connect
            }))
        ));
    }

    #[tokio::test]
    async fn test_deadline_before_connect_completes() {
        let ctx = SendContext::with_timeout(Duration::from_millis(20));

        let result = time::timeout(
            Duration::from_secs(5),
            SmtpMailer::new(HangingDialer).send_html(&ctx, request().to(Recipient::new("b@y.com"))),
        )
        .await;

        assert!(matches!(
            result,
            Ok(Err(SendError::TimedOut {
                stage: Stage::Connect
            }))
        ));
    }

    #[derive(Debug)]
    struct TokenAuthenticator;

    impl Authenticator for TokenAuthenticator {
        fn start(&self, _server: &ServerInfo) -> Result<AuthStart, AuthError> {
            Ok(AuthStart {
                mechanism: "XOAUTH2".to_string(),
                initial_response: Some(b"user=a@x.com\x01auth=Bearer token\x01\x01".to_vec()),
            })
        }

        fn next(&self, challenge: &[u8]) -> Result<Vec<u8>, AuthError> {
            Err(AuthError::UnexpectedChallenge(
                String::from_utf8_lossy(challenge).into_owned(),
            ))
        }
    }

    #[tokio::test]
    async fn test_injected_authenticator_is_used() -> TestResult {
        let session = FakeSession::new();
        let transcript = session.transcript();
        let mailer = SmtpMailer::new(dialer_for(session));

        let sender =
            Sender::with_authenticator("smtp.example.com:587", "a@x.com", Arc::new(TokenAuthenticator));

        mailer
            .send_html(
                &SendContext::new(),
                SendRequest::new(sender, Message::new("Hi", "Hello")).to(Recipient::new("b@y.com")),
            )
            .await?;

        assert!(transcript.lock().unwrap().commands[1].starts_with("AUTH XOAUTH2 "));

        Ok(())
    }
}
