//! Composing and submitting email over SMTP.

pub mod authenticator;
pub mod composer;
pub mod context;
pub mod email_addresses;
pub mod errors;
pub mod mailer;
pub mod message;
pub mod sender;
pub mod server_address;
pub mod session;
pub mod submission;

pub use authenticator::{
    AuthError, AuthStart, Authenticator, LoginAuthenticator, PlainAuthenticator, ServerInfo,
};
pub use context::SendContext;
pub use errors::{SendError, SessionError, Stage, ValidationError};
pub use mailer::SmtpMailer;
pub use message::{Message, Recipient, SendRequest};
pub use sender::{Credential, Password, Sender};
pub use server_address::{ServerAddress, GMAIL_SMTP_HOST_PORT};
pub use session::{Dialer, Reply, SmtpSession};
pub use submission::{Envelope, Mailbox, Submission};
