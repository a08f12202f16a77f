#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Submit HTML email to a relay over SMTP with STARTTLS and AUTH.
//!
//! One call to [`send_html`] validates a [`SendRequest`], renders the message,
//! dials the relay, upgrades to TLS, authenticates, sends MAIL/RCPT/DATA and
//! quits. Every network step honors the caller's [`SendContext`].

pub mod domain;
pub mod infrastructure;

pub use domain::communication::{
    Message, Recipient, SendContext, SendError, SendRequest, Sender, SmtpMailer,
    GMAIL_SMTP_HOST_PORT,
};
pub use infrastructure::email::{send_html, SmtpConfig, SmtpDialer};
