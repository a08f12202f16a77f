//! Email delivery over SMTP

pub mod smtp;

pub use smtp::{send_html, SmtpConfig, SmtpConnection, SmtpDialer};
