//! Validated send requests

use std::sync::Arc;

use super::{
    authenticator::{Authenticator, PlainAuthenticator},
    email_addresses::{contains_line_break, EmailAddress, EmailAddressError},
    errors::{SendError, ValidationError},
    message::{Message, Recipient, SendRequest},
    sender::Credential,
    server_address::ServerAddress,
};

/// Headers the composer generates itself; extra headers may not reuse these names.
///
/// `Date` is absent: a caller supplied one replaces the generated one.
pub const RESERVED_HEADERS: &[&str] = &[
    "From",
    "To",
    "Cc",
    "Bcc",
    "Message-ID",
    "MIME-Version",
    "Subject",
    "Content-Type",
];

/// A validated address with its display name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    /// The address
    pub address: EmailAddress,

    /// Display name, may be empty
    pub name: String,
}

/// Addresses handed to the relay, independent of the headers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` address
    pub from: EmailAddress,

    /// `RCPT TO` addresses: To, then Cc, then Bcc
    pub recipients: Vec<EmailAddress>,
}

/// A [`SendRequest`] that passed validation
#[derive(Clone, Debug)]
pub struct Submission {
    server: ServerAddress,
    authenticator: Arc<dyn Authenticator>,
    from: Mailbox,
    to: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    message: Message,
    headers: Vec<(String, String)>,
}

impl Submission {
    /// Validate a request without touching the network.
    ///
    /// # Errors
    /// - [`SendError::Validation`] for missing or malformed fields.
    /// - [`SendError::LineBreak`] if an address, or any other value that ends up
    ///   on a header line, contains CR or LF.
    pub fn validate(request: SendRequest) -> Result<Self, SendError> {
        let SendRequest {
            sender,
            to,
            cc,
            bcc,
            message,
            headers,
        } = request;

        if sender.server_address.trim().is_empty() {
            return Err(ValidationError::MissingField("sender.server_address").into());
        }

        let server: ServerAddress = sender.server_address.parse().map_err(|source| {
            ValidationError::InvalidServerAddress {
                address: sender.server_address.clone(),
                source,
            }
        })?;

        let from = Mailbox {
            address: parse_email("sender.email", &sender.email)?,
            name: check_line("sender.name", &sender.name)?,
        };

        let authenticator = resolve_credential(sender.credential, &server)?;

        let to = parse_recipients("to", to)?;
        let cc = parse_recipients("cc", cc)?;
        let bcc = parse_recipients("bcc", bcc)?;

        if to.len() + cc.len() + bcc.len() == 0 {
            return Err(ValidationError::NoRecipients.into());
        }

        check_line("message.subject", &message.subject)?;
        if let Some(id) = &message.id {
            check_line("message.id", id)?;
        }

        let mut checked_headers = Vec::with_capacity(headers.len());
        for (name, value) in headers {
            check_header_name(&name)?;
            check_line(&format!("headers[{name}]"), &value)?;
            checked_headers.push((name, value));
        }

        Ok(Self {
            server,
            authenticator,
            from,
            to,
            cc,
            bcc,
            message,
            headers: checked_headers,
        })
    }

    /// The relay to submit to
    pub fn server(&self) -> &ServerAddress {
        &self.server
    }

    /// The resolved authentication mechanism
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    /// The sender mailbox
    pub fn from(&self) -> &Mailbox {
        &self.from
    }

    /// To mailboxes in input order
    pub fn to(&self) -> &[Mailbox] {
        &self.to
    }

    /// Cc mailboxes in input order
    pub fn cc(&self) -> &[Mailbox] {
        &self.cc
    }

    /// The message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Extra headers
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The SMTP envelope: every recipient, blind copies included
    pub fn envelope(&self) -> Envelope {
        Envelope {
            from: self.from.address.clone(),
            recipients: self
                .to
                .iter()
                .chain(&self.cc)
                .chain(&self.bcc)
                .map(|mailbox| mailbox.address.clone())
                .collect(),
        }
    }
}

fn parse_email(field: &str, raw: &str) -> Result<EmailAddress, SendError> {
    EmailAddress::new(raw).map_err(|source| match source {
        EmailAddressError::ContainsLineBreak => SendError::LineBreak {
            field: field.to_string(),
        },
        source => ValidationError::InvalidEmail {
            field: field.to_string(),
            source,
        }
        .into(),
    })
}

fn check_line(field: &str, value: &str) -> Result<String, SendError> {
    if contains_line_break(value) {
        return Err(SendError::LineBreak {
            field: field.to_string(),
        });
    }

    Ok(value.to_string())
}

fn parse_recipients(list: &str, recipients: Vec<Recipient>) -> Result<Vec<Mailbox>, SendError> {
    recipients
        .into_iter()
        .enumerate()
        .map(|(i, recipient)| -> Result<Mailbox, SendError> {
            Ok(Mailbox {
                address: parse_email(&format!("{list}[{i}].email"), &recipient.email)?,
                name: check_line(&format!("{list}[{i}].name"), &recipient.name)?,
            })
        })
        .collect()
}

fn resolve_credential(
    credential: Credential,
    server: &ServerAddress,
) -> Result<Arc<dyn Authenticator>, SendError> {
    match credential {
        Credential::Authenticator(authenticator) => Ok(authenticator),
        Credential::Password { username, password } => {
            if username.is_empty() || password.is_empty() {
                return Err(ValidationError::MissingField("sender.credential").into());
            }

            Ok(Arc::new(PlainAuthenticator::new(
                &username,
                password,
                server.host(),
            )))
        }
    }
}

fn check_header_name(name: &str) -> Result<(), SendError> {
    let valid = !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':');
    if !valid {
        if contains_line_break(name) {
            return Err(SendError::LineBreak {
                field: "headers".to_string(),
            });
        }

        return Err(ValidationError::InvalidHeaderName(name.to_string()).into());
    }

    if RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
    {
        return Err(ValidationError::ReservedHeader(name.to_string()).into());
    }

    Ok(())
}
