//! Email message and send request

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::sender::Sender;

/// A To, Cc or Bcc recipient
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// The recipient's address
    pub email: String,

    /// The recipient's display name, may be empty
    #[serde(default)]
    pub name: String,
}

impl Recipient {
    /// A recipient without a display name
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            name: String::new(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// Email message
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier, rendered as `Message-ID` when present
    #[serde(default)]
    pub id: Option<String>,

    /// The subject of the email
    pub subject: String,

    /// The HTML body of the email
    pub body: String,
}

impl Message {
    /// Create a message without an identifier
    pub fn new(subject: &str, body: &str) -> Self {
        Self {
            id: None,
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    /// Set the message identifier
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

/// Everything needed for a single send
#[derive(Clone, Debug)]
pub struct SendRequest {
    /// Who sends, and how they authenticate
    pub sender: Sender,

    /// Primary recipients
    pub to: Vec<Recipient>,

    /// Carbon copy recipients
    pub cc: Vec<Recipient>,

    /// Blind carbon copy recipients, kept out of the headers
    pub bcc: Vec<Recipient>,

    /// The message itself
    pub message: Message,

    /// Additional headers, rendered before the generated ones
    pub headers: HashMap<String, String>,
}

impl SendRequest {
    /// Create a request with no recipients and no extra headers
    pub fn new(sender: Sender, message: Message) -> Self {
        Self {
            sender,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            message,
            headers: HashMap::new(),
        }
    }

    /// Add a To recipient
    pub fn to(mut self, recipient: Recipient) -> Self {
        self.to.push(recipient);
        self
    }

    /// Add a Cc recipient
    pub fn cc(mut self, recipient: Recipient) -> Self {
        self.cc.push(recipient);
        self
    }

    /// Add a Bcc recipient
    pub fn bcc(mut self, recipient: Recipient) -> Self {
        self.bcc.push(recipient);
        self
    }

    /// Add an extra header. A later value for the same name replaces the earlier one.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }
}
