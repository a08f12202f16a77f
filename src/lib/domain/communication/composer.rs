//! RFC 5322 message rendering

use chrono::{DateTime, Utc};

use super::submission::{Mailbox, Submission};

const CRLF: &str = "\r\n";

/// Render a validated submission as a complete `text/html` message.
///
/// Extra headers come first, followed by the generated ones. `date` is used
/// unless the caller supplied a `Date` header. Bcc recipients are left out of
/// the header block; they only appear in the envelope.
pub fn compose(submission: &Submission, date: DateTime<Utc>) -> Vec<u8> {
    let message = submission.message();
    let mut out = String::with_capacity(512 + message.body.len());

    for (name, value) in submission.headers() {
        header(&mut out, name, value);
    }

    let has_date = submission
        .headers()
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("Date"));
    if !has_date {
        header(&mut out, "Date", &date.to_rfc2822());
    }

    header(&mut out, "From", &mailbox(submission.from()));

    for to in submission.to() {
        header(&mut out, "To", &mailbox(to));
    }

    for cc in submission.cc() {
        header(&mut out, "Cc", &mailbox(cc));
    }

    if let Some(id) = &message.id {
        header(&mut out, "Message-ID", id);
    }

    header(&mut out, "MIME-Version", "1.0");
    header(&mut out, "Subject", &message.subject);
    header(&mut out, "Content-Type", "text/html; charset=utf-8");

    out.push_str(CRLF);
    out.push_str(&message.body);
    out.push_str(CRLF);

    out.into_bytes()
}

fn header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

/// `"Display Name" <address>`, or `<address>` without a name
fn mailbox(mailbox: &Mailbox) -> String {
    if mailbox.name.is_empty() {
        return format!("<{}>", mailbox.address);
    }

    let mut quoted = String::with_capacity(mailbox.name.len() + 2);
    for c in mailbox.name.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }

    format!("\"{}\" <{}>", quoted, mailbox.address)
}
