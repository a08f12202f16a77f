//! Email addresses module.

mod email_address;

pub use email_address::{contains_line_break, EmailAddress, EmailAddressError};
