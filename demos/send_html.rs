//! Send one HTML email using settings from the environment or `.env`.
//!
//! ```text
//! SMTP_SENDER=me@gmail.com SMTP_PASSWORD=app-password \
//!     cargo run --example send_html -- --to someone@example.com
//! ```

use anyhow::Result;
use clap::Parser;
use mail_submit::{send_html, Message, Recipient, SendRequest, SmtpConfig};
use tracing::info;

#[derive(Debug, Parser)]
struct Args {
    #[clap(flatten)]
    smtp: SmtpConfig,

    /// Recipient address, may be repeated
    #[clap(long, required = true)]
    to: Vec<String>,

    /// Subject line
    #[clap(long, default_value = "Hello from mail-submit")]
    subject: String,

    /// HTML body
    #[clap(long, default_value = "<p>It works.</p>")]
    body: String,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut request = SendRequest::new(args.smtp.sender(), Message::new(&args.subject, &args.body));
    for to in &args.to {
        request = request.to(Recipient::new(to));
    }

    send_html(&args.smtp.context(), request).await?;

    info!(recipients = args.to.len(), "sent");

    Ok(())
}
