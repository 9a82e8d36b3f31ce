//! Outgoing mail. [`SmtpMailer`] delivers through an SMTP relay over STARTTLS. Anything else
//! implementing [`Mailer`] can stand in for it.

use crate::error::{Error, Result};
use crate::settings::SmtpSettings;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::env;
use tracing::debug;

/// A plain-text email ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivers notices.
pub trait Mailer {
    fn send(&self, notice: &Notice) -> Result<()>;
}

fn parse_recipients(recipients: &str) -> Result<Vec<Mailbox>> {
    recipients
        .split(',')
        .map(str::trim)
        .filter(|recipient| !recipient.is_empty())
        .map(|recipient| recipient.parse::<Mailbox>().map_err(Error::from))
        .collect()
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
    cc: Vec<Mailbox>,
    redirect_to: Option<Mailbox>,
}

impl SmtpMailer {
    /// Builds a mailer from the `[smtp]` settings. The password is read from the
    /// `SMTP_PASSWORD` environment variable.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Self> {
        dotenvy::dotenv().ok();

        let password = env::var("SMTP_PASSWORD")
            .map_err(|_| Error::Mail("SMTP_PASSWORD must be set".to_string()))?;

        let transport = SmtpTransport::starttls_relay(&settings.host)?
            .port(settings.port)
            .credentials(Credentials::new(settings.username.clone(), password))
            .build();

        Ok(Self {
            transport,
            sender: settings.sender.parse()?,
            cc: parse_recipients(&settings.cc)?,
            redirect_to: settings
                .redirect_to
                .as_deref()
                .map(str::parse::<Mailbox>)
                .transpose()?,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, notice: &Notice) -> Result<()> {
        let recipient = match &self.redirect_to {
            Some(redirect) => redirect.clone(),
            None => notice.to.parse()?,
        };

        let mut builder = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(notice.subject.as_str())
            .header(ContentType::TEXT_PLAIN);

        for cc in &self.cc {
            builder = builder.cc(cc.clone());
        }

        let email = builder.body(notice.body.clone())?;
        let response = self.transport.send(&email)?;

        debug!(to = %notice.to, code = %response.code(), "sent notice");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipients_are_split_and_trimmed() {
        let parsed = parse_recipients(" tpc@college.edu, hod@college.edu ,,").unwrap();
        let emails: Vec<String> = parsed.iter().map(|m| m.email.to_string()).collect();
        assert_eq!(emails, ["tpc@college.edu", "hod@college.edu"]);
    }

    #[test]
    fn malformed_recipients_are_errors() {
        assert!(parse_recipients("not an address").is_err());
        assert!(parse_recipients("").unwrap().is_empty());
    }
}
