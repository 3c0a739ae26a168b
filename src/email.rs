use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// SMTP mailer over an implicit-TLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
            .port(cfg.port)
            .credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ))
            .build();

        let from: Mailbox = format!("{} <{}>", cfg.from_name, cfg.from_address).parse()?;

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(email.to.parse()?)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(email.text))
                    .singlepart(SinglePart::html(email.html)),
            )?;

        self.transport.send(message).await?;
        tracing::debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Account-verification mail carrying the one-time code.
pub fn verification_email(name: &str, to: &str, otp: u64) -> Email {
    let text = format!(
        "Hi {name},\n\nYour verification code is {otp}. \
         It expires in 10 minutes.\n\nIf you did not sign up, ignore this email."
    );
    let html = format!(
        "<p>Hi {name},</p>\
         <p>Your verification code is <strong>{otp}</strong>. \
         It expires in 10 minutes.</p>\
         <p>If you did not sign up, ignore this email.</p>"
    );
    Email {
        to: to.to_string(),
        subject: "Email verification".to_string(),
        html,
        text,
    }
}
