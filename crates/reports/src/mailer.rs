use std::time::Duration;

use {
    agentdesk_config::SmtpConfig,
    async_trait::async_trait,
    lettre::{
        Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        message::{Mailbox, header::ContentType},
        transport::smtp::authentication::Credentials,
    },
    secrecy::ExposeSecret,
    tracing::{debug, info},
};

use crate::error::{Context, Error, Result};

const SMTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body_html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// TLS from the first byte (SMTPS, port 465).
    ImplicitTls,
    StartTls,
    Plain,
}

impl SmtpSecurity {
    /// Port 465 with `use_ssl` is implicit TLS; 25 and 587 upgrade with
    /// STARTTLS; anything else talks plain SMTP.
    pub fn for_port(port: u16, use_ssl: bool) -> Self {
        match port {
            465 if use_ssl => Self::ImplicitTls,
            25 | 587 => Self::StartTls,
            _ => Self::Plain,
        }
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    security: SmtpSecurity,
}

impl SmtpMailer {
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self> {
        let security = SmtpSecurity::for_port(cfg.port, cfg.use_ssl);
        let builder = match security {
            SmtpSecurity::ImplicitTls => AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?
            },
            SmtpSecurity::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host),
        };
        let mut builder = builder.port(cfg.port).timeout(Some(SMTP_TIMEOUT));
        if let Some(username) = &cfg.username {
            let password = cfg
                .password
                .as_ref()
                .map(|p| p.expose_secret().clone())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        let from_address: Address = cfg.from_email.parse().map_err(|source| Error::Address {
            address: cfg.from_email.clone(),
            source,
        })?;
        let from_name = Some(cfg.from_name.clone()).filter(|n| !n.is_empty());

        debug!(host = %cfg.host, port = cfg.port, ?security, "smtp transport configured");
        Ok(Self {
            transport: builder.build(),
            from: Mailbox::new(from_name, from_address),
            security,
        })
    }

    pub fn security(&self) -> SmtpSecurity {
        self.security
    }

    fn build_message(&self, message: &EmailMessage) -> Result<Message> {
        build_message(self.from.clone(), message)
    }
}

fn build_message(from: Mailbox, message: &EmailMessage) -> Result<Message> {
    let mut builder = Message::builder().from(from).subject(&message.subject);
    for to in &message.to {
        let mailbox: Mailbox = to.parse().map_err(|source| Error::Address {
            address: to.clone(),
            source,
        })?;
        builder = builder.to(mailbox);
    }
    builder
        .header(ContentType::TEXT_HTML)
        .body(message.body_html.clone())
        .context("failed to build report mail")
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = self.build_message(message)?;
        self.transport.send(email).await?;
        info!(
            recipients = message.to.len(),
            subject = %message.subject,
            "report mail sent"
        );
        Ok(())
    }
}
