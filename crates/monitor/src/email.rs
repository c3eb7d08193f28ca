//! Entrega de alertas por e-mail via SMTP (STARTTLS).
//!
//! O transporte é montado uma vez na inicialização; cada envio respeita o
//! timeout configurado para nunca travar o worker de notificação.

use chamber_core::alerts::AlertMessage;
use chamber_core::config::NotifyConfig;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

/// Falhas de e-mail.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Erro de transporte SMTP: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Endereço de e-mail inválido: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Erro ao montar mensagem: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("Senha SMTP ausente (defina a variável {0})")]
    MissingPassword(String),
}

/// Cliente SMTP pronto para enviar alertas.
pub struct Mailer {
    transport: SmtpTransport,
    from: lettre::message::Mailbox,
    to: lettre::message::Mailbox,
}

impl Mailer {
    /// Monta o transporte a partir da config. A senha vem do ambiente.
    pub fn from_config(config: &NotifyConfig) -> Result<Self, EmailError> {
        let password = config
            .password()
            .ok_or_else(|| EmailError::MissingPassword(config.password_env.clone()))?;

        let transport = SmtpTransport::starttls_relay(&config.smtp_server)?
            .port(config.smtp_port)
            .timeout(Some(config.timeout()))
            .credentials(Credentials::new(config.login().to_string(), password))
            .build();

        Ok(Self {
            transport,
            from: config.sender.parse()?,
            to: config.recipient.parse()?,
        })
    }

    pub fn send(&self, message: &AlertMessage) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        self.transport.send(&email)?;
        info!("Alerta enviado para {}", self.to);
        Ok(())
    }
}
