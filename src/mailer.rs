//! Outbound email for one-time passcodes.
//!
//! SMTP delivery goes through lettre. When no SMTP credentials are configured
//! the mailer is disabled and sends are logged and skipped.

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::{config::EmailConfig, otp::OtpPurpose};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

#[derive(Clone)]
pub enum Mailer {
    Smtp(SmtpMailer),
    Disabled,
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl Mailer {
    pub fn from_config(config: Option<&EmailConfig>) -> Result<Self, SmtpError> {
        let Some(config) = config else {
            tracing::warn!("SMTP is not configured; OTP emails will not be delivered");
            return Ok(Mailer::Disabled);
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Mailer::Smtp(SmtpMailer {
            transport,
            from_address: config.from_address.clone(),
        }))
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Mailer::Smtp(_))
    }

    pub async fn send_otp(
        &self,
        to: &str,
        code: &str,
        purpose: OtpPurpose,
        ttl_minutes: i64,
    ) -> Result<(), EmailError> {
        match self {
            Mailer::Smtp(smtp) => {
                let (text, html) = render_otp(code, purpose, ttl_minutes);
                smtp.send(to, purpose.email_subject(), &text, &html).await
            }
            Mailer::Disabled => {
                tracing::warn!(to = %to, purpose = purpose.as_str(), "mailer disabled; OTP email skipped");
                Ok(())
            }
        }
    }
}

impl SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.transport.send(email).await?;
        tracing::info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

fn render_otp(code: &str, purpose: OtpPurpose, ttl_minutes: i64) -> (String, String) {
    let action = match purpose {
        OtpPurpose::Register => "verify your new SparkleNest account",
        OtpPurpose::Login => "finish signing in to SparkleNest",
        OtpPurpose::Reset => "reset your SparkleNest password",
    };
    let text = format!(
        "Hello,\n\nUse the following One-Time Password (OTP) to {action}: {code}\n\n\
         This code will expire in {ttl_minutes} minutes.\n\n\
         If you did not request this, please ignore this email.\n\nThank you,\nSparkleNest Team"
    );
    let html = format!(
        "<div style='font-family: Arial, sans-serif; font-size: 16px; color: #222;'>\
         <p>Hello,</p><p>Use the following One-Time Password (OTP) to {action}:</p>\
         <p style='font-size: 24px; font-weight: bold; letter-spacing: 4px;'>{code}</p>\
         <p>This code will expire in {ttl_minutes} minutes.</p>\
         <p>If you did not request this, please ignore this email.</p>\
         <p>Thank you,<br/>SparkleNest Team</p></div>"
    );
    (text, html)
}
