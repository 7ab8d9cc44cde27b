//! Email service for sending one-time passcodes.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and plain text templates.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use emporium_core::auth::{CodeDispatcher, DispatchError, OtpPolicy};
use emporium_core::{Email, OtpPurpose};

use crate::config::EmailConfig;

/// Minutes a code stays valid, as stated in the email body.
fn code_valid_minutes() -> i64 {
    OtpPolicy::default().ttl.num_minutes()
}

/// HTML template for the passcode email.
#[derive(Template)]
#[template(path = "email/otp_code.html")]
struct OtpCodeEmailHtml<'a> {
    code: &'a str,
    heading: &'a str,
    valid_minutes: i64,
}

/// Plain text template for the passcode email.
#[derive(Template)]
#[template(path = "email/otp_code.txt")]
struct OtpCodeEmailText<'a> {
    code: &'a str,
    heading: &'a str,
    valid_minutes: i64,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Subject line and heading for each purpose.
const fn subject_for(purpose: OtpPurpose) -> &'static str {
    match purpose {
        OtpPurpose::Signup => "Verify your Emporium account",
        OtpPurpose::ForgotPassword => "Reset your Emporium password",
    }
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// No connection is made until the first send.
    ///
    /// # Errors
    ///
    /// Returns error if the relay hostname is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send a passcode email.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_code(
        &self,
        to: &Email,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), EmailError> {
        let heading = subject_for(purpose);
        let html = OtpCodeEmailHtml {
            code,
            heading,
            valid_minutes: code_valid_minutes(),
        }
        .render()?;
        let text = OtpCodeEmailText {
            code,
            heading,
            valid_minutes: code_valid_minutes(),
        }
        .render()?;

        self.send_multipart_email(to.as_str(), heading, &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
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

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[async_trait]
impl CodeDispatcher for EmailService {
    async fn send_verification_email(
        &self,
        to: &Email,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), DispatchError> {
        self.send_code(to, code, purpose)
            .await
            .map_err(|e| DispatchError(e.to_string()))
    }
}
