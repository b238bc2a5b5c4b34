use tracing::info;

use crate::OtpConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

/// A code on its way to the subject.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpMessage {
    pub recipient: String,
    pub code: String,
    pub subject: String,
    pub verification_url: String,
}

impl OtpMessage {
    pub fn new(recipient: &str, code: &str, config: &OtpConfig) -> Self {
        Self {
            recipient: recipient.to_string(),
            code: code.to_string(),
            subject: format!("[{}] Your verification code: {code}", config.app_name),
            verification_url: format!("{}verify-otp?email={recipient}", config.base_url),
        }
    }
}

impl std::fmt::Debug for OtpMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpMessage")
            .field("recipient", &self.recipient)
            .field("code", &"..")
            .field("verification_url", &self.verification_url)
            .finish()
    }
}

/// Delivery channel for codes. Delivery is all-or-nothing.
pub trait Notifier {
    fn send(&self, message: &OtpMessage) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn send(&self, message: &OtpMessage) -> Result<(), NotifyError> {
        (**self).send(message)
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &OtpMessage) -> Result<(), NotifyError> {
        info!(
            to = %message.recipient,
            subject = %message.subject,
            url = %message.verification_url,
            "otp message (not delivered)"
        );
        Ok(())
    }
}
