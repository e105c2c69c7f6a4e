use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Delivers one-time codes to a phone. Callers treat delivery as
/// fire-and-forget and only log failures.
pub trait NotificationSink: Send + Sync {
    fn send_otp(&self, phone: &str, code: &str) -> Result<(), NotifyError>;
}

/// Writes codes to the log instead of an SMS gateway.
#[derive(Debug, Default, Clone)]
pub struct LogSmsSink;

impl NotificationSink for LogSmsSink {
    fn send_otp(&self, phone: &str, code: &str) -> Result<(), NotifyError> {
        if phone.trim().is_empty() {
            return Err(NotifyError::Rejected("empty phone number".into()));
        }
        tracing::info!(phone = %phone, otp = %code, "sms otp dispatched");
        Ok(())
    }
}
