//! Out-of-band delivery of issued codes.
//!
//! There is no SMS gateway: [`LogSink`] writes the code to the operational log.

use dashmap::DashMap;
use tracing::info;

use super::phone::PhoneNumber;

/// Fire-and-forget channel for freshly issued codes. Failures stay inside the sink.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, phone: &PhoneNumber, code: &str);
}

#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn emit(&self, phone: &PhoneNumber, code: &str) {
        info!(phone_number = %phone, otp_code = code, "OTP for {phone}: {code}");
    }
}

/// Keeps the last code per phone in memory; for demos and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    codes: DashMap<String, String>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_code(&self, phone: &str) -> Option<String> {
        self.codes.get(phone).map(|code| code.value().clone())
    }

    #[must_use]
    pub fn delivered(&self) -> usize {
        self.codes.len()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, phone: &PhoneNumber, code: &str) {
        self.codes.insert(phone.to_string(), code.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::error::OtpError;

    #[test]
    fn recording_sink_keeps_latest_code() -> Result<(), OtpError> {
        let sink = RecordingSink::new();
        let phone = PhoneNumber::parse("+14155550100")?;
        sink.emit(&phone, "111111");
        sink.emit(&phone, "222222");
        assert_eq!(sink.last_code("+14155550100").as_deref(), Some("222222"));
        assert_eq!(sink.last_code("+14155550101"), None);
        assert_eq!(sink.delivered(), 1);
        Ok(())
    }

    #[test]
    fn log_sink_does_not_panic_without_subscriber() -> Result<(), OtpError> {
        LogSink.emit(&PhoneNumber::parse("+14155550100")?, "123456");
        Ok(())
    }
}
