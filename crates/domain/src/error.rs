use thiserror::Error;

use crate::convert::ConvertError;

/// Errors raised anywhere below the device façade
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("Device is not connected")]
    NotConnected,

    #[error("No response within {timeout_ms}ms")]
    ResponseTimeout { timeout_ms: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid device configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConvertError),
}

impl DeviceError {
    /// Numeric code carried by failed `OperateResult`s
    pub fn code(&self) -> i32 {
        match self {
            Self::NotConnected => 1,
            Self::ResponseTimeout { .. } => 2,
            Self::Protocol(_) => 3,
            Self::Transport(_) => 4,
            Self::InvalidConfiguration(_) => 5,
            Self::InvalidRequest(_) => 6,
            Self::Conversion(_) => 7,
        }
    }

    /// Transport failures are the only errors that imply the link went down
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            DeviceError::NotConnected,
            DeviceError::ResponseTimeout { timeout_ms: 100 },
            DeviceError::Protocol("x".into()),
            DeviceError::Transport("x".into()),
            DeviceError::InvalidConfiguration("x".into()),
            DeviceError::InvalidRequest("x".into()),
            DeviceError::Conversion(ConvertError::LengthMismatch {
                width: 2,
                count: 1,
                actual: 3,
            }),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.code()).collect();
        codes.dedup();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_timeout_message_carries_value() {
        let err = DeviceError::ResponseTimeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "No response within 1500ms");
    }
}
