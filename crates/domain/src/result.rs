use serde::Serialize;

use crate::error::DeviceError;

/// Tagged outcome of a façade operation. Failures never escape as errors;
/// they are reported here with a short message and a numeric code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum OperateResult<T> {
    Success { value: T, message: String },
    Failure { code: i32, message: String },
}

impl<T> OperateResult<T> {
    pub fn success(value: T, message: impl Into<String>) -> Self {
        Self::Success {
            value,
            message: message.into(),
        }
    }

    pub fn failure(error: &DeviceError) -> Self {
        Self::Failure {
            code: error.code(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Failure { message, .. } => message,
        }
    }

    /// 0 on success, otherwise the `DeviceError::code`
    pub fn code(&self) -> i32 {
        match self {
            Self::Success { .. } => 0,
            Self::Failure { code, .. } => *code,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Success { value, .. } => Some(value),
            Self::Failure { .. } => None,
        }
    }
}
