//! NIC error types and status handling.
//!
//! Driver bindings report failures as negative errno values. This module maps
//! those raw codes onto [`NicStatus`] and wraps them in [`NicError`] so the
//! reconciler can log and report them uniformly.

use std::fmt;
use thiserror::Error;

/// Driver status codes, as returned by the register-level NIC library.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NicStatus {
    Success = 0,
    Failure = -1,
    IoError = -5,
    NoDevice = -19,
    Busy = -16,
    InvalidParameter = -22,
    NoSpace = -28,
    NotSupported = -95,
    TimedOut = -110,
}

impl NicStatus {
    /// Creates a NicStatus from a raw driver return code.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => NicStatus::Success,
            -5 => NicStatus::IoError,
            -16 => NicStatus::Busy,
            -19 => NicStatus::NoDevice,
            -22 => NicStatus::InvalidParameter,
            -28 => NicStatus::NoSpace,
            -95 => NicStatus::NotSupported,
            -110 => NicStatus::TimedOut,
            _ => NicStatus::Failure,
        }
    }

    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        *self == NicStatus::Success
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> NicResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(NicError::from_status(self))
        }
    }
}

impl fmt::Display for NicStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NicStatus::Success => "NIC_STATUS_SUCCESS",
            NicStatus::Failure => "NIC_STATUS_FAILURE",
            NicStatus::IoError => "NIC_STATUS_IO_ERROR",
            NicStatus::NoDevice => "NIC_STATUS_NO_DEVICE",
            NicStatus::Busy => "NIC_STATUS_BUSY",
            NicStatus::InvalidParameter => "NIC_STATUS_INVALID_PARAMETER",
            NicStatus::NoSpace => "NIC_STATUS_NO_SPACE",
            NicStatus::NotSupported => "NIC_STATUS_NOT_SUPPORTED",
            NicStatus::TimedOut => "NIC_STATUS_TIMED_OUT",
        };
        write!(f, "{}", s)
    }
}

/// Error type for NIC control calls.
#[derive(Debug, Clone, Error)]
pub enum NicError {
    /// The driver returned an error status.
    #[error("NIC call failed: {status}")]
    Status { status: NicStatus },

    /// The hardware or driver does not implement the call.
    #[error("Not supported: {feature}")]
    NotSupported { feature: String },

    /// A parameter was rejected before reaching the hardware.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The call did not complete within its time budget.
    #[error("{op} timed out after {millis}ms")]
    Timeout { op: String, millis: u64 },

    /// The port has been released and accepts no further calls.
    #[error("Port {port} has been released")]
    Released { port: u16 },

    /// Internal error in the binding.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NicError {
    /// Creates a NicError from a NicStatus.
    pub fn from_status(status: NicStatus) -> Self {
        match status {
            NicStatus::NotSupported => NicError::NotSupported {
                feature: "unknown".to_string(),
            },
            _ => NicError::Status { status },
        }
    }

    /// Creates an InvalidParameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        NicError::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a NotSupported error.
    pub fn not_supported(feature: impl Into<String>) -> Self {
        NicError::NotSupported {
            feature: feature.into(),
        }
    }

    /// Creates an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        NicError::Internal {
            message: message.into(),
        }
    }

    /// Returns the underlying status code if this is a status error.
    pub fn status(&self) -> Option<NicStatus> {
        match self {
            NicError::Status { status } => Some(*status),
            NicError::Timeout { .. } => Some(NicStatus::TimedOut),
            _ => None,
        }
    }

    /// Returns true if the call may succeed when issued again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NicError::Timeout { .. }
                | NicError::Status {
                    status: NicStatus::Busy | NicStatus::TimedOut
                }
        )
    }
}

/// Result type for NIC control calls.
pub type NicResult<T> = Result<T, NicError>;

/// Extension trait for converting raw driver return codes to Results.
pub trait NicStatusExt {
    /// Converts a raw return code into a NicResult.
    fn to_nic_result(self) -> NicResult<()>;
}

impl NicStatusExt for i32 {
    fn to_nic_result(self) -> NicResult<()> {
        NicStatus::from_raw(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_raw() {
        assert_eq!(NicStatus::from_raw(0), NicStatus::Success);
        assert_eq!(NicStatus::from_raw(-22), NicStatus::InvalidParameter);
        assert_eq!(NicStatus::from_raw(-95), NicStatus::NotSupported);
        assert_eq!(NicStatus::from_raw(-9999), NicStatus::Failure);
    }

    #[test]
    fn test_status_into_result() {
        assert!(NicStatus::Success.into_result().is_ok());
        assert!(NicStatus::Busy.into_result().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(NicStatus::NoSpace.to_string(), "NIC_STATUS_NO_SPACE");
    }

    #[test]
    fn test_error_retryable() {
        assert!(NicError::from_status(NicStatus::Busy).is_retryable());
        assert!(NicError::Timeout {
            op: "set_rate_limit".to_string(),
            millis: 10
        }
        .is_retryable());
        assert!(!NicError::invalid_parameter("vf").is_retryable());
        assert!(!NicError::Released { port: 0 }.is_retryable());
    }

    #[test]
    fn test_not_supported_from_status() {
        let err = NicError::from_status(NicStatus::NotSupported);
        assert!(matches!(err, NicError::NotSupported { .. }));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_raw_code_ext() {
        assert!(0i32.to_nic_result().is_ok());
        let err = (-110i32).to_nic_result().unwrap_err();
        assert_eq!(err.status(), Some(NicStatus::TimedOut));
    }
}
