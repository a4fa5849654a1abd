// Licensed under the Apache-2.0 license

//! Error taxonomy shared by the AMBT53 transport, mailbox, loader, IPC and SCPM drivers.

#![cfg_attr(target_os = "none", no_std)]

use thiserror::Error;

pub type Ambt53Result<T> = Result<T, Ambt53Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ambt53Error {
    /// Malformed caller input, rejected before any hardware access.
    #[error("invalid argument")]
    InvalidArg,
    /// A precondition state was not met (instance not initialized, bus mid-transaction).
    #[error("device busy")]
    Busy,
    #[error("operation already in progress")]
    AlreadyInProgress,
    /// A bounded wait ran out of iterations. Bus state is left as-is.
    #[error("timed out")]
    Timeout,
    /// The bus or the remote reported an error status.
    #[error("operation failed")]
    Fail,
    #[error("bus initialization failed")]
    BusInitFailed,
    /// The remote kept reporting a bus-level fault.
    #[error("remote reported a persistent bus fault")]
    HardwareFault,
    #[error("invalid operation in the current state")]
    InvalidOperation,
    /// Firmware image address or size is not 4-byte aligned.
    #[error("segment size or address not word aligned")]
    SegmentSizeError,
    #[error("out of range")]
    OutOfRange,
    /// A fixed-capacity table is full.
    #[error("no space left in table")]
    NoSpace,
    #[error("no memory, {available} bytes available")]
    NoMemory { available: usize },
    #[error("bad message")]
    BadMsg,
    #[error("not supported")]
    NotSupported,
    #[error("read-back mismatch at {address:#x}")]
    VerifyMismatch { address: u32 },
    #[error("malformed firmware image")]
    InvalidImage,
}

impl Ambt53Error {
    /// Errors after which the caller may simply retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Ambt53Error::Busy | Ambt53Error::AlreadyInProgress | Ambt53Error::NoMemory { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        assert_eq!(
            Ambt53Error::NoMemory { available: 496 }.to_string(),
            "no memory, 496 bytes available"
        );
        assert_eq!(
            Ambt53Error::VerifyMismatch { address: 0x1000 }.to_string(),
            "read-back mismatch at 0x1000"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(Ambt53Error::Busy.is_retryable());
        assert!(!Ambt53Error::SegmentSizeError.is_retryable());
        assert!(!Ambt53Error::Timeout.is_retryable());
    }
}
