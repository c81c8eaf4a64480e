//! Domain error type for session operations.

use thiserror::Error;

/// Typed error enum for session operations, allowing callers to match on
/// specific rejection reasons instead of inspecting opaque `anyhow::Error` messages.
#[derive(Debug, Error)]
pub enum MemoError {
    /// No contract address is configured (unset or the zero address).
    #[error("Contract not configured. Set MEMO_CONTRACT_ADDRESS or pass --contract.")]
    NotConfigured,

    /// A write was requested without a connected account.
    #[error("Connect an account first.")]
    NotConnected,

    /// The draft is empty after trimming whitespace.
    #[error("Message cannot be empty.")]
    EmptyMessage,

    /// The RPC endpoint reports a different chain than the one the contract lives on.
    #[error("Wrong network: connected to chain {actual}, expected {expected}. Use 'network' to switch.")]
    WrongNetwork { expected: u64, actual: u64 },

    /// A write or confirmation is still outstanding.
    #[error("A transaction is already in progress.")]
    Busy,

    /// The last message was confirmed and has not been dismissed yet.
    #[error("The last message is confirmed. Dismiss it before writing another.")]
    AwaitingDismiss,

    /// The session task is gone (shut down or panicked).
    #[error("Session has shut down.")]
    SessionClosed,
}

/// Alias for `std::result::Result<T, MemoError>`.
pub type Result<T> = std::result::Result<T, MemoError>;
