//! Error normalization: turns the heterogeneous failures coming out of the
//! RPC/signing layer into a small fixed taxonomy before anything is shown.
//!
//! Classification is a case-insensitive substring match over the most
//! specific text available (`short_message`, then `message`, then `details`),
//! checked in a fixed priority order. The order matters: provider messages
//! often mention several things at once ("user rejected ... insufficient
//! funds"), and the earlier category wins.

use std::fmt;

/// Longest revert reason passed through verbatim.
const MAX_REASON_LEN: usize = 200;

/// Normalized record of an external failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawError {
    pub name: Option<String>,
    pub message: Option<String>,
    pub short_message: Option<String>,
    pub details: Option<String>,
}

impl RawError {
    /// A failure carrying only a free-form message.
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_short_message(mut self, short: impl Into<String>) -> Self {
        self.short_message = Some(short.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// The most specific non-blank text on the record.
    fn raw_text(&self) -> Option<&str> {
        [&self.short_message, &self.message, &self.details]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw_text() {
            Some(text) => write!(f, "{text}"),
            None => write!(f, "unknown error"),
        }
    }
}

/// Fixed failure taxonomy shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    UserRejected,
    InsufficientFunds,
    /// Balance cannot cover even the intrinsic (base) cost of the transaction.
    InsufficientBaseFee,
    WrongNetwork,
    Timeout,
    Connectivity,
    /// Contract revert or any other provider message, kept verbatim (bounded).
    Revert(String),
    Unknown,
}

impl FailureKind {
    /// Short machine-friendly label, used in JSON output and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::UserRejected => "user_rejected",
            Self::InsufficientFunds | Self::InsufficientBaseFee => "insufficient_funds",
            Self::WrongNetwork => "wrong_network",
            Self::Timeout => "timeout",
            Self::Connectivity => "connectivity",
            Self::Revert(_) => "revert",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserRejected => write!(f, "You cancelled the request in your wallet."),
            Self::InsufficientFunds => {
                write!(f, "Insufficient balance to pay for gas. Fund the account on this network.")
            }
            Self::InsufficientBaseFee => {
                write!(f, "Insufficient balance to pay the base transaction fee (gas).")
            }
            Self::WrongNetwork => write!(f, "Network mismatch. Switch to the contract's network."),
            Self::Timeout => write!(f, "Request timed out. Check the RPC endpoint and retry."),
            Self::Connectivity => write!(f, "Network error. Check your connection or RPC endpoint and retry."),
            Self::Revert(reason) => write!(f, "{reason}"),
            Self::Unknown => write!(f, "An unknown error occurred."),
        }
    }
}

const USER_REJECTED_NAME: &str = "UserRejectedRequestError";
const USER_REJECTED: &[&str] = &["user rejected", "rejected the request", "user denied"];
const TIMEOUT: &[&str] = &["timeout", "timed out"];
const CONNECTIVITY: &[&str] = &[
    "failed to fetch",
    "network error",
    "connection refused",
    "error sending request",
    "dns error",
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_wrong_network(lower: &str) -> bool {
    (lower.contains("chain") && lower.contains("not configured"))
        || lower.contains("unsupported chain")
        || lower.contains("chain mismatch")
        || lower.contains("wrong chain")
}

fn bounded_reason(text: &str) -> String {
    if text.chars().count() <= MAX_REASON_LEN {
        return text.to_string();
    }
    let mut reason: String = text.chars().take(MAX_REASON_LEN).collect();
    reason.push('…');
    reason
}

/// Classify a normalized error. Deterministic and order-sensitive.
#[must_use]
pub fn classify(error: &RawError) -> FailureKind {
    if error.name.as_deref() == Some(USER_REJECTED_NAME) {
        return FailureKind::UserRejected;
    }

    let Some(raw) = error.raw_text() else {
        return FailureKind::Unknown;
    };
    let lower = raw.to_lowercase();

    if contains_any(&lower, USER_REJECTED) {
        FailureKind::UserRejected
    } else if lower.contains("insufficient funds") {
        FailureKind::InsufficientFunds
    } else if lower.contains("intrinsic transaction cost") {
        FailureKind::InsufficientBaseFee
    } else if is_wrong_network(&lower) {
        FailureKind::WrongNetwork
    } else if contains_any(&lower, TIMEOUT) {
        FailureKind::Timeout
    } else if contains_any(&lower, CONNECTIVITY) {
        FailureKind::Connectivity
    } else {
        FailureKind::Revert(bounded_reason(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_wins_over_balance() {
        let err = RawError::from_message(
            "User rejected the request: insufficient funds for gas * price + value",
        );
        assert_eq!(classify(&err), FailureKind::UserRejected);
    }

    #[test]
    fn rejection_by_error_name() {
        let err = RawError::from_message("something opaque").with_name("UserRejectedRequestError");
        assert_eq!(classify(&err), FailureKind::UserRejected);
    }

    #[test]
    fn balance_wins_over_network() {
        let err = RawError::from_message("insufficient funds; network error while estimating");
        assert_eq!(classify(&err), FailureKind::InsufficientFunds);
    }

    #[test]
    fn intrinsic_cost_is_base_fee() {
        let err = RawError::from_message("intrinsic transaction cost exceeds balance");
        assert_eq!(classify(&err), FailureKind::InsufficientBaseFee);
        assert_eq!(classify(&err).label(), "insufficient_funds");
    }

    #[test]
    fn chain_phrases() {
        for msg in [
            "Chain 1 not configured",
            "Unsupported chain id",
            "chain mismatch: expected 11155111",
        ] {
            assert_eq!(classify(&RawError::from_message(msg)), FailureKind::WrongNetwork, "{msg}");
        }
        // "chain" alone is not enough
        assert!(matches!(
            classify(&RawError::from_message("blockchain says no")),
            FailureKind::Revert(_)
        ));
    }

    #[test]
    fn timeout_before_connectivity() {
        let err = RawError::from_message("network error: request timed out");
        assert_eq!(classify(&err), FailureKind::Timeout);
    }

    #[test]
    fn connectivity() {
        let err = RawError::from_message("error sending request for url (https://rpc.example)");
        assert_eq!(classify(&err), FailureKind::Connectivity);
    }

    #[test]
    fn short_message_preferred_over_message() {
        let err = RawError::from_message("Request failed with a very long RPC payload {\"jsonrpc\":...}")
            .with_short_message("execution reverted: Message too long");
        assert_eq!(
            classify(&err),
            FailureKind::Revert("execution reverted: Message too long".into())
        );
    }

    #[test]
    fn details_used_as_last_resort() {
        let err = RawError::default().with_details("Failed to fetch");
        assert_eq!(classify(&err), FailureKind::Connectivity);
    }

    #[test]
    fn blank_fields_are_unknown() {
        assert_eq!(classify(&RawError::default()), FailureKind::Unknown);
        let blank = RawError::from_message("   ").with_short_message("");
        assert_eq!(classify(&blank), FailureKind::Unknown);
    }

    #[test]
    fn long_reason_is_bounded() {
        let err = RawError::from_message("x".repeat(5_000));
        match classify(&err) {
            FailureKind::Revert(reason) => assert_eq!(reason.chars().count(), MAX_REASON_LEN + 1),
            other => panic!("expected Revert, got {other:?}"),
        }
    }

    #[test]
    fn case_insensitive() {
        let err = RawError::from_message("INSUFFICIENT FUNDS");
        assert_eq!(classify(&err), FailureKind::InsufficientFunds);
    }
}
