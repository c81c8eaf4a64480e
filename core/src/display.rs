/// Output formatting — short forms, timestamps, and message listings.
use alloy::primitives::{Address, TxHash};
use chrono::{Local, TimeZone};

use crate::network::Message;
use crate::session::{SessionSnapshot, TxPhase};

/// `0x12345678…89abcdef`: first 10 and last 8 characters of the hex hash.
#[must_use]
pub fn short_hash(hash: &TxHash) -> String {
    let full = alloy::hex::encode_prefixed(hash);
    format!("{}…{}", &full[..10], &full[full.len() - 8..])
}

/// `0x1234…abcd`: first 6 and last 4 characters of the checksummed address.
#[must_use]
pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

#[must_use]
pub fn explorer_tx_url(explorer: &str, hash: &TxHash) -> String {
    format!(
        "{}/tx/{}",
        explorer.trim_end_matches('/'),
        alloy::hex::encode_prefixed(hash)
    )
}

/// Local time for a unix timestamp in seconds.
#[must_use]
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| Local.timestamp_opt(s, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown time".to_string())
}

/// Newest first, one entry per message.
#[must_use]
pub fn format_messages(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages yet.".to_string();
    }
    let mut lines = Vec::with_capacity(messages.len() * 2);
    for m in messages.iter().rev() {
        lines.push(m.text.clone());
        lines.push(format!(
            "  #{} · {} · {}",
            m.index,
            short_address(&m.author),
            format_timestamp(m.posted_at)
        ));
    }
    lines.join("\n")
}

#[must_use]
pub fn messages_json(messages: &[Message]) -> serde_json::Value {
    serde_json::Value::Array(
        messages
            .iter()
            .rev()
            .map(|m| {
                serde_json::json!({
                    "index": m.index,
                    "text": m.text,
                    "author": m.author.to_checksum(None),
                    "posted_at": m.posted_at,
                })
            })
            .collect(),
    )
}

/// Pending transaction line for `tx` and `status`.
#[must_use]
pub fn format_transaction(snapshot: &SessionSnapshot) -> String {
    let Some(tx) = &snapshot.transaction else {
        return "No transaction tracked.".to_string();
    };
    let phase = match tx.phase {
        TxPhase::Submitted => "submitted",
        TxPhase::Confirming if tx.timeout_warned => "confirming (slow)",
        TxPhase::Confirming => "confirming",
        TxPhase::Confirmed => "confirmed",
        TxPhase::Failed => "failed",
    };
    let mut out = format!("Transaction {} — {phase}", short_hash(&tx.hash));
    if let Some(reason) = &tx.failure {
        out.push_str(&format!("\n  Reason: {reason}"));
    }
    if let Some(explorer) = snapshot.explorer_url.as_deref() {
        out.push_str(&format!("\n  {}", explorer_tx_url(explorer, &tx.hash)));
    }
    out
}

#[must_use]
pub fn format_status(snapshot: &SessionSnapshot) -> String {
    let contract = match snapshot.contract {
        Some(addr) => addr.to_checksum(None),
        None => "not configured".to_string(),
    };
    let account = snapshot
        .account
        .map(|a| short_address(&a))
        .unwrap_or_else(|| "not connected".to_string());
    let chain = match (snapshot.chain_id, snapshot.expected_chain_id) {
        (Some(actual), Some(expected)) if actual != expected => {
            format!("{actual} (expected {expected})")
        }
        (Some(actual), _) => actual.to_string(),
        (None, _) => "unknown".to_string(),
    };
    let count = match snapshot.count {
        Some(c) => c.to_string(),
        None => "—".to_string(),
    };

    let mut lines = vec![
        format!("  Contract: {contract}"),
        format!("  Account:  {account}"),
        format!("  Chain:    {chain}"),
        format!("  Messages: {count}"),
        format!("  State:    {}", snapshot.status_label()),
    ];
    if !snapshot.draft.is_empty() {
        lines.push(format!("  Draft:    {} / {}", snapshot.draft_units, snapshot.max_units));
    }
    if snapshot.transaction.is_some() {
        lines.push(format!("  {}", format_transaction(snapshot)));
    }
    if let Some(err) = &snapshot.window_error {
        lines.push(format!("  Read failed: {err}"));
    }
    lines.join("\n")
}
