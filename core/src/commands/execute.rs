use anyhow::{bail, Result};

use super::help::help_text;
use super::Command;
use crate::display;
use crate::error::MemoError;
use crate::session::{SessionHandle, TxPhase};

impl Command {
    /// Execute a command against a running session and return the output string.
    /// Shell commands (connect, network switching, password) are handled by the
    /// front end and rejected here.
    pub async fn execute(&self, session: &SessionHandle, json_output: bool) -> Result<String> {
        match self {
            Command::Post { text } => {
                let before = session.snapshot();
                let previous = before.transaction.as_ref().map(|tx| tx.hash);
                // A confirmed message is cleared implicitly by writing the next one.
                if before
                    .transaction
                    .as_ref()
                    .is_some_and(|tx| tx.phase == TxPhase::Confirmed)
                {
                    session.dismiss().await?;
                }

                let outcome = session.edit_draft(text.as_str()).await?;
                session.submit().await?;
                let after = session.wait_for(|s| !s.writing).await?;

                let Some(tx) = after
                    .transaction
                    .as_ref()
                    .filter(|tx| Some(tx.hash) != previous)
                else {
                    bail!("Message was not posted.");
                };
                let explorer = after
                    .explorer_url
                    .as_deref()
                    .map(|e| display::explorer_tx_url(e, &tx.hash));

                if json_output {
                    Ok(serde_json::json!({
                        "hash": alloy::hex::encode_prefixed(tx.hash),
                        "status": tx.phase.to_string(),
                        "truncated": outcome.truncated,
                        "explorer": explorer,
                    })
                    .to_string())
                } else {
                    let mut out = format!(
                        "Transaction sent!\n  Hash:   {}\n  Status: {}",
                        display::short_hash(&tx.hash),
                        tx.phase
                    );
                    if let Some(url) = explorer {
                        out.push_str(&format!("\n  {url}"));
                    }
                    if outcome.truncated {
                        out.push_str(&format!(
                            "\n  Note: message was cut to {} characters.",
                            after.max_units
                        ));
                    }
                    Ok(out)
                }
            }

            Command::Messages => {
                let snapshot = session.snapshot();
                if !snapshot.is_configured() {
                    bail!(MemoError::NotConfigured);
                }
                if json_output {
                    Ok(serde_json::to_string_pretty(&display::messages_json(
                        &snapshot.messages,
                    ))?)
                } else if snapshot.count.is_none() {
                    Ok("Messages not loaded yet.".to_string())
                } else {
                    Ok(display::format_messages(&snapshot.messages))
                }
            }

            Command::Count => {
                let snapshot = session.snapshot();
                if !snapshot.is_configured() {
                    bail!(MemoError::NotConfigured);
                }
                match (snapshot.count, json_output) {
                    (count, true) => Ok(serde_json::json!({ "count": count }).to_string()),
                    (Some(count), false) => Ok(format!("{count} messages")),
                    (None, false) => Ok("Message count not loaded yet.".to_string()),
                }
            }

            Command::Status => {
                let snapshot = session.snapshot();
                if json_output {
                    Ok(serde_json::json!({
                        "contract": snapshot.contract.map(|a| a.to_checksum(None)),
                        "account": snapshot.account.map(|a| a.to_checksum(None)),
                        "chain_id": snapshot.chain_id,
                        "expected_chain_id": snapshot.expected_chain_id,
                        "count": snapshot.count,
                        "state": snapshot.status_label(),
                        "draft_units": snapshot.draft_units,
                        "transaction": snapshot.transaction.as_ref().map(|tx| serde_json::json!({
                            "hash": alloy::hex::encode_prefixed(tx.hash),
                            "status": tx.phase.to_string(),
                            "slow": tx.timeout_warned,
                            "error": tx.failure.as_ref().map(|f| f.label()),
                        })),
                    })
                    .to_string())
                } else {
                    Ok(display::format_status(&snapshot))
                }
            }

            Command::Tx => {
                let snapshot = session.snapshot();
                if json_output {
                    Ok(match &snapshot.transaction {
                        Some(tx) => serde_json::json!({
                            "hash": alloy::hex::encode_prefixed(tx.hash),
                            "status": tx.phase.to_string(),
                            "submitted_at": tx.submitted_at,
                            "slow": tx.timeout_warned,
                            "error": tx.failure.as_ref().map(|f| f.to_string()),
                        }),
                        None => serde_json::Value::Null,
                    }
                    .to_string())
                } else {
                    Ok(display::format_transaction(&snapshot))
                }
            }

            Command::Dismiss => {
                session.dismiss().await?;
                Ok("Dismissed.".to_string())
            }

            Command::Refresh => {
                session.refresh().await?;
                Ok("Refreshing...".to_string())
            }

            Command::Address => {
                let Some(address) = session.snapshot().account else {
                    bail!(MemoError::NotConnected);
                };
                if json_output {
                    Ok(serde_json::json!({ "address": address.to_checksum(None) }).to_string())
                } else {
                    Ok(address.to_checksum(None))
                }
            }

            Command::Network { target: None } => {
                let snapshot = session.snapshot();
                let chain = snapshot
                    .chain_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                if json_output {
                    Ok(serde_json::json!({
                        "network": snapshot.network_name,
                        "chain_id": snapshot.chain_id,
                        "expected_chain_id": snapshot.expected_chain_id,
                    })
                    .to_string())
                } else if snapshot.wrong_network() {
                    Ok(format!(
                        "Network: {} (endpoint reports chain {chain}, expected {})",
                        snapshot.network_name,
                        snapshot.expected_chain_id.unwrap_or_default()
                    ))
                } else {
                    Ok(format!("Network: {} (chain {chain})", snapshot.network_name))
                }
            }

            Command::Network { target: Some(_) } | Command::Connect | Command::Disconnect => {
                bail!("This command requires interactive mode. Use the REPL instead of --cmd.")
            }

            Command::Password => {
                bail!("The password command requires interactive mode. Use the REPL instead of --cmd.")
            }

            Command::Help { command } => Ok(help_text(command.as_deref())),

            Command::Exit => Ok(String::new()),
        }
    }
}
