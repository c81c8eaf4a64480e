/// Session tuning and contract configuration.
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};

use crate::composer::MAX_MESSAGE_UNITS;
use crate::reconcile::DEFAULT_PAGE_SIZE;

/// Environment variable holding the guestbook contract address.
pub const CONTRACT_ENV: &str = "MEMO_CONTRACT_ADDRESS";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);
pub const DEFAULT_TIMEOUT_WARNING: Duration = Duration::from_secs(90);
pub const DEFAULT_CONFIRMATION_POLL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Number of most recent messages kept in view.
    pub page_size: u64,
    /// Interval between background count/window reads.
    pub poll_interval: Duration,
    /// How long a transaction may stay unconfirmed before the slow-confirmation warning.
    pub timeout_warning: Duration,
    pub max_message_units: usize,
    /// Chain the contract is deployed on. `None` accepts whatever the endpoint reports.
    pub expected_chain_id: Option<u64>,
    /// Name shown in "switch to ..." hints.
    pub network_name: String,
    /// Block explorer base URL for transaction links.
    pub explorer_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout_warning: DEFAULT_TIMEOUT_WARNING,
            max_message_units: MAX_MESSAGE_UNITS,
            expected_chain_id: None,
            network_name: "the contract's network".to_string(),
            explorer_url: None,
        }
    }
}

impl SessionConfig {
    /// Defaults for a known network: expected chain id, name and explorer.
    pub fn for_network(network: crate::account::Network) -> Self {
        Self {
            expected_chain_id: network.chain_id(),
            network_name: network.to_string(),
            explorer_url: network.explorer_url().map(str::to_string),
            ..Self::default()
        }
    }
}

/// Parse a configured contract address. Blank input and the zero address
/// both mean "not configured".
pub fn parse_contract_address(raw: Option<&str>) -> Result<Option<Address>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let address: Address = raw
        .parse()
        .with_context(|| format!("Invalid contract address '{raw}'"))?;
    Ok((!address.is_zero()).then_some(address))
}
