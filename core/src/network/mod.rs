//! Thin wrapper around an alloy HTTP provider for the guestbook contract.
mod contract;
mod types;

pub use types::*;

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::json_rpc::RpcError;
use alloy::transports::http::reqwest::Url;
use alloy::transports::TransportErrorKind;
use anyhow::{bail, Context, Result};

use crate::account::{Network, NetworkConfig};
use crate::config::DEFAULT_CONFIRMATION_POLL;
use crate::normalize::RawError;

pub struct EvmGuestbook {
    pub(super) provider: RootProvider,
    pub(super) url: Url,
    pub(super) contract: Option<Address>,
    pub(super) network: Network,
    pub(super) confirmation_poll: Duration,
}

/// Reject non-HTTPS node URLs unless `allow_insecure` is set.
pub fn validate_node_url(url: &str, allow_insecure: bool) -> Result<()> {
    if url.starts_with("https://") {
        return Ok(());
    }
    if url.starts_with("http://") {
        if allow_insecure {
            return Ok(());
        }
        bail!("Refusing to connect over plain HTTP: {url}\nUse --insecure to allow unencrypted connections.");
    }
    bail!("Invalid node URL scheme: {url}\nExpected an https:// URL.");
}

impl EvmGuestbook {
    pub fn new(config: &NetworkConfig, contract: Option<Address>, allow_insecure: bool) -> Result<Self> {
        let node_url = match config.network.default_rpc_url() {
            Some(url) => url.to_string(),
            None => {
                let url = config
                    .custom_url
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("Custom network requires an RPC URL"))?;
                validate_node_url(url, allow_insecure)?;
                url.clone()
            }
        };
        let url: Url = node_url
            .parse()
            .with_context(|| format!("Invalid RPC URL '{node_url}'"))?;

        Ok(Self {
            provider: RootProvider::new_http(url.clone()),
            url,
            contract,
            network: config.network,
            confirmation_poll: DEFAULT_CONFIRMATION_POLL,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn node_url(&self) -> &str {
        self.url.as_str()
    }

    /// Query chain id and head block of the endpoint.
    pub async fn status(&self) -> std::result::Result<NetworkStatus, RawError> {
        let chain_id = self.provider.get_chain_id().await.map_err(rpc_error)?;
        let block_number = self.provider.get_block_number().await.map_err(rpc_error)?;
        Ok(NetworkStatus {
            network: self.network,
            node_url: self.node_url().to_string(),
            chain_id,
            block_number,
        })
    }
}

/// Flatten a JSON-RPC failure into the fields the classifier looks at.
/// Error responses keep the node's own message as the short message and
/// any revert data as details.
pub(crate) fn rpc_error(err: RpcError<TransportErrorKind>) -> RawError {
    match err {
        RpcError::ErrorResp(payload) => {
            let raw = RawError::from_message(payload.to_string())
                .with_short_message(payload.message.to_string());
            match payload.data.as_ref() {
                Some(data) => raw.with_details(data.get()),
                None => raw,
            }
        }
        other => RawError::from_message(other.to_string()),
    }
}

pub(crate) fn contract_error(err: alloy::contract::Error) -> RawError {
    match err {
        alloy::contract::Error::TransportError(inner) => rpc_error(inner),
        other => RawError::from_message(other.to_string()),
    }
}
