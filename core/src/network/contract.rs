/// Guestbook contract calls: reads through the shared provider, writes
/// through a signing provider built per submission.
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{contract_error, rpc_error, EvmGuestbook, Message};
use crate::client::GuestbookClient;
use crate::normalize::RawError;

sol! {
    #[sol(rpc)]
    interface MemoBoard {
        function messageCount() external view returns (uint256);
        function getMessage(uint256 index) external view returns (string memory text, address author, uint40 timestamp);
        function postMessage(string calldata text) external;
    }
}

/// Consecutive receipt lookups that may fail before the wait gives up.
const MAX_RECEIPT_ERRORS: u32 = 5;

impl EvmGuestbook {
    fn contract_address(&self) -> Result<Address, RawError> {
        self.contract
            .ok_or_else(|| RawError::from_message("Contract address is not configured"))
    }
}

#[async_trait]
impl GuestbookClient for EvmGuestbook {
    fn contract(&self) -> Option<Address> {
        self.contract
    }

    async fn chain_id(&self) -> Result<u64, RawError> {
        self.provider.get_chain_id().await.map_err(rpc_error)
    }

    async fn message_count(&self) -> Result<u64, RawError> {
        let board = MemoBoard::new(self.contract_address()?, self.provider.clone());
        let count: U256 = board.messageCount().call().await.map_err(contract_error)?._0;
        debug!(%count, "message count");
        u64::try_from(count)
            .map_err(|_| RawError::from_message(format!("Message count out of range: {count}")))
    }

    async fn message(&self, index: u64) -> Result<Message, RawError> {
        let board = MemoBoard::new(self.contract_address()?, self.provider.clone());
        let entry = board
            .getMessage(U256::from(index))
            .call()
            .await
            .map_err(contract_error)?;
        let posted_at = u64::try_from(entry.timestamp)
            .map_err(|e| RawError::from_message(format!("Message timestamp out of range: {e}")))?;
        Ok(Message {
            index,
            text: entry.text,
            author: entry.author,
            posted_at,
        })
    }

    async fn post_message(&self, signer: &PrivateKeySigner, text: &str) -> Result<TxHash, RawError> {
        let contract = self.contract_address()?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .on_http(self.url.clone());
        let board = MemoBoard::new(contract, provider);

        let pending = board
            .postMessage(text.to_string())
            .send()
            .await
            .map_err(contract_error)?;
        let hash = *pending.tx_hash();
        info!(%hash, from = %signer.address(), "message submitted");
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<(), RawError> {
        let mut errors = 0;
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status() {
                        info!(%hash, block = ?receipt.block_number, "transaction confirmed");
                        return Ok(());
                    }
                    warn!(%hash, "transaction reverted");
                    return Err(RawError::from_message(format!(
                        "Transaction reverted on-chain ({hash})"
                    )));
                }
                Ok(None) => errors = 0,
                Err(e) => {
                    errors += 1;
                    warn!(%hash, attempt = errors, "receipt lookup failed: {e}");
                    if errors >= MAX_RECEIPT_ERRORS {
                        return Err(rpc_error(e));
                    }
                }
            }
            tokio::time::sleep(self.confirmation_poll).await;
        }
    }
}
