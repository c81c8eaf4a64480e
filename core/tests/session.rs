/// Session tests against an in-process guestbook, plus live checks.
/// Live tests hit Sepolia. Run with: cargo test -- --ignored
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use memo_core::cache::{CachedGuestbook, MessageCache};
use memo_core::client::GuestbookClient;
use memo_core::config::{parse_contract_address, SessionConfig, CONTRACT_ENV};
use memo_core::network::{EvmGuestbook, Message};
use memo_core::session::{self, SessionHandle};
use memo_core::{
    Address, Command, FailureKind, MemoError, Network, NetworkConfig, Notification,
    PrivateKeySigner, RawError, TxHash, TxPhase,
};
use tokio::sync::mpsc::UnboundedReceiver;

const SEPOLIA: u64 = 11_155_111;

#[derive(Default)]
struct MockState {
    messages: Vec<Message>,
    pending: Vec<(TxHash, String)>,
    next_hash: u8,
    count_calls: usize,
    message_calls: usize,
    fail_reads: bool,
    chain_failures: usize,
    post_error: Option<RawError>,
    confirm_delay: Duration,
    confirm_error: Option<RawError>,
}

struct MockGuestbook {
    contract: Option<Address>,
    chain_id: u64,
    state: Mutex<MockState>,
}

impl MockGuestbook {
    fn new(existing: u64) -> Self {
        let messages = (0..existing)
            .map(|index| Message {
                index,
                text: format!("entry {index}"),
                author: Address::with_last_byte(0x11),
                posted_at: 1_700_000_000 + index,
            })
            .collect();
        Self {
            contract: Some(Address::with_last_byte(0xc0)),
            chain_id: SEPOLIA,
            state: Mutex::new(MockState {
                messages,
                confirm_delay: Duration::from_secs(5),
                ..MockState::default()
            }),
        }
    }

    fn unconfigured() -> Self {
        Self {
            contract: None,
            ..Self::new(0)
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl GuestbookClient for MockGuestbook {
    fn contract(&self) -> Option<Address> {
        self.contract
    }

    async fn chain_id(&self) -> Result<u64, RawError> {
        self.with(|s| {
            if s.chain_failures > 0 {
                s.chain_failures -= 1;
                return Err(RawError::from_message("error sending request"));
            }
            Ok(self.chain_id)
        })
    }

    async fn message_count(&self) -> Result<u64, RawError> {
        self.with(|s| {
            s.count_calls += 1;
            if s.fail_reads {
                return Err(RawError::from_message("error sending request"));
            }
            Ok(s.messages.len() as u64)
        })
    }

    async fn message(&self, index: u64) -> Result<Message, RawError> {
        self.with(|s| {
            s.message_calls += 1;
            if s.fail_reads {
                return Err(RawError::from_message("error sending request"));
            }
            s.messages
                .get(index as usize)
                .cloned()
                .ok_or_else(|| RawError::from_message("execution reverted: index out of range"))
        })
    }

    async fn post_message(&self, _signer: &PrivateKeySigner, text: &str) -> Result<TxHash, RawError> {
        self.with(|s| {
            if let Some(error) = s.post_error.clone() {
                return Err(error);
            }
            s.next_hash += 1;
            let hash = TxHash::with_last_byte(s.next_hash);
            s.pending.push((hash, text.to_string()));
            Ok(hash)
        })
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<(), RawError> {
        let delay = self.with(|s| s.confirm_delay);
        tokio::time::sleep(delay).await;
        self.with(|s| {
            if let Some(error) = s.confirm_error.clone() {
                return Err(error);
            }
            if let Some(pos) = s.pending.iter().position(|(h, _)| *h == hash) {
                let (_, text) = s.pending.remove(pos);
                let index = s.messages.len() as u64;
                s.messages.push(Message {
                    index,
                    text,
                    author: Address::with_last_byte(0xaa),
                    posted_at: 1_800_000_000,
                });
            }
            Ok(())
        })
    }
}

fn sepolia_config() -> SessionConfig {
    SessionConfig::for_network(Network::Sepolia)
}

fn start(mock: &Arc<MockGuestbook>) -> (SessionHandle, UnboundedReceiver<Notification>) {
    let client: Arc<dyn GuestbookClient> = mock.clone();
    let (handle, notifications, _task) = session::spawn(client, sepolia_config());
    (handle, notifications)
}

fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

fn titled<'a>(notifications: &'a [Notification], title: &str) -> Vec<&'a Notification> {
    notifications.iter().filter(|n| n.title == title).collect()
}

#[tokio::test(start_paused = true)]
async fn loads_count_and_latest_window() {
    let mock = Arc::new(MockGuestbook::new(10));
    let (handle, _rx) = start(&mock);

    let snapshot = handle.wait_for(|s| !s.messages.is_empty()).await.unwrap();
    assert_eq!(snapshot.count, Some(10));
    assert_eq!(snapshot.chain_id, Some(SEPOLIA));
    assert_eq!(snapshot.messages.len(), 8);
    assert_eq!(snapshot.messages.first().unwrap().index, 2);
    assert_eq!(snapshot.messages.last().unwrap().index, 9);
    assert_eq!(snapshot.status_label(), "connect an account");
}

#[tokio::test(start_paused = true)]
async fn empty_guestbook_reads_no_messages() {
    let mock = Arc::new(MockGuestbook::new(0));
    let (handle, _rx) = start(&mock);

    let snapshot = handle.wait_for(|s| s.count.is_some()).await.unwrap();
    assert_eq!(snapshot.count, Some(0));
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert!(handle.snapshot().messages.is_empty());
    assert_eq!(mock.with(|s| s.message_calls), 0);
}

#[tokio::test(start_paused = true)]
async fn post_confirms_and_refreshes() {
    let mock = Arc::new(MockGuestbook::new(3));
    let (handle, mut rx) = start(&mock);
    handle.wait_for(|s| s.messages.len() == 3).await.unwrap();

    handle.connect(PrivateKeySigner::random()).await.unwrap();
    handle.edit_draft("  hello guestbook  ").await.unwrap();
    handle.submit().await.unwrap();
    assert!(matches!(handle.submit().await, Err(MemoError::Busy)));
    assert!(matches!(handle.edit_draft("edited").await, Err(MemoError::Busy)));
    assert_eq!(handle.snapshot().draft, "  hello guestbook  ");

    let settled = handle.wait_settled().await.unwrap();
    let tx = settled.transaction.clone().unwrap();
    assert_eq!(tx.phase, TxPhase::Confirmed);
    assert!(settled.draft.is_empty());

    let refreshed = handle.wait_for(|s| s.messages.len() == 4).await.unwrap();
    assert_eq!(refreshed.count, Some(4));
    assert_eq!(refreshed.messages.last().unwrap().text, "hello guestbook");

    let notes = drain(&mut rx);
    assert_eq!(titled(&notes, "Transaction sent").len(), 1);
    assert_eq!(titled(&notes, "Transaction confirmed").len(), 1);
    assert!(titled(&notes, "Confirmation is taking longer than usual").is_empty());

    // A confirmed write must be dismissed before the next one.
    handle.edit_draft("second").await.unwrap();
    assert!(matches!(handle.submit().await, Err(MemoError::AwaitingDismiss)));
    handle.dismiss().await.unwrap();
    handle.submit().await.unwrap();
    let settled = handle.wait_settled().await.unwrap();
    assert_ne!(settled.transaction.unwrap().hash, tx.hash);
}

#[tokio::test(start_paused = true)]
async fn submit_checks_requirements_in_order() {
    let mock = Arc::new(MockGuestbook::new(1));
    let (handle, _rx) = start(&mock);
    handle.wait_for(|s| s.chain_id.is_some()).await.unwrap();

    handle.edit_draft("hi").await.unwrap();
    assert!(matches!(handle.submit().await, Err(MemoError::NotConnected)));

    handle.connect(PrivateKeySigner::random()).await.unwrap();
    handle.edit_draft("   ").await.unwrap();
    assert!(matches!(handle.submit().await, Err(MemoError::EmptyMessage)));
    assert!(handle.snapshot().transaction.is_none());
}

#[tokio::test(start_paused = true)]
async fn long_input_is_cut_at_the_limit() {
    let mock = Arc::new(MockGuestbook::new(0));
    let (handle, _rx) = start(&mock);

    let outcome = handle.edit_draft("x".repeat(300)).await.unwrap();
    assert!(outcome.truncated);
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.draft_units, 280);
    assert_eq!(snapshot.draft.len(), 280);
}

#[tokio::test(start_paused = true)]
async fn rejected_write_keeps_the_draft() {
    let mock = Arc::new(MockGuestbook::new(0));
    mock.with(|s| s.post_error = Some(RawError::from_message("User rejected the request.")));
    let (handle, mut rx) = start(&mock);
    handle.connect(PrivateKeySigner::random()).await.unwrap();

    handle.edit_draft("gm").await.unwrap();
    handle.submit().await.unwrap();
    let snapshot = handle.wait_for(|s| !s.writing).await.unwrap();
    assert!(snapshot.transaction.is_none());
    assert_eq!(snapshot.draft, "gm");

    let notes = drain(&mut rx);
    let failed = titled(&notes, "Transaction failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].detail.as_deref(),
        Some(FailureKind::UserRejected.to_string().as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn reverted_transaction_fails_and_allows_retry() {
    let mock = Arc::new(MockGuestbook::new(0));
    mock.with(|s| s.confirm_error = Some(RawError::from_message("Transaction reverted")));
    let (handle, _rx) = start(&mock);
    handle.connect(PrivateKeySigner::random()).await.unwrap();

    handle.edit_draft("gm").await.unwrap();
    handle.submit().await.unwrap();
    let snapshot = handle.wait_settled().await.unwrap();
    let tx = snapshot.transaction.unwrap();
    assert_eq!(tx.phase, TxPhase::Failed);
    assert_eq!(tx.failure, Some(FailureKind::Revert("Transaction reverted".into())));
    assert_eq!(snapshot.draft, "gm");

    mock.with(|s| s.confirm_error = None);
    handle.submit().await.unwrap();
    let snapshot = handle.wait_settled().await.unwrap();
    assert_eq!(snapshot.transaction.unwrap().phase, TxPhase::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn slow_confirmation_warns_once() {
    let mock = Arc::new(MockGuestbook::new(0));
    mock.with(|s| s.confirm_delay = Duration::from_secs(120));
    let (handle, mut rx) = start(&mock);
    handle.connect(PrivateKeySigner::random()).await.unwrap();

    handle.edit_draft("slow").await.unwrap();
    handle.submit().await.unwrap();
    let snapshot = handle.wait_settled().await.unwrap();
    let tx = snapshot.transaction.unwrap();
    assert_eq!(tx.phase, TxPhase::Confirmed);
    assert!(tx.timeout_warned);

    let notes = drain(&mut rx);
    let slow = titled(&notes, "Confirmation is taking longer than usual");
    assert_eq!(slow.len(), 1);
    assert!(slow[0].detail.as_deref().unwrap().contains("sepolia.etherscan.io/tx/"));
}

#[tokio::test(start_paused = true)]
async fn read_errors_are_reported_once_per_episode() {
    let mock = Arc::new(MockGuestbook::new(2));
    mock.with(|s| s.fail_reads = true);
    let (handle, mut rx) = start(&mock);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(mock.with(|s| s.count_calls) > 2);
    let notes = drain(&mut rx);
    assert_eq!(titled(&notes, "Failed to read contract state").len(), 1);

    mock.with(|s| s.fail_reads = false);
    handle.wait_for(|s| s.messages.len() == 2).await.unwrap();
    mock.with(|s| s.fail_reads = true);
    tokio::time::sleep(Duration::from_secs(60)).await;

    let notes = drain(&mut rx);
    assert_eq!(titled(&notes, "Failed to read contract state").len(), 1);
    // The last good window stays visible.
    assert_eq!(handle.snapshot().messages.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unconfigured_session_stays_idle() {
    let mock = Arc::new(MockGuestbook::unconfigured());
    let (handle, mut rx) = start(&mock);
    handle.connect(PrivateKeySigner::random()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(mock.with(|s| s.count_calls), 0);
    let notes = drain(&mut rx);
    assert_eq!(titled(&notes, "Contract not configured").len(), 1);

    handle.edit_draft("hi").await.unwrap();
    assert!(matches!(handle.submit().await, Err(MemoError::NotConfigured)));
    assert_eq!(handle.snapshot().status_label(), "contract not configured");
}

#[tokio::test(start_paused = true)]
async fn wrong_chain_blocks_writes() {
    let mock = Arc::new(MockGuestbook {
        chain_id: 1,
        ..MockGuestbook::new(1)
    });
    let (handle, mut rx) = start(&mock);
    handle.connect(PrivateKeySigner::random()).await.unwrap();
    handle.wait_for(|s| s.chain_id == Some(1)).await.unwrap();

    handle.edit_draft("hi").await.unwrap();
    assert!(matches!(
        handle.submit().await,
        Err(MemoError::WrongNetwork { expected: SEPOLIA, actual: 1 })
    ));
    assert_eq!(handle.snapshot().status_label(), "switch to sepolia");
    assert!(!titled(&drain(&mut rx), "Wrong network").is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_chain_read_is_retried_before_writes() {
    let mock = Arc::new(MockGuestbook {
        chain_id: 1,
        ..MockGuestbook::new(1)
    });
    mock.with(|s| s.chain_failures = 3);
    let (handle, mut rx) = start(&mock);
    handle.connect(PrivateKeySigner::random()).await.unwrap();

    let snapshot = handle.wait_for(|s| s.chain_id.is_some()).await.unwrap();
    assert_eq!(snapshot.chain_id, Some(1));
    handle.edit_draft("hi").await.unwrap();
    assert!(matches!(
        handle.submit().await,
        Err(MemoError::WrongNetwork { expected: SEPOLIA, actual: 1 })
    ));
    assert_eq!(titled(&drain(&mut rx), "Failed to read network").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn commands_run_against_the_session() {
    let mock = Arc::new(MockGuestbook::new(2));
    let (handle, _rx) = start(&mock);
    handle.wait_for(|s| s.messages.len() == 2).await.unwrap();

    let out = Command::Count.execute(&handle, false).await.unwrap();
    assert_eq!(out, "2 messages");
    assert!(Command::Address.execute(&handle, false).await.is_err());
    assert!(Command::Connect.execute(&handle, false).await.is_err());

    handle.connect(PrivateKeySigner::random()).await.unwrap();
    let cmd = Command::parse("post hello from a test").unwrap();
    let out = cmd.execute(&handle, false).await.unwrap();
    assert!(out.starts_with("Transaction sent!"));

    handle.wait_settled().await.unwrap();
    handle.wait_for(|s| s.count == Some(3)).await.unwrap();
    // The next post dismisses the confirmed one on its own.
    let out = Command::parse("post again").unwrap().execute(&handle, true).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(json["truncated"], false);
}

#[tokio::test(start_paused = true)]
async fn cached_guestbook_serves_repeat_reads() {
    let cached = CachedGuestbook::new(MockGuestbook::new(4), MessageCache::open_in_memory().unwrap());

    let first = cached.message(2).await.unwrap();
    let again = cached.message(2).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(cached.inner().with(|s| s.message_calls), 1);

    cached.inner().with(|s| s.fail_reads = true);
    assert_eq!(cached.message(2).await.unwrap().text, "entry 2");
    assert!(cached.message(3).await.is_err());
}

fn live_contract() -> Option<Address> {
    parse_contract_address(std::env::var(CONTRACT_ENV).ok().as_deref()).expect("invalid contract address")
}

#[tokio::test]
#[ignore]
async fn sepolia_status() {
    let config = NetworkConfig {
        network: Network::Sepolia,
        custom_url: None,
    };
    let client = EvmGuestbook::new(&config, live_contract(), false).expect("failed to create client");
    let status = client.status().await.expect("failed to query status");
    assert_eq!(status.chain_id, SEPOLIA);
    assert!(status.block_number > 0);
}

#[tokio::test]
#[ignore]
async fn sepolia_reads_latest_messages() {
    let Some(contract) = live_contract() else {
        eprintln!("{CONTRACT_ENV} not set; skipping");
        return;
    };
    let config = NetworkConfig {
        network: Network::Sepolia,
        custom_url: None,
    };
    let client = EvmGuestbook::new(&config, Some(contract), false).expect("failed to create client");
    let count = client.message_count().await.expect("failed to read count");
    if count > 0 {
        let latest = client.message(count - 1).await.expect("failed to read message");
        assert_eq!(latest.index, count - 1);
    }
}
