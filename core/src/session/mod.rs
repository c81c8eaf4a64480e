//! Guestbook session state machine.
//!
//! `Session` is pure: it folds [`Event`]s into state and answers with
//! [`Effect`]s for the driver to carry out. All remote calls, timers and
//! channels live in [`driver`]; nothing here awaits.

mod driver;

pub use driver::{spawn, SessionHandle};

use std::ops::Range;

use alloy::primitives::{Address, TxHash};
use tracing::{debug, info, warn};

use crate::composer::{Draft, EditOutcome};
use crate::config::SessionConfig;
use crate::display;
use crate::error::{MemoError, Result};
use crate::network::Message;
use crate::normalize::{classify, RawError};
use crate::notify::Notification;
use crate::reconcile::{read_window, ErrorEpisode, ReadSlot};
pub use crate::tracker::{PendingTransaction, TxPhase};
use crate::tracker::Tracker;

/// Results of remote calls and timers, fed back into the session.
#[derive(Debug, Clone)]
pub enum Event {
    Tick,
    ChainId(std::result::Result<u64, RawError>),
    Count(std::result::Result<u64, RawError>),
    Window {
        range: Range<u64>,
        result: std::result::Result<Vec<Message>, RawError>,
    },
    PostSent(std::result::Result<TxHash, RawError>),
    /// The driver started waiting on the receipt.
    TrackingStarted(TxHash),
    Confirmed(TxHash),
    ConfirmationFailed { hash: TxHash, error: RawError },
    ConfirmationSlow(TxHash),
}

/// Work the driver performs on the session's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ReadChainId,
    ReadCount,
    ReadWindow(Range<u64>),
    Post(String),
    Track(TxHash),
    Notify(Notification),
}

/// Where the post-confirmation count read stands. The window refresh that
/// follows a confirmation is chained to that read, not to whichever count
/// read happens to land first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ConfirmRefresh {
    #[default]
    None,
    /// Queued behind a count read that was already in flight.
    Queued,
    Issued,
}

/// Read-only view of the session published after every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub contract: Option<Address>,
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub expected_chain_id: Option<u64>,
    pub network_name: String,
    pub count: Option<u64>,
    /// Current window, oldest first.
    pub messages: Vec<Message>,
    pub draft: String,
    pub draft_units: usize,
    pub max_units: usize,
    /// A write has been handed to the signer and not answered yet.
    pub writing: bool,
    pub transaction: Option<PendingTransaction>,
    pub explorer_url: Option<String>,
    pub window_error: Option<String>,
}

impl SessionSnapshot {
    pub fn is_configured(&self) -> bool {
        self.contract.is_some()
    }

    pub fn wrong_network(&self) -> bool {
        matches!((self.chain_id, self.expected_chain_id), (Some(a), Some(e)) if a != e)
    }

    /// A write or confirmation is outstanding.
    pub fn is_busy(&self) -> bool {
        self.writing
            || matches!(
                self.transaction.as_ref().map(|tx| tx.phase),
                Some(TxPhase::Submitted | TxPhase::Confirming)
            )
    }

    /// What the post action would do right now.
    pub fn status_label(&self) -> String {
        if !self.is_configured() {
            "contract not configured".to_string()
        } else if self.account.is_none() {
            "connect an account".to_string()
        } else if self.wrong_network() {
            format!("switch to {}", self.network_name)
        } else if self.writing {
            "awaiting signature".to_string()
        } else if self.is_busy() {
            "confirming on-chain".to_string()
        } else {
            "ready".to_string()
        }
    }
}

pub struct Session {
    config: SessionConfig,
    contract: Option<Address>,
    account: Option<Address>,
    chain_id: Option<u64>,
    count: Option<u64>,
    messages: Vec<Message>,
    draft: Draft,
    tracker: Tracker,
    writing: bool,
    chain_slot: ReadSlot,
    count_slot: ReadSlot,
    window_slot: ReadSlot,
    chain_errors: ErrorEpisode,
    count_errors: ErrorEpisode,
    window_errors: ErrorEpisode,
    window_error: Option<String>,
    confirm_refresh: ConfirmRefresh,
}

impl Session {
    pub fn new(config: SessionConfig, contract: Option<Address>) -> Self {
        let draft = Draft::new(config.max_message_units);
        Self {
            config,
            contract,
            account: None,
            chain_id: None,
            count: None,
            messages: Vec::new(),
            draft,
            tracker: Tracker::default(),
            writing: false,
            chain_slot: ReadSlot::default(),
            count_slot: ReadSlot::default(),
            window_slot: ReadSlot::default(),
            chain_errors: ErrorEpisode::default(),
            count_errors: ErrorEpisode::default(),
            window_errors: ErrorEpisode::default(),
            window_error: None,
            confirm_refresh: ConfirmRefresh::None,
        }
    }

    /// Initial reads. An unconfigured session issues no remote calls.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.contract.is_none() {
            warn!("no contract configured; session is read-only and idle");
            return vec![Effect::Notify(
                Notification::warning("Contract not configured")
                    .with_detail(MemoError::NotConfigured.to_string()),
            )];
        }
        let mut effects: Vec<Effect> = self.request_chain_id().into_iter().collect();
        effects.extend(self.request_count());
        effects
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            contract: self.contract,
            account: self.account,
            chain_id: self.chain_id,
            expected_chain_id: self.config.expected_chain_id,
            network_name: self.config.network_name.clone(),
            count: self.count,
            messages: self.messages.clone(),
            draft: self.draft.text().to_string(),
            draft_units: self.draft.units(),
            max_units: self.draft.max_units(),
            writing: self.writing,
            transaction: self.tracker.current().cloned(),
            explorer_url: self.config.explorer_url.clone(),
            window_error: self.window_error.clone(),
        }
    }

    // --- user intents -------------------------------------------------

    /// Replace the draft. Rejected while a write or confirmation is outstanding.
    pub fn edit_draft(&mut self, text: &str) -> Result<EditOutcome> {
        if self.writing || self.tracker.is_busy() {
            return Err(MemoError::Busy);
        }
        Ok(self.draft.set(text))
    }

    pub fn connect(&mut self, account: Address) -> Vec<Effect> {
        info!(%account, "account connected");
        self.account = Some(account);
        if self.contract.is_none() {
            return Vec::new();
        }
        self.request_chain_id().into_iter().collect()
    }

    pub fn disconnect(&mut self) {
        if let Some(account) = self.account.take() {
            info!(%account, "account disconnected");
        }
    }

    /// Validate and hand the trimmed draft to the writer.
    /// Checks run in a fixed order so the first unmet requirement is reported.
    pub fn submit(&mut self) -> Result<Vec<Effect>> {
        if self.contract.is_none() {
            return Err(MemoError::NotConfigured);
        }
        if self.account.is_none() {
            return Err(MemoError::NotConnected);
        }
        let text = self
            .draft
            .submittable()
            .ok_or(MemoError::EmptyMessage)?
            .to_string();
        if let (Some(expected), Some(actual)) = (self.config.expected_chain_id, self.chain_id) {
            if expected != actual {
                return Err(MemoError::WrongNetwork { expected, actual });
            }
        }
        if self.writing {
            return Err(MemoError::Busy);
        }
        self.tracker.ensure_ready()?;

        self.writing = true;
        debug!(units = self.draft.units(), "submitting message");
        Ok(vec![Effect::Post(text)])
    }

    /// Clear a settled transaction so the next one can be written.
    pub fn dismiss(&mut self) -> Result<()> {
        self.tracker.dismiss()
    }

    /// Manual refresh of count (and, through it, the window).
    pub fn refresh(&mut self) -> Vec<Effect> {
        if self.contract.is_none() {
            return Vec::new();
        }
        let mut effects: Vec<Effect> = self.chain_retry().into_iter().collect();
        effects.extend(self.request_count());
        effects.extend(self.request_window());
        effects
    }

    // --- remote results -----------------------------------------------

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Tick => self.on_tick(),
            Event::ChainId(result) => self.on_chain_id(result),
            Event::Count(result) => self.on_count(result),
            Event::Window { range, result } => self.on_window(range, result),
            Event::PostSent(result) => self.on_post_sent(result),
            Event::TrackingStarted(hash) => {
                self.tracker.begin_confirming(hash);
                Vec::new()
            }
            Event::Confirmed(hash) => self.on_confirmed(hash),
            Event::ConfirmationFailed { hash, error } => self.on_confirmation_failed(hash, error),
            Event::ConfirmationSlow(hash) => self.on_confirmation_slow(hash),
        }
    }

    fn on_tick(&mut self) -> Vec<Effect> {
        if self.contract.is_none() {
            self.chain_errors.success();
            self.count_errors.success();
            self.window_errors.success();
            return Vec::new();
        }
        let mut effects: Vec<Effect> = self.chain_retry().into_iter().collect();
        if self.count_slot.try_start() {
            effects.push(Effect::ReadCount);
        }
        let range = self.current_window();
        if !range.is_empty() && self.window_slot.try_start() {
            effects.push(Effect::ReadWindow(range));
        }
        effects
    }

    fn on_chain_id(&mut self, result: std::result::Result<u64, RawError>) -> Vec<Effect> {
        // Chain reads are never queued, so there is nothing to reissue.
        self.chain_slot.finish();
        match result {
            Ok(id) => {
                self.chain_errors.success();
                self.chain_id = Some(id);
                match self.config.expected_chain_id {
                    Some(expected) if expected != id => {
                        warn!(expected, actual = id, "endpoint is on the wrong chain");
                        vec![Effect::Notify(
                            Notification::warning("Wrong network").with_detail(format!(
                                "Connected to chain {id}, the contract is on {}. Use 'network {}' to switch.",
                                self.config.network_name, self.config.network_name
                            )),
                        )]
                    }
                    _ => Vec::new(),
                }
            }
            Err(error) => {
                let kind = classify(&error);
                warn!("chain id read failed: {error}");
                if !self.chain_errors.failure() {
                    return Vec::new();
                }
                vec![Effect::Notify(
                    Notification::error("Failed to read network").with_detail(kind.to_string()),
                )]
            }
        }
    }

    fn on_count(&mut self, result: std::result::Result<u64, RawError>) -> Vec<Effect> {
        let mut effects = Vec::new();
        let forced = self.confirm_refresh == ConfirmRefresh::Issued;
        if forced {
            self.confirm_refresh = ConfirmRefresh::None;
        }

        match result {
            Ok(count) => {
                self.count_errors.success();
                let changed = self.count != Some(count);
                self.count = Some(count);
                if changed || forced {
                    debug!(count, changed, forced, "refreshing message window");
                    effects.extend(self.request_window());
                }
            }
            Err(error) => {
                // Keep the refresh armed for the next successful read.
                if forced {
                    self.confirm_refresh = ConfirmRefresh::Issued;
                }
                warn!("count read failed: {error}");
                if self.count_errors.failure() {
                    effects.push(Effect::Notify(
                        Notification::error("Failed to read contract state")
                            .with_detail(classify(&error).to_string()),
                    ));
                }
            }
        }

        if self.count_slot.finish() {
            if self.confirm_refresh == ConfirmRefresh::Queued {
                self.confirm_refresh = ConfirmRefresh::Issued;
            }
            effects.push(Effect::ReadCount);
        }
        effects
    }

    fn on_window(
        &mut self,
        range: Range<u64>,
        result: std::result::Result<Vec<Message>, RawError>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        match result {
            Ok(messages) => {
                self.window_errors.success();
                self.window_error = None;
                if range == self.current_window() {
                    self.messages = messages;
                } else {
                    debug!(?range, "dropping stale window");
                }
            }
            Err(error) => {
                let kind = classify(&error);
                warn!(?range, "window read failed: {error}");
                self.window_error = Some(kind.to_string());
                if self.window_errors.failure() {
                    effects.push(Effect::Notify(
                        Notification::error("Failed to read messages").with_detail(kind.to_string()),
                    ));
                }
            }
        }

        if self.window_slot.finish() {
            let range = self.current_window();
            if range.is_empty() {
                self.window_slot.reset();
            } else {
                effects.push(Effect::ReadWindow(range));
            }
        }
        effects
    }

    fn on_post_sent(&mut self, result: std::result::Result<TxHash, RawError>) -> Vec<Effect> {
        self.writing = false;
        match result {
            Ok(hash) => {
                let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
                if let Err(e) = self.tracker.submitted(hash, now) {
                    // Unreachable while submit() guards the tracker; log rather than lose the hash.
                    warn!(%hash, "untracked transaction: {e}");
                    return Vec::new();
                }
                info!(%hash, "transaction sent");
                vec![
                    Effect::Notify(
                        Notification::info("Transaction sent").with_detail(display::short_hash(&hash)),
                    ),
                    Effect::Notify(
                        Notification::loading("Waiting for confirmation")
                            .with_detail(display::short_hash(&hash)),
                    ),
                    Effect::Track(hash),
                ]
            }
            Err(error) => {
                let kind = classify(&error);
                warn!(kind = kind.label(), "write failed: {error}");
                vec![Effect::Notify(
                    Notification::error("Transaction failed").with_detail(kind.to_string()),
                )]
            }
        }
    }

    fn on_confirmed(&mut self, hash: TxHash) -> Vec<Effect> {
        if !self.tracker.confirm(hash) {
            debug!(%hash, "ignoring confirmation for untracked transaction");
            return Vec::new();
        }
        info!(%hash, "transaction confirmed");
        self.draft.clear();

        let mut effects = vec![Effect::Notify(
            Notification::success("Transaction confirmed").with_detail(display::short_hash(&hash)),
        )];
        if self.count_slot.request() {
            self.confirm_refresh = ConfirmRefresh::Issued;
            effects.push(Effect::ReadCount);
        } else {
            self.confirm_refresh = ConfirmRefresh::Queued;
        }
        effects
    }

    fn on_confirmation_failed(&mut self, hash: TxHash, error: RawError) -> Vec<Effect> {
        let kind = classify(&error);
        if !self.tracker.fail(hash, kind.clone()) {
            debug!(%hash, "ignoring failure for untracked transaction");
            return Vec::new();
        }
        warn!(%hash, kind = kind.label(), "transaction failed: {error}");
        vec![Effect::Notify(
            Notification::error("Transaction failed").with_detail(kind.to_string()),
        )]
    }

    fn on_confirmation_slow(&mut self, hash: TxHash) -> Vec<Effect> {
        if !self.tracker.warn_timeout(hash) {
            return Vec::new();
        }
        let detail = match &self.config.explorer_url {
            Some(explorer) => format!(
                "Check the transaction on the block explorer: {}",
                display::explorer_tx_url(explorer, &hash)
            ),
            None => format!(
                "Check transaction {} on a block explorer.",
                display::short_hash(&hash)
            ),
        };
        warn!(%hash, "confirmation is slow");
        vec![Effect::Notify(
            Notification::warning("Confirmation is taking longer than usual").with_detail(detail),
        )]
    }

    // --- reads ----------------------------------------------------------

    fn current_window(&self) -> Range<u64> {
        read_window(self.count.unwrap_or(0), self.config.page_size)
    }

    fn request_chain_id(&mut self) -> Option<Effect> {
        self.chain_slot.try_start().then_some(Effect::ReadChainId)
    }

    /// Keep asking for the chain id until one read succeeds; without it the
    /// network check on submit has nothing to compare against.
    fn chain_retry(&mut self) -> Option<Effect> {
        if self.chain_id.is_some() {
            return None;
        }
        self.request_chain_id()
    }

    fn request_count(&mut self) -> Option<Effect> {
        self.count_slot.request().then_some(Effect::ReadCount)
    }

    fn request_window(&mut self) -> Option<Effect> {
        let range = self.current_window();
        if range.is_empty() {
            self.messages.clear();
            return None;
        }
        self.window_slot.request().then_some(Effect::ReadWindow(range))
    }
}
