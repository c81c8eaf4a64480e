//! Async driver: owns a [`Session`], runs its effects against a
//! [`GuestbookClient`], and publishes snapshots and notifications.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::TxHash;
use alloy::signers::local::PrivateKeySigner;
use futures::future::try_join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{Effect, Event, Session, SessionSnapshot};
use crate::client::GuestbookClient;
use crate::composer::EditOutcome;
use crate::config::SessionConfig;
use crate::error::{MemoError, Result};
use crate::network::Message;
use crate::normalize::RawError;
use crate::notify::Notification;

enum Request {
    EditDraft(String, oneshot::Sender<Result<EditOutcome>>),
    Submit(oneshot::Sender<Result<()>>),
    Dismiss(oneshot::Sender<Result<()>>),
    Connect(PrivateKeySigner, oneshot::Sender<()>),
    Disconnect(oneshot::Sender<()>),
    Refresh(oneshot::Sender<()>),
}

/// Cloneable front door to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<SessionSnapshot>,
    shutdown: mpsc::Sender<()>,
}

/// Start a session task. Notifications arrive on the returned receiver
/// until the session shuts down.
pub fn spawn(
    client: Arc<dyn GuestbookClient>,
    config: SessionConfig,
) -> (SessionHandle, mpsc::UnboundedReceiver<Notification>, JoinHandle<()>) {
    let poll_interval = config.poll_interval;
    let timeout_warning = config.timeout_warning;
    let session = Session::new(config, client.contract());

    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

    let driver = Driver {
        session,
        client,
        signer: None,
        events: event_tx,
        notifications: notify_tx,
        snapshot: snapshot_tx,
        tracking: None,
        timeout_warning,
    };
    let task = tokio::spawn(driver.run(request_rx, event_rx, shutdown_rx, poll_interval));

    let handle = SessionHandle {
        requests: request_tx,
        snapshot: snapshot_rx,
        shutdown: shutdown_tx,
    };
    (handle, notify_rx, task)
}

impl SessionHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(make(tx))
            .map_err(|_| MemoError::SessionClosed)?;
        rx.await.map_err(|_| MemoError::SessionClosed)
    }

    /// Replace the draft. Input beyond the length limit is cut off; edits
    /// are refused with `Busy` while a write is outstanding.
    pub async fn edit_draft(&self, text: impl Into<String>) -> Result<EditOutcome> {
        let text = text.into();
        self.call(|tx| Request::EditDraft(text, tx)).await?
    }

    /// Post the current draft. Returns once the write has been handed off;
    /// its outcome arrives as notifications and snapshot changes.
    pub async fn submit(&self) -> Result<()> {
        self.call(Request::Submit).await?
    }

    pub async fn dismiss(&self) -> Result<()> {
        self.call(Request::Dismiss).await?
    }

    pub async fn connect(&self, signer: PrivateKeySigner) -> Result<()> {
        self.call(|tx| Request::Connect(signer, tx)).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call(Request::Disconnect).await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.call(Request::Refresh).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Wait until the snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| MemoError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// Wait until no write or confirmation is outstanding.
    pub async fn wait_settled(&self) -> Result<SessionSnapshot> {
        self.wait_for(|s| !s.is_busy()).await
    }

    /// Stop the session task. Outstanding remote calls are left to finish
    /// on their own; their results are discarded.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(()).await;
    }
}

struct Driver {
    session: Session,
    client: Arc<dyn GuestbookClient>,
    signer: Option<PrivateKeySigner>,
    events: mpsc::UnboundedSender<Event>,
    notifications: mpsc::UnboundedSender<Notification>,
    snapshot: watch::Sender<SessionSnapshot>,
    tracking: Option<JoinHandle<()>>,
    timeout_warning: Duration,
}

impl Driver {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut shutdown: mpsc::Receiver<()>,
        poll_interval: Duration,
    ) {
        let effects = self.session.start();
        self.apply(effects);
        self.publish();

        let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                Some(event) = events.recv() => {
                    let effects = self.session.handle(event);
                    self.apply(effects);
                    self.publish();
                }
                _ = ticker.tick() => {
                    let effects = self.session.handle(Event::Tick);
                    self.apply(effects);
                    self.publish();
                }
            }
        }

        if let Some(tracking) = self.tracking.take() {
            tracking.abort();
        }
        debug!("session stopped");
    }

    /// Replies go out after the snapshot is published so a caller that
    /// reads the snapshot right after an await sees the new state.
    fn handle_request(&mut self, request: Request) {
        match request {
            Request::EditDraft(text, reply) => {
                let outcome = self.session.edit_draft(&text);
                self.publish();
                let _ = reply.send(outcome);
            }
            Request::Submit(reply) => {
                let result = self.session.submit().map(|effects| self.apply(effects));
                self.publish();
                let _ = reply.send(result);
            }
            Request::Dismiss(reply) => {
                let result = self.session.dismiss();
                self.publish();
                let _ = reply.send(result);
            }
            Request::Connect(signer, reply) => {
                let effects = self.session.connect(signer.address());
                self.signer = Some(signer);
                self.apply(effects);
                self.publish();
                let _ = reply.send(());
            }
            Request::Disconnect(reply) => {
                self.session.disconnect();
                self.signer = None;
                self.publish();
                let _ = reply.send(());
            }
            Request::Refresh(reply) => {
                let effects = self.session.refresh();
                self.apply(effects);
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.session.snapshot());
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Notify(notification) => {
                    debug!(%notification, "notify");
                    let _ = self.notifications.send(notification);
                }
                Effect::ReadChainId => {
                    let client = self.client.clone();
                    self.spawn_call(async move { Event::ChainId(client.chain_id().await) });
                }
                Effect::ReadCount => {
                    let client = self.client.clone();
                    self.spawn_call(async move { Event::Count(client.message_count().await) });
                }
                Effect::ReadWindow(range) => {
                    let client = self.client.clone();
                    self.spawn_call(async move {
                        let result = fetch_window(client.as_ref(), range.clone()).await;
                        Event::Window { range, result }
                    });
                }
                Effect::Post(text) => match self.signer.clone() {
                    Some(signer) => {
                        let client = self.client.clone();
                        self.spawn_call(async move {
                            Event::PostSent(client.post_message(&signer, &text).await)
                        });
                    }
                    None => {
                        let event = Event::PostSent(Err(RawError::from_message(
                            "No account connected",
                        )));
                        queue.extend(self.session.handle(event));
                    }
                },
                Effect::Track(hash) => {
                    self.track(hash);
                    queue.extend(self.session.handle(Event::TrackingStarted(hash)));
                }
            }
        }
    }

    fn spawn_call(&self, call: impl std::future::Future<Output = Event> + Send + 'static) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let _ = events.send(call.await);
        });
    }

    /// Wait for the receipt, raising the slow-confirmation event once if the
    /// threshold passes first. The wait itself is never cut short.
    fn track(&mut self, hash: TxHash) {
        if let Some(previous) = self.tracking.take() {
            previous.abort();
        }
        let client = self.client.clone();
        let events = self.events.clone();
        let warn_after = self.timeout_warning;

        self.tracking = Some(tokio::spawn(async move {
            let wait = client.wait_for_confirmation(hash);
            tokio::pin!(wait);
            let slow = tokio::time::sleep(warn_after);
            tokio::pin!(slow);

            let result = tokio::select! {
                result = &mut wait => result,
                _ = &mut slow => {
                    let _ = events.send(Event::ConfirmationSlow(hash));
                    wait.await
                }
            };
            let event = match result {
                Ok(()) => Event::Confirmed(hash),
                Err(error) => {
                    warn!(%hash, "confirmation failed: {error}");
                    Event::ConfirmationFailed { hash, error }
                }
            };
            let _ = events.send(event);
        }));
    }
}

/// Fetch every index in `range` concurrently; the first failure fails the window.
async fn fetch_window(
    client: &dyn GuestbookClient,
    range: Range<u64>,
) -> std::result::Result<Vec<Message>, RawError> {
    try_join_all(range.map(|index| client.message(index))).await
}
