/// SQLite-backed message cache, shared across contracts and networks.
///
/// Guestbook entries never change once written, so a fetched message can be
/// served from disk on every later window read. Keyed by (chain id, contract,
/// index) so one DB serves every deployment.
use std::path::{Path, PathBuf};

use alloy::primitives::{Address, TxHash};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::client::GuestbookClient;
use crate::network::Message;
use crate::normalize::RawError;

pub struct MessageCache {
    conn: Connection,
}

/// Default DB location: platform data directory + `0xmemo/messages.db`
/// (Linux: `~/.local/share`, macOS: `~/Library/Application Support`)
fn default_db_path() -> Result<PathBuf> {
    Ok(crate::data_dir()?.join("messages.db"))
}

fn to_sql(value: u64) -> Result<i64> {
    i64::try_from(value).context("Value too large for the message cache")
}

impl MessageCache {
    /// Open (or create) the shared message cache in the data directory.
    pub fn open() -> Result<Self> {
        Self::open_at(&default_db_path()?)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create cache directory")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        let conn = Connection::open(path).context("Failed to open message cache database")?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Open an in-memory cache (for tests and `--no-cache` runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS messages (
                chain_id    INTEGER NOT NULL,
                contract    TEXT    NOT NULL,
                idx         INTEGER NOT NULL,
                text        TEXT    NOT NULL,
                author      TEXT    NOT NULL,
                posted_at   INTEGER NOT NULL,
                PRIMARY KEY (chain_id, contract, idx)
            );",
            )
            .context("Failed to initialize cache schema")?;
        Ok(())
    }

    pub fn get(&self, chain_id: u64, contract: &Address, index: u64) -> Result<Option<Message>> {
        let row = self
            .conn
            .query_row(
                "SELECT text, author, posted_at FROM messages
                 WHERE chain_id = ?1 AND contract = ?2 AND idx = ?3",
                params![to_sql(chain_id)?, contract.to_string(), to_sql(index)?],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query message cache")?;

        let Some((text, author, posted_at)) = row else {
            return Ok(None);
        };
        let author: Address = author
            .parse()
            .with_context(|| format!("Corrupt author address in cache: '{author}'"))?;
        Ok(Some(Message {
            index,
            text,
            author,
            posted_at: u64::try_from(posted_at).unwrap_or_default(),
        }))
    }

    pub fn insert(&self, chain_id: u64, contract: &Address, message: &Message) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO messages (chain_id, contract, idx, text, author, posted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    to_sql(chain_id)?,
                    contract.to_string(),
                    to_sql(message.index)?,
                    message.text,
                    message.author.to_string(),
                    to_sql(message.posted_at)?,
                ],
            )
            .context("Failed to insert message")?;
        Ok(())
    }
}

/// Client decorator that answers `message(index)` from the cache when it
/// can and stores whatever it fetches. Cache failures are logged and never
/// fail the read.
pub struct CachedGuestbook<C> {
    inner: C,
    cache: Mutex<MessageCache>,
    chain_id: OnceCell<u64>,
}

impl<C: GuestbookClient> CachedGuestbook<C> {
    pub fn new(inner: C, cache: MessageCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
            chain_id: OnceCell::new(),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn cache_key(&self) -> Option<(u64, Address)> {
        let contract = self.inner.contract()?;
        let chain_id = self
            .chain_id
            .get_or_try_init(|| self.inner.chain_id())
            .await
            .ok()?;
        Some((*chain_id, contract))
    }
}

#[async_trait]
impl<C: GuestbookClient> GuestbookClient for CachedGuestbook<C> {
    fn contract(&self) -> Option<Address> {
        self.inner.contract()
    }

    async fn chain_id(&self) -> Result<u64, RawError> {
        self.inner.chain_id().await
    }

    async fn message_count(&self) -> Result<u64, RawError> {
        self.inner.message_count().await
    }

    async fn message(&self, index: u64) -> Result<Message, RawError> {
        let key = self.cache_key().await;
        if let Some((chain_id, contract)) = key {
            match self.cache.lock().await.get(chain_id, &contract, index) {
                Ok(Some(hit)) => {
                    debug!(index, "message cache hit");
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => warn!(index, "message cache read failed: {e:#}"),
            }
        }

        let message = self.inner.message(index).await?;
        if let Some((chain_id, contract)) = key {
            if let Err(e) = self.cache.lock().await.insert(chain_id, &contract, &message) {
                warn!(index, "message cache write failed: {e:#}");
            }
        }
        Ok(message)
    }

    async fn post_message(&self, signer: &PrivateKeySigner, text: &str) -> Result<TxHash, RawError> {
        self.inner.post_message(signer, text).await
    }

    async fn wait_for_confirmation(&self, hash: TxHash) -> Result<(), RawError> {
        self.inner.wait_for_confirmation(hash).await
    }
}
