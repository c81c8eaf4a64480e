use std::path::PathBuf;

use anyhow::Context;

pub mod account;
pub mod cache;
pub mod client;
pub mod commands;
pub mod composer;
pub mod config;
pub mod display;
pub mod error;
pub mod keystore_file;
pub mod network;
pub mod normalize;
pub mod notify;
pub mod reconcile;
pub mod session;
pub mod tracker;

pub use account::{Account, Network, NetworkConfig};
pub use cache::{CachedGuestbook, MessageCache};
pub use client::GuestbookClient;
pub use commands::Command;
pub use config::SessionConfig;
pub use error::MemoError;
pub use network::{EvmGuestbook, Message};
pub use normalize::{classify, FailureKind, RawError};
pub use notify::{Level, Notification};
pub use session::{SessionHandle, SessionSnapshot, TxPhase};

pub use alloy::primitives::{Address, TxHash};
pub use alloy::signers::local::PrivateKeySigner;

/// Reject keystore names containing path separators or traversal sequences.
pub fn validate_keystore_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        anyhow::bail!("Keystore name cannot be empty.");
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        anyhow::bail!("Invalid keystore name '{name}'. Must not contain '/', '\\', or '..'.");
    }
    Ok(())
}

/// List keystore names (file stems) in a directory, sorted.
pub fn list_keystores(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "keystore"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
        .collect();
    names.sort();
    names
}

/// XDG-compliant data directory for keystores and the message cache.
/// Linux: `~/.local/share/0xmemo/`, macOS: `~/Library/Application Support/0xmemo/`
pub fn data_dir() -> anyhow::Result<PathBuf> {
    let dir = dirs::data_dir()
        .context("Cannot determine data directory")?
        .join("0xmemo");
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystore_names() {
        assert!(validate_keystore_name("default").is_ok());
        assert!(validate_keystore_name("").is_err());
        assert!(validate_keystore_name("../etc").is_err());
        assert!(validate_keystore_name("a/b").is_err());
    }

    #[test]
    fn lists_only_keystores() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.keystore"), b"x").unwrap();
        std::fs::write(dir.path().join("a.keystore"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(list_keystores(dir.path()), vec!["a", "b"]);
        assert!(list_keystores(&dir.path().join("missing")).is_empty());
    }
}
