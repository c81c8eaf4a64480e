mod repl;

use anyhow::{bail, Context, Result};
use clap::Parser;
use memo_core::client::GuestbookClient;
use memo_core::config::{parse_contract_address, SessionConfig, CONTRACT_ENV};
use memo_core::session::{self, SessionHandle, SessionSnapshot};
use memo_core::{
    validate_keystore_name, Account, Address, CachedGuestbook, Command, EvmGuestbook, Level,
    MessageCache, Network, NetworkConfig, Notification,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "memo", about = "0xMemo: a public guestbook on Ethereum", version)]
pub(crate) struct Cli {
    /// Keystore name (default: "default")
    #[arg(long, default_value = "default")]
    keystore: String,

    /// Keystore directory (default: platform data dir + /0xmemo)
    #[arg(long)]
    keystore_dir: Option<PathBuf>,

    /// Read password from stdin (for scripting)
    #[arg(long)]
    password_stdin: bool,

    /// Run a single command and exit
    #[arg(long)]
    cmd: Option<String>,

    /// Use Sepolia (default)
    #[arg(long)]
    sepolia: bool,

    /// Use Ethereum mainnet
    #[arg(long)]
    mainnet: bool,

    /// Custom JSON-RPC URL
    #[arg(long)]
    rpc: Option<String>,

    /// Guestbook contract address
    #[arg(long, env = CONTRACT_ENV)]
    contract: Option<String>,

    /// Output in JSON format (useful with --cmd)
    #[arg(long)]
    json: bool,

    /// Allow connecting to non-HTTPS RPC URLs
    #[arg(long)]
    insecure: bool,

    /// Log session activity to stderr (RUST_LOG takes precedence)
    #[arg(long, short)]
    verbose: bool,

    /// Do not read or write the local message cache
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn keystore_dir(&self) -> Result<PathBuf> {
        match &self.keystore_dir {
            Some(dir) => Ok(dir.clone()),
            None => memo_core::data_dir()
                .context("Cannot determine data directory. Use --keystore-dir."),
        }
    }

    fn keystore_path(&self) -> Result<PathBuf> {
        validate_keystore_name(&self.keystore)?;
        Ok(self.keystore_dir()?.join(format!("{}.keystore", self.keystore)))
    }

    fn network_config(&self) -> NetworkConfig {
        if let Some(url) = &self.rpc {
            NetworkConfig::custom(url.clone())
        } else if self.mainnet {
            NetworkConfig {
                network: Network::Mainnet,
                custom_url: None,
            }
        } else {
            NetworkConfig {
                network: Network::Sepolia,
                custom_url: None,
            }
        }
    }

    fn has_explicit_network_flags(&self) -> bool {
        self.sepolia || self.mainnet || self.rpc.is_some()
    }

    fn validate_network_flags(&self) -> Result<()> {
        let count = self.sepolia as u8 + self.mainnet as u8 + self.rpc.is_some() as u8;
        if count > 1 {
            bail!("Conflicting network flags. Use only one of --sepolia, --mainnet, or --rpc.");
        }
        Ok(())
    }

    /// Prefer explicit CLI flags over the keystore's stored network.
    fn resolve_network_config(&self, stored: &NetworkConfig) -> NetworkConfig {
        if self.has_explicit_network_flags() {
            let cli_config = self.network_config();
            if cli_config != *stored {
                eprintln!(
                    "Warning: CLI network flag ({}) overrides keystore's stored network ({})",
                    cli_config.network, stored.network
                );
            }
            cli_config
        } else {
            stored.clone()
        }
    }

    fn contract_address(&self) -> Result<Option<Address>> {
        parse_contract_address(self.contract.as_deref())
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "memo=debug,memo_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn read_password_stdin() -> Result<Zeroizing<String>> {
    let mut password = String::new();
    std::io::stdin()
        .read_line(&mut password)
        .context("Failed to read password from stdin")?;
    let trimmed = password
        .trim_end_matches('\n')
        .trim_end_matches('\r')
        .to_string();
    use zeroize::Zeroize;
    password.zeroize();
    Ok(Zeroizing::new(trimmed))
}

/// A running session and the task that drives it.
pub(crate) struct Started {
    pub handle: SessionHandle,
    pub notifications: UnboundedReceiver<Notification>,
    pub task: JoinHandle<()>,
}

/// Build the guestbook client for `config` and spawn a session over it.
pub(crate) fn start_session(cli: &Cli, config: &NetworkConfig) -> Result<Started> {
    let contract = cli.contract_address()?;
    let guestbook = EvmGuestbook::new(config, contract, cli.insecure)?;

    let client: Arc<dyn GuestbookClient> = if cli.no_cache {
        Arc::new(guestbook)
    } else {
        match MessageCache::open() {
            Ok(cache) => Arc::new(CachedGuestbook::new(guestbook, cache)),
            Err(e) => {
                warn!("message cache unavailable, reading from the node only: {e:#}");
                Arc::new(guestbook)
            }
        }
    };

    let (handle, notifications, task) =
        session::spawn(client, SessionConfig::for_network(config.network));
    Ok(Started {
        handle,
        notifications,
        task,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.validate_network_flags()?;

    if let Some(cmd_str) = &cli.cmd {
        run_oneshot(&cli, cmd_str).await
    } else {
        repl::run_repl(&cli).await
    }
}

async fn run_oneshot(cli: &Cli, cmd_str: &str) -> Result<()> {
    let command = Command::parse(cmd_str)?;
    if command == Command::Exit {
        return Ok(());
    }

    // Reading the guestbook needs no key; only unlock when the command signs
    // or reports the account.
    let account = if matches!(command, Command::Post { .. } | Command::Address) {
        Some(unlock_account(cli)?)
    } else {
        None
    };
    let config = match &account {
        Some(account) => cli.resolve_network_config(account.network_config()),
        None => cli.network_config(),
    };

    let Started {
        handle,
        mut notifications,
        task,
    } = start_session(cli, &config)?;
    if let Some(account) = &account {
        handle.connect(account.signer()).await?;
    }

    let result = run_command(&command, &handle, &mut notifications, cli.json).await;

    handle.shutdown().await;
    let _ = task.await;
    result
}

async fn run_command(
    command: &Command,
    handle: &SessionHandle,
    notifications: &mut UnboundedReceiver<Notification>,
    json: bool,
) -> Result<()> {
    if command.reads_guestbook() {
        wait_until(handle, notifications, |s| {
            !s.is_configured()
                || s.count.is_some_and(|count| {
                    count == 0 || !s.messages.is_empty() || s.window_error.is_some()
                })
        })
        .await?;
    } else if matches!(command, Command::Post { .. }) {
        // Writes need the endpoint's chain id for the network check.
        wait_until(handle, notifications, |s| !s.is_configured() || s.chain_id.is_some()).await?;
    }

    let output = command.execute(handle, json).await?;
    if !output.is_empty() {
        println!("{output}");
    }

    if matches!(command, Command::Post { .. }) {
        let settled = handle.wait_settled();
        tokio::pin!(settled);
        loop {
            tokio::select! {
                snapshot = &mut settled => {
                    snapshot?;
                    break;
                }
                Some(notification) = notifications.recv() => eprintln!("{notification}"),
            }
        }
    }
    while let Ok(notification) = notifications.try_recv() {
        eprintln!("{notification}");
    }
    Ok(())
}

/// Wait until the snapshot satisfies `ready`, relaying notifications to
/// stderr. A failed read ends the wait with its notification as the error.
async fn wait_until(
    handle: &SessionHandle,
    notifications: &mut UnboundedReceiver<Notification>,
    ready: impl FnMut(&SessionSnapshot) -> bool,
) -> Result<()> {
    let loaded = handle.wait_for(ready);
    tokio::pin!(loaded);
    loop {
        tokio::select! {
            snapshot = &mut loaded => {
                snapshot?;
                return Ok(());
            }
            Some(notification) = notifications.recv() => {
                if notification.level == Level::Error {
                    bail!("{notification}");
                }
                eprintln!("{notification}");
            }
        }
    }
}

fn unlock_account(cli: &Cli) -> Result<Account> {
    let path = cli.keystore_path()?;
    if !path.exists() {
        bail!(
            "Keystore not found: {}. Create one first by running memo without --cmd.",
            path.display()
        );
    }
    let password = if cli.password_stdin {
        read_password_stdin()?
    } else {
        Zeroizing::new(rpassword::prompt_password("Password: ").context("Failed to read password")?)
    };
    Account::open(&path, password.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["memo"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn defaults_to_sepolia() {
        let parsed = cli(&[]);
        assert_eq!(parsed.network_config().network, Network::Sepolia);
        assert!(!parsed.has_explicit_network_flags());
    }

    #[test]
    fn rpc_flag_selects_custom_network() {
        let config = cli(&["--rpc", "https://rpc.example"]).network_config();
        assert_eq!(config.network, Network::Custom);
        assert_eq!(config.custom_url.as_deref(), Some("https://rpc.example"));
    }

    #[test]
    fn conflicting_network_flags() {
        assert!(cli(&["--mainnet", "--sepolia"]).validate_network_flags().is_err());
        assert!(cli(&["--mainnet"]).validate_network_flags().is_ok());
    }

    #[test]
    fn stored_network_is_kept_without_flags() {
        let stored = NetworkConfig {
            network: Network::Mainnet,
            custom_url: None,
        };
        assert_eq!(cli(&[]).resolve_network_config(&stored), stored);
        assert_eq!(
            cli(&["--sepolia"]).resolve_network_config(&stored).network,
            Network::Sepolia
        );
    }

    #[test]
    fn keystore_path_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let dir_arg = dir.path().to_string_lossy().to_string();
        let ok = cli(&["--keystore-dir", &dir_arg, "--keystore", "alice"]);
        assert_eq!(ok.keystore_path().unwrap(), dir.path().join("alice.keystore"));
        let bad = cli(&["--keystore-dir", &dir_arg, "--keystore", "../alice"]);
        assert!(bad.keystore_path().is_err());
    }

    #[test]
    fn contract_flag_is_parsed() {
        let zero = cli(&["--contract", "0x0000000000000000000000000000000000000000"]);
        assert_eq!(zero.contract_address().unwrap(), None);
        let garbage = cli(&["--contract", "nonsense"]);
        assert!(garbage.contract_address().is_err());
    }
}
