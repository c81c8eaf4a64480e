use crate::{start_session, Cli, Started};
/// REPL shell — Reedline-based interactive guestbook session.
use anyhow::{Context, Result};
use memo_core::session::SessionHandle;
use memo_core::{list_keystores, Account, Command, NetworkConfig};
use reedline::{
    DefaultCompleter, DefaultPrompt, DefaultPromptSegment, ExternalPrinter, Reedline, Signal,
};
use std::path::Path;
use tokio::task::JoinHandle;
use zeroize::{Zeroize, Zeroizing};

/// The running session plus the task relaying its notifications to the prompt.
struct LiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
    relay: JoinHandle<()>,
}

impl LiveSession {
    fn start(cli: &Cli, config: &NetworkConfig, printer: &ExternalPrinter<String>) -> Result<Self> {
        let Started {
            handle,
            mut notifications,
            task,
        } = start_session(cli, config)?;
        let printer = printer.clone();
        let relay = tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                if printer.print(notification.to_string()).is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            handle,
            task,
            relay,
        })
    }

    async fn stop(self) {
        self.handle.shutdown().await;
        let _ = self.task.await;
        self.relay.abort();
    }
}

/// Unlocked account and the password it was opened with, kept so network
/// changes can be saved back to the keystore.
struct Unlocked {
    account: Account,
    password: Zeroizing<Vec<u8>>,
}

pub async fn run_repl(cli: &Cli) -> Result<()> {
    println!("0xMemo v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let keystore_dir = cli.keystore_dir()?;
    std::fs::create_dir_all(&keystore_dir).context("Failed to create keystore directory")?;

    let keystores = list_keystores(&keystore_dir);
    if !keystores.is_empty() {
        println!("Existing keystores:");
        for name in &keystores {
            println!("  - {name}");
        }
        println!();
    }

    let keystore_path = cli.keystore_path()?;
    let keystore_name = &cli.keystore;

    let mut unlocked = if keystore_path.exists() {
        println!("Opening keystore '{keystore_name}'...");
        Some(open_keystore(&keystore_path)?)
    } else {
        println!("Keystore '{keystore_name}' not found.");
        match prompt_action()? {
            KeystoreAction::Quit => {
                println!("Goodbye.");
                return Ok(());
            }
            KeystoreAction::ReadOnly => None,
            action => Some(create_keystore(cli, &keystore_path, action)?),
        }
    };

    let mut network_config = match &unlocked {
        Some(u) => cli.resolve_network_config(u.account.network_config()),
        None => cli.network_config(),
    };

    let printer = ExternalPrinter::<String>::default();
    let mut live = LiveSession::start(cli, &network_config, &printer)?;
    if let Some(u) = &unlocked {
        live.handle.connect(u.account.signer()).await?;
    }

    println!("Network: {}", network_config.network);
    match &unlocked {
        Some(u) => println!("Account ready. Address: {}", u.account.address()),
        None => println!("No account connected. Reading only; use 'connect' to post."),
    }
    if !live.handle.snapshot().is_configured() {
        println!("No guestbook contract configured. Set MEMO_CONTRACT_ADDRESS or use --contract.");
    }
    println!("Type 'help' for a list of commands.");
    println!();

    let mut prompt = make_prompt(unlocked.as_ref());

    let commands: Vec<String> = [
        "post", "write", "messages", "ls", "count", "status", "tx", "dismiss", "refresh",
        "address", "addr", "connect", "disconnect", "network", "net", "password", "passwd",
        "help", "exit", "quit", "q",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    let completer = Box::new(DefaultCompleter::new(commands));
    let mut line_editor = Reedline::create()
        .with_completer(completer)
        .with_external_printer(printer.clone());

    loop {
        let signal = tokio::task::block_in_place(|| line_editor.read_line(&prompt));
        match signal {
            Ok(Signal::Success(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match Command::parse(line) {
                    Ok(Command::Exit) => {
                        println!("Goodbye.");
                        break;
                    }
                    Ok(Command::Connect) => {
                        if unlocked.is_some() {
                            println!("Already connected.");
                            continue;
                        }
                        if !keystore_path.exists() {
                            eprintln!(
                                "Error: keystore '{keystore_name}' does not exist. Restart memo to create it."
                            );
                            continue;
                        }
                        match open_keystore(&keystore_path) {
                            Ok(u) => {
                                live.handle.connect(u.account.signer()).await?;
                                println!("Connected. Address: {}", u.account.address());
                                if u.account.network_config() != &network_config {
                                    println!(
                                        "Note: this keystore prefers {}. Use 'network {}' to switch.",
                                        u.account.network_config().network,
                                        u.account.network_config().network
                                    );
                                }
                                unlocked = Some(u);
                                prompt = make_prompt(unlocked.as_ref());
                            }
                            Err(e) => eprintln!("Error: {e:#}"),
                        }
                    }
                    Ok(Command::Disconnect) => {
                        if unlocked.take().is_none() {
                            println!("No account connected.");
                            continue;
                        }
                        live.handle.disconnect().await?;
                        prompt = make_prompt(None);
                        println!("Disconnected. Reading continues.");
                    }
                    Ok(Command::Network {
                        target: Some(target),
                    }) => {
                        let new_config = match NetworkConfig::from_target(&target) {
                            Ok(config) => config,
                            Err(e) => {
                                eprintln!("Error: {e}");
                                continue;
                            }
                        };
                        if live.handle.snapshot().is_busy() {
                            eprintln!(
                                "Error: wait for the pending transaction to settle before switching networks."
                            );
                            continue;
                        }
                        let next = match LiveSession::start(cli, &new_config, &printer) {
                            Ok(next) => next,
                            Err(e) => {
                                eprintln!("Error: {e:#}");
                                continue;
                            }
                        };
                        std::mem::replace(&mut live, next).stop().await;
                        network_config = new_config;

                        if let Some(u) = &mut unlocked {
                            live.handle.connect(u.account.signer()).await?;
                            u.account.set_network_config(network_config.clone());
                            if let Err(e) = u.account.save(&u.password) {
                                eprintln!("Error saving keystore: {e:#}");
                            }
                        }
                        println!("Switched to {}.", network_config.network);
                    }
                    Ok(Command::Password) => {
                        if !keystore_path.exists() {
                            eprintln!("Error: keystore '{keystore_name}' does not exist.");
                            continue;
                        }
                        if !prompt_confirm("Change keystore password?") {
                            println!("Cancelled.");
                            continue;
                        }
                        let old_pw = Zeroizing::new(
                            rpassword::prompt_password("Current password: ").unwrap_or_default(),
                        );
                        let new_pw = match prompt_new_password() {
                            Ok(pw) => pw,
                            Err(e) => {
                                eprintln!("Error: {e}");
                                continue;
                            }
                        };
                        println!("Changing password...");
                        match Account::change_password(
                            &keystore_path,
                            old_pw.as_bytes(),
                            new_pw.as_bytes(),
                        ) {
                            Ok(()) => {
                                if let Some(u) = &mut unlocked {
                                    u.password = Zeroizing::new(new_pw.as_bytes().to_vec());
                                }
                                println!("Password changed.");
                            }
                            Err(e) => eprintln!("Error: {e}"),
                        }
                    }
                    Ok(cmd) => {
                        if let Some(prompt_msg) = cmd.confirmation_prompt(network_config.network) {
                            if !prompt_confirm(&prompt_msg) {
                                println!("Cancelled.");
                                continue;
                            }
                        }
                        match cmd.execute(&live.handle, false).await {
                            Ok(output) => {
                                if !output.is_empty() {
                                    println!("{output}");
                                }
                            }
                            Err(e) => {
                                eprintln!("Error: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        eprintln!("{e}");
                    }
                }
            }
            Ok(Signal::CtrlD) | Ok(Signal::CtrlC) => {
                println!("Goodbye.");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        }
    }

    live.stop().await;
    Ok(())
}

fn make_prompt(unlocked: Option<&Unlocked>) -> DefaultPrompt {
    let label = match unlocked {
        Some(u) => format!("[memo {}]", u.account.short_address()),
        None => "[memo read-only]".to_string(),
    };
    DefaultPrompt::new(DefaultPromptSegment::Basic(label), DefaultPromptSegment::Empty)
}

fn open_keystore(path: &Path) -> Result<Unlocked> {
    let password = Zeroizing::new(
        rpassword::prompt_password("Password: ").context("Failed to read password")?,
    );
    let account = Account::open(path, password.as_bytes())?;
    Ok(Unlocked {
        account,
        password: Zeroizing::new(password.as_bytes().to_vec()),
    })
}

fn create_keystore(cli: &Cli, path: &Path, action: KeystoreAction) -> Result<Unlocked> {
    let password = prompt_new_password()?;
    let network_config = cli.network_config();

    let account = match action {
        KeystoreAction::Import => {
            let key = prompt_private_key()?;
            let account =
                Account::import(path.to_path_buf(), password.as_bytes(), &key, network_config)?;
            println!();
            println!("Key imported.");
            account
        }
        _ => {
            let account = Account::create_new(path.to_path_buf(), password.as_bytes(), network_config)?;
            println!();
            println!("New keystore created in {}", path.display());
            println!("Fund this address with a little ETH to pay for posting:");
            println!("  {}", account.address());
            account
        }
    };
    println!();
    Ok(Unlocked {
        account,
        password: Zeroizing::new(password.as_bytes().to_vec()),
    })
}

#[derive(Clone, Copy)]
enum KeystoreAction {
    CreateNew,
    Import,
    ReadOnly,
    Quit,
}

fn prompt_action() -> Result<KeystoreAction> {
    println!("  1) Create a new key");
    println!("  2) Import a private key");
    println!("  3) Continue without an account (read-only)");
    println!("  4) Quit");
    loop {
        let mut input = String::new();
        print!("Choice [1/2/3/4]: ");
        use std::io::Write;
        std::io::stdout().flush()?;
        std::io::stdin().read_line(&mut input)?;
        match input.trim() {
            "1" | "" => return Ok(KeystoreAction::CreateNew),
            "2" => return Ok(KeystoreAction::Import),
            "3" => return Ok(KeystoreAction::ReadOnly),
            "4" | "q" => return Ok(KeystoreAction::Quit),
            _ => println!("Please enter a valid option."),
        }
    }
}

fn prompt_new_password() -> Result<Zeroizing<String>> {
    loop {
        let pass1 = Zeroizing::new(
            rpassword::prompt_password("New password: ").context("Failed to read password")?,
        );
        let pass2 = Zeroizing::new(
            rpassword::prompt_password("Confirm password: ").context("Failed to read password")?,
        );
        if *pass1 != *pass2 {
            println!("Passwords do not match. Try again.");
            continue;
        }
        if pass1.len() < 4 {
            eprintln!("WARNING: This password is very short. A weak password offers little protection if the keystore file is stolen.");
        }
        return Ok(pass1);
    }
}

fn prompt_confirm(prompt: &str) -> bool {
    use std::io::Write;
    print!("{prompt} [y/N]: ");
    std::io::stdout().flush().ok();
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).is_ok() && input.trim().eq_ignore_ascii_case("y")
}

fn prompt_private_key() -> Result<Zeroizing<String>> {
    println!("Enter the account's private key (64 hex characters, 0x prefix optional):");
    let mut input =
        rpassword::prompt_password("Private key: ").context("Failed to read private key")?;
    let trimmed = Zeroizing::new(input.trim().to_string());
    input.zeroize();
    Ok(trimmed)
}
