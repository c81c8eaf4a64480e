//! Command definitions and parsing for the guestbook REPL and one-shot mode.

mod execute;
mod help;
mod parse;

pub use help::help_text;

use crate::account::Network;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Post a message: post <text>
    Post { text: String },
    /// Show the most recent messages
    Messages,
    /// Show the on-chain message count
    Count,
    /// Show session status
    Status,
    /// Show the tracked transaction
    Tx,
    /// Clear a confirmed or failed transaction
    Dismiss,
    /// Re-read count and messages now
    Refresh,
    /// Show the connected account address
    Address,
    /// Unlock the keystore and connect its account
    Connect,
    /// Forget the connected account for this session
    Disconnect,
    /// Show or switch network: network [sepolia|mainnet|<rpc_url>]
    Network { target: Option<String> },
    /// Change keystore password
    Password,
    /// Print help
    Help { command: Option<String> },
    /// Exit the client
    Exit,
}

impl Command {
    /// Returns a confirmation prompt if this command should ask before executing.
    pub fn confirmation_prompt(&self, network: Network) -> Option<String> {
        match self {
            Command::Post { .. } if network == Network::Mainnet => Some(
                "Post this message on Ethereum mainnet? It is public, permanent, and costs gas."
                    .to_string(),
            ),
            Command::Post { .. } => {
                Some("Post this message on-chain? It is public and permanent.".to_string())
            }
            Command::Password => Some("Change keystore password?".to_string()),
            _ => None,
        }
    }

    /// Commands whose output depends on the first count and window read.
    pub fn reads_guestbook(&self) -> bool {
        matches!(self, Command::Messages | Command::Count | Command::Status)
    }

    /// Commands the shell handles itself because they replace the account
    /// or the client rather than acting on the running session.
    pub fn is_shell_command(&self) -> bool {
        matches!(
            self,
            Command::Connect
                | Command::Disconnect
                | Command::Network { target: Some(_) }
                | Command::Password
                | Command::Exit
        )
    }
}
