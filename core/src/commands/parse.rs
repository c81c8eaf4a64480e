use anyhow::{bail, Result};

use super::Command;

impl Command {
    /// Parse a command from a raw input string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("No command entered. Type 'help' for a list of commands.");
        }

        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, Some(rest.trim()).filter(|r| !r.is_empty())),
            None => (input, None),
        };

        match cmd.to_lowercase().as_str() {
            "post" | "write" => match rest {
                Some(text) => Ok(Command::Post {
                    text: text.to_string(),
                }),
                None => bail!("Missing message. Usage: post <text>"),
            },

            "messages" | "ls" => Ok(Command::Messages),

            "count" => Ok(Command::Count),

            "status" => Ok(Command::Status),

            "tx" => Ok(Command::Tx),

            "dismiss" => Ok(Command::Dismiss),

            "refresh" => Ok(Command::Refresh),

            "address" | "addr" => Ok(Command::Address),

            "connect" => Ok(Command::Connect),

            "disconnect" => Ok(Command::Disconnect),

            "network" | "net" => Ok(Command::Network {
                target: rest.map(str::to_string),
            }),

            "password" | "passwd" => Ok(Command::Password),

            "help" | "?" => Ok(Command::Help {
                command: rest.map(|s| s.to_lowercase()),
            }),

            "exit" | "quit" | "q" => Ok(Command::Exit),

            other => bail!("Unknown command: '{other}'. Type 'help' for a list of commands."),
        }
    }
}
