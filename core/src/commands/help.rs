#[must_use]
pub fn help_text(command: Option<&str>) -> String {
    match command {
        Some("post") | Some("write") => {
            "post <text>\n  Post a message to the guestbook (at most 280 characters).\n  Longer input is cut off. Waits for the transaction to be sent;\n  confirmation is reported when it arrives.\n  Alias: write".to_string()
        }
        Some("messages") | Some("ls") => {
            "messages\n  Show the most recent messages, newest first.\n  Alias: ls".to_string()
        }
        Some("count") => "count\n  Show how many messages the contract holds.".to_string(),
        Some("status") => {
            "status\n  Show contract, account, network, message count and the\n  state of the last transaction.".to_string()
        }
        Some("tx") => {
            "tx\n  Show the tracked transaction with an explorer link.".to_string()
        }
        Some("dismiss") => {
            "dismiss\n  Clear a confirmed or failed transaction.\n  A confirmed message must be dismissed before writing another.".to_string()
        }
        Some("refresh") => "refresh\n  Re-read the message count and messages now.".to_string(),
        Some("address") | Some("addr") => {
            "address\n  Show the connected account's address.\n  Alias: addr".to_string()
        }
        Some("connect") => {
            "connect\n  Unlock the keystore and connect its account.".to_string()
        }
        Some("disconnect") => {
            "disconnect\n  Disconnect the account. Reading keeps working.".to_string()
        }
        Some("network") | Some("net") => {
            "network [sepolia|mainnet|<rpc_url>]\n  Show the current network, or switch to another one.\n  The choice is saved in the keystore.\n  Alias: net".to_string()
        }
        Some("password") | Some("passwd") => {
            "password\n  Change the keystore's encryption password.\n  Alias: passwd".to_string()
        }
        Some("exit") | Some("quit") | Some("q") => {
            "exit\n  Exit the client.\n  Aliases: quit, q".to_string()
        }
        Some(other) => format!("Unknown command: '{other}'. Type 'help' for a list."),
        None => {
            "Available commands:\n\
             \n\
             \x20 post             Post a message\n\
             \x20 messages         Show recent messages\n\
             \x20 count            Show the message count\n\
             \x20 status           Show session status\n\
             \x20 tx               Show the tracked transaction\n\
             \x20 dismiss          Clear a settled transaction\n\
             \x20 refresh          Re-read messages now\n\
             \x20 address          Show account address\n\
             \x20 connect          Connect the keystore account\n\
             \x20 disconnect       Disconnect the account\n\
             \x20 network          Show or switch network\n\
             \x20 password         Change keystore password\n\
             \x20 help [cmd]       Show help for a command\n\
             \x20 exit             Exit\n\
             \n\
             Type 'help <command>' for detailed help on a specific command."
                .to_string()
        }
    }
}
