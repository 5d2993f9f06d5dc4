//! CLI command definitions and argument parsing

use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use sealink_core::{ErrorKind, HttpTransport};

use crate::config::{CliOverrides, Config};
use crate::exchange::{chat, send_one, show_identity};
use crate::terminal::TerminalUi;
use crate::ExitCode;

/// sealink client - signed handshake and encrypted messages
#[derive(Parser, Debug)]
#[command(name = "sealink-client")]
#[command(version, about = "sealink client - signed handshake and encrypted messages")]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Server base URL
    #[arg(long, env = "SEALINK_SERVER_URL", global = true)]
    pub server: Option<String>,

    /// Cipher suite, e.g. ed25519+x25519-box+aes256gcm
    #[arg(long, global = true)]
    pub suite: Option<String>,

    /// Base64 server signing key; any other key is refused
    #[arg(long = "pin-server-key", global = true)]
    pub pin_server_key: Option<String>,

    /// Round-trip timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug mode (protocol-level tracing)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and verify the server identity and print its key
    Identity,
    /// Handshake, show the greeting and send one message
    Send {
        /// Message to send; read from stdin when omitted
        message: Option<String>,
    },
    /// Send each line from stdin and show what the server stored
    Chat,
}

impl Cli {
    /// Overrides taken from flags
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            server_url: self.server.clone(),
            suite: self.suite.clone(),
            pinned_key: self.pin_server_key.clone(),
            timeout_seconds: self.timeout,
            log_level: if self.debug {
                Some("debug".to_string())
            } else if self.verbose {
                Some("info".to_string())
            } else {
                None
            },
        }
    }

    /// Execute the CLI command with a pre-loaded configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let handshake = match config.handshake_config() {
            Ok(handshake) => handshake,
            Err(e) => {
                eprintln!("Error: {e}");
                return Ok(ExitCode::InvalidInput);
            }
        };

        let transport = match HttpTransport::new(config.server.url.clone()) {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                eprintln!("Error: {e}");
                return Ok(ExitCode::from_kind(ErrorKind::Transport));
            }
        };

        let input = BufReader::new(std::io::stdin());
        let output = std::io::stdout();

        let code = match self.command {
            Commands::Identity => {
                let mut out = output;
                show_identity(transport.as_ref(), &handshake, &mut out).await
            }
            Commands::Send { message } => {
                let mut ui = match message {
                    Some(message) => TerminalUi::with_message(input, output, message),
                    None => TerminalUi::new(input, output),
                };
                send_one(transport, handshake, &mut ui).await
            }
            Commands::Chat => {
                let mut ui = TerminalUi::new(input, output).prompting();
                chat(transport, handshake, &mut ui).await
            }
        };
        Ok(code)
    }
}
