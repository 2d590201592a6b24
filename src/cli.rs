use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{
    ServerConfig, DEFAULT_ALLOWED_ORIGINS, DEFAULT_HEARTBEAT_SECS, DEFAULT_HOST, DEFAULT_PORT,
};

const LONG_ABOUT: &str = r#"
Signal Relay - WebSocket signaling for WebRTC peers

Peers connect to /ws/signaling and must first register:
  {"type":"register","id":"<client-id>"}

After that, offer / answer / ice-candidate / test messages are forwarded:
  • with a "target" field → only to the peer registered under that id
  • without a target      → to every other connected peer

Any other message is echoed back to its sender. Payloads are relayed
byte-for-byte and never stored.

Environment:
  SIGNAL_RELAY_HOST, SIGNAL_RELAY_PORT, SIGNAL_RELAY_ALLOWED_ORIGINS,
  SIGNAL_RELAY_HEARTBEAT_SECS, RUST_LOG
"#;

#[derive(Parser, Clone, Debug)]
#[command(name = "signal-relay")]
#[command(about = "WebSocket signaling relay for WebRTC offers, answers and ICE candidates")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write logs to this file instead of stdout
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run the signaling relay
    Serve(ServeArgs),
}

/// Listener settings; a flag beats its environment variable, which beats the default
#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// IP address to bind
    #[arg(long, env = "SIGNAL_RELAY_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "SIGNAL_RELAY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Origin allowed by CORS; repeat or comma-separate for several
    #[arg(
        long = "allow-origin",
        value_name = "ORIGIN",
        env = "SIGNAL_RELAY_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values = DEFAULT_ALLOWED_ORIGINS
    )]
    pub allow_origins: Vec<String>,

    /// Seconds between keep-alive pings
    #[arg(long, env = "SIGNAL_RELAY_HEARTBEAT_SECS", default_value_t = DEFAULT_HEARTBEAT_SECS)]
    pub heartbeat_secs: u64,
}

impl ServeArgs {
    pub fn server_config(&self) -> crate::error::Result<ServerConfig> {
        ServerConfig::new(
            &self.host,
            self.port,
            &self.allow_origins,
            self.heartbeat_secs,
        )
    }
}
