//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Challenge-response authentication client and access gate
#[derive(Parser, Debug)]
#[command(name = "challenge-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CHALLENGE_AUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CHALLENGE_AUTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CHALLENGE_AUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an RSA key pair and print the public key
    Keygen(KeygenArgs),

    /// Authenticate against the verifier and print the session
    Auth(ClientArgs),

    /// Check verifier health
    Health(ClientArgs),

    /// Authenticate, then serve a gate-protected endpoint with the token
    Serve {
        /// Verifier connection overrides
        #[command(flatten)]
        client: ClientArgs,

        /// Port to listen on
        #[arg(short, long, env = "CHALLENGE_AUTH_PORT")]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long, env = "CHALLENGE_AUTH_HOST")]
        host: Option<String>,
    },
}

/// Key generation options
#[derive(Args, Debug)]
pub struct KeygenArgs {
    /// Private key output path
    #[arg(long)]
    pub private_key: Option<PathBuf>,

    /// Public key output path
    #[arg(long)]
    pub public_key: Option<PathBuf>,

    /// RSA key size (2048 or 4096)
    #[arg(long)]
    pub bits: Option<usize>,
}

/// Verifier connection options; each overrides the config file
#[derive(Args, Debug, Default)]
pub struct ClientArgs {
    /// Verifier base URL
    #[arg(short, long, env = "CHALLENGE_AUTH_URL")]
    pub url: Option<String>,

    /// Client identifier
    #[arg(long, env = "CHALLENGE_AUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Private key path
    #[arg(long)]
    pub private_key: Option<PathBuf>,

    /// Retries after the first attempt
    #[arg(long)]
    pub retries: Option<u32>,

    /// Pause between attempts in milliseconds
    #[arg(long)]
    pub retry_backoff_ms: Option<u64>,

    /// Comma-separated secret keys to keep (empty = all)
    #[arg(long, value_delimiter = ',')]
    pub secret_keys: Vec<String>,

    /// Repository URL hint
    #[arg(long)]
    pub repo_url: Option<String>,

    /// RPC endpoint hint
    #[arg(long)]
    pub grpc_endpoint: Option<String>,

    /// Request the repository list
    #[arg(long)]
    pub include_repo_list: bool,
}
