use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spout")]
#[command(about = "Session client for a rate-limited token faucet", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "spout.toml")]
    pub config: PathBuf,

    /// JSON-RPC endpoint of the chain hosting the faucet
    #[arg(long, value_name = "URL")]
    pub rpc_url: Option<String>,

    /// Faucet contract address
    #[arg(long, value_name = "ADDRESS")]
    pub faucet: Option<String>,

    /// Hex-encoded private key of the signing identity
    #[arg(long, value_name = "HEX", env = "SPOUT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Path to the data directory
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the session with its HTTP API (default)
    Serve {
        /// Listen address, overrides `api_addr`
        #[arg(long)]
        addr: Option<String>,
    },
    /// Connect and print the faucet state
    Status,
    /// Withdraw tokens from the faucet
    Request {
        /// Decimal token amount, e.g. 20 or 0.5
        amount: String,
    },
    /// Trigger faucet replenishment once the cooldown has elapsed
    AutoMint,
    /// Replenish immediately, ignoring the cooldown (faucet owner only)
    ForceAutoMint,
    /// Withdraw the stored authorization of the signing identity
    Revoke,
    /// Show journaled withdrawals and replenishments
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate a new signing key
    GenerateKey {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
