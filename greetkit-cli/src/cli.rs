use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::{Result, WrapErr};
use greetkit_core::GreetKitConfig;

#[derive(Debug, Parser)]
#[command(name = "greetkit", version, about = "Post and read anonymous greetings")]
pub struct Cli {
    /// JSON configuration file. Missing fields use local development defaults.
    #[arg(long, global = true, env = "GREETKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides `commitmentsUrl`.
    #[arg(long, global = true, env = "GREETKIT_COMMITMENTS_URL")]
    pub commitments_url: Option<String>,

    /// Overrides `submissionUrl`.
    #[arg(long, global = true, env = "GREETKIT_SUBMISSION_URL")]
    pub submission_url: Option<String>,

    /// Overrides `rpcUrl`.
    #[arg(long, global = true, env = "GREETKIT_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Overrides `greeterContract`.
    #[arg(long, global = true, env = "GREETKIT_CONTRACT")]
    pub contract: Option<String>,

    /// Debug logging for greetkit crates (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Packs a greeting into its 32-byte word.
    Encode {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
        #[arg(long)]
        message: String,
    },
    /// Unpacks a 32-byte greeting word given as hex.
    Decode { word: String },
    /// Derives a Semaphore identity from secret material and prints its commitment.
    Identity {
        /// Signature over the identity challenge (hex with `0x`, otherwise raw text).
        #[arg(long, env = "GREETKIT_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Computes the nullifier hash of an identity for a round.
    NullifierHash {
        #[arg(long, env = "GREETKIT_SECRET", hide_env_values = true)]
        secret: String,
        /// Round scope, decimal or `0x` hex.
        #[arg(long)]
        external_nullifier: String,
    },
    /// Fetches the membership list and prints the identity's membership proof as JSON.
    MembershipProof {
        #[arg(long, env = "GREETKIT_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Posts a greeting anonymously, proving with the `snarkjs` CLI.
    Greet {
        #[arg(long, env = "GREETKIT_SECRET", hide_env_values = true)]
        secret: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
        #[arg(long)]
        message: String,
        /// `snarkjs` executable.
        #[arg(long, default_value = "snarkjs")]
        snarkjs: PathBuf,
    },
    /// Prints all greetings posted so far.
    Greetings {
        /// Keeps running and announces new greetings until interrupted.
        #[arg(long)]
        follow: bool,
    },
}

impl Cli {
    /// Reads the configuration file, if any, and applies command line overrides.
    pub fn load_config(&self) -> Result<GreetKitConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                GreetKitConfig::from_json_str(&json)?
            }
            None => GreetKitConfig::default(),
        };

        if let Some(url) = &self.commitments_url {
            config.commitments_url.clone_from(url);
        }
        if let Some(url) = &self.submission_url {
            config.submission_url.clone_from(url);
        }
        if let Some(url) = &self.rpc_url {
            config.rpc_url.clone_from(url);
        }
        if let Some(contract) = &self.contract {
            config.greeter_contract.clone_from(contract);
        }
        Ok(config)
    }
}
