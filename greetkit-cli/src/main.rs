//! `greetkit` developer CLI.

mod cli;
mod commands;
mod prover;

use clap::Parser;
use cli::{Cli, Commands};
use eyre::Result;

fn init_logging(verbose: bool) {
    let default = if verbose {
        "greetkit=debug,greetkit_core=debug"
    } else {
        "warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.load_config()?;
    tracing::debug!(?config, "resolved configuration");

    match cli.command {
        Commands::Encode {
            name,
            age,
            message,
        } => commands::encode(&name, &age, &message),
        Commands::Decode { word } => commands::decode(&word),
        Commands::Identity { secret } => commands::identity(&secret),
        Commands::NullifierHash {
            secret,
            external_nullifier,
        } => commands::nullifier_hash(&secret, &external_nullifier),
        Commands::MembershipProof { secret } => {
            commands::membership_proof(&config, &secret).await
        }
        Commands::Greet {
            secret,
            name,
            age,
            message,
            snarkjs,
        } => commands::greet(&config, &secret, &name, &age, &message, snarkjs).await,
        Commands::Greetings { follow } => commands::greetings(&config, follow).await,
    }
}
