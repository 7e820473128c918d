use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Result, WrapErr};
use greetkit_core::{
    greeting::{decode as decode_word, EncodedGreeting},
    merkle_tree::{build_proof, HttpMembershipSource, MembershipSource},
    rpc_events::JsonRpcEventSource,
    EventListener, GreetKitConfig, Greeter, Greeting, GreetingLog, Identity, Scalar,
};

use crate::prover::{secret_material, LocalSigner, SnarkjsProver};

pub fn encode(name: &str, age: &str, message: &str) -> Result<()> {
    let word = Greeting::parse(name, age, message)?
        .encode()
        .map_err(|err| eyre::eyre!(err.user_message()))?;
    println!("{}", word.to_hex_string());
    Ok(())
}

pub fn decode(word: &str) -> Result<()> {
    let word = EncodedGreeting::try_from_hex_string(word)?;
    let (name, age, message) = decode_word(&word)?;
    println!("{name} ({age}): {message}");
    Ok(())
}

pub fn identity(secret: &str) -> Result<()> {
    let identity = Identity::from_secret_material(&secret_material(secret)?)?;
    println!("{}", identity.commitment().0);
    Ok(())
}

pub fn nullifier_hash(secret: &str, external_nullifier: &str) -> Result<()> {
    let identity = Identity::from_secret_material(&secret_material(secret)?)?;
    let external_nullifier = Scalar::parse_field_element(external_nullifier)
        .wrap_err("external nullifier must be a field element")?;
    println!("{}", identity.nullifier_hash(external_nullifier)?.to_hex_string());
    Ok(())
}

pub async fn membership_proof(config: &GreetKitConfig, secret: &str) -> Result<()> {
    let identity = Identity::from_secret_material(&secret_material(secret)?)?;
    let source = HttpMembershipSource::new(config.commitments_url.clone(), config.request());
    let commitments = source.fetch_commitments().await?;

    let proof = build_proof(&commitments, &identity.commitment(), config.tree_depth)?;
    println!("{}", serde_json::to_string_pretty(&proof)?);
    Ok(())
}

pub async fn greet(
    config: &GreetKitConfig,
    secret: &str,
    name: &str,
    age: &str,
    message: &str,
    snarkjs: PathBuf,
) -> Result<()> {
    let greeting = Greeting::parse(name, age, message)?;
    let greeter = Greeter::from_config(
        config,
        Arc::new(LocalSigner::new(secret)?),
        Arc::new(SnarkjsProver::new(snarkjs)),
    );

    match greeter.greet(&greeting, |progress| eprintln!("{progress}")).await {
        Ok(receipt) => {
            tracing::info!(
                nullifier_hash = %receipt.nullifier_hash,
                root = %receipt.root,
                "greeting accepted"
            );
            Ok(())
        }
        Err(err) => {
            tracing::debug!("greet failed: {err}");
            Err(eyre::eyre!(err.user_message()))
        }
    }
}

pub async fn greetings(config: &GreetKitConfig, follow: bool) -> Result<()> {
    let source = JsonRpcEventSource::new(
        config.rpc_url.clone(),
        &config.greeter_contract,
        config.poll_interval(),
        config.request(),
    )?;
    let listener = EventListener::new(Arc::new(source), GreetingLog::new());

    for record in listener.load_all().await? {
        println!("{record}");
    }
    if !follow {
        return Ok(());
    }

    let subscription = listener
        .subscribe(|notification| println!("{notification}"))
        .await?;

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for ctrl-c")?;
    subscription.cancel().await;

    let dropped = listener.log().decode_failures();
    if dropped > 0 {
        tracing::warn!("{dropped} greeting events could not be decoded");
    }
    Ok(())
}
