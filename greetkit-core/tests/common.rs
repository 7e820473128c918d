#![allow(dead_code, missing_docs)]

//! Common test utilities shared across integration tests.

use std::sync::Mutex;

use async_trait::async_trait;
use greetkit_core::{
    greeting::Age,
    greeting_log::{GreetingEvent, GreetingEventSource},
    identity::{ChallengeSigner, SignerError},
    poseidon::poseidon2,
    proof::{Groth16Proof, ProofOutput, Prover, ProverError, ProvingKeyRef, PublicSignals, Witness},
    GreetKitError, Greeting, Scalar,
};
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Signs by echoing a fixed secret, like a wallet that always produces the same signature.
pub struct FixedSigner(pub Vec<u8>);

#[async_trait]
impl ChallengeSigner for FixedSigner {
    async fn sign_challenge(&self, _challenge: &str) -> Result<Vec<u8>, SignerError> {
        Ok(self.0.clone())
    }
}

/// Stands in for a Groth16 backend: returns a well-formed proof and the public signals a real
/// circuit would output for the witness.
pub struct EchoProver;

impl Prover for EchoProver {
    fn prove(
        &self,
        witness: &Witness,
        _proving_key: &ProvingKeyRef,
    ) -> Result<ProofOutput, ProverError> {
        let nullifier_hash = poseidon2(witness.external_nullifier, witness.identity_nullifier)
            .map_err(|err| ProverError::Backend(err.to_string()))?;

        let s = |value: u64| Scalar::from(value);
        Ok(ProofOutput {
            proof: Groth16Proof {
                pi_a: vec![s(11), s(12), s(1)],
                pi_b: vec![vec![s(21), s(22)], vec![s(23), s(24)], vec![s(1), s(0)]],
                pi_c: vec![s(31), s(32), s(1)],
                protocol: "groth16".to_string(),
            },
            public_signals: PublicSignals {
                root: witness.root,
                nullifier_hash,
                signal_hash: witness.signal_hash,
                external_nullifier: witness.external_nullifier,
            },
        })
    }
}

/// An event source fed by the test through a channel.
pub struct ChannelSource {
    history: Vec<GreetingEvent>,
    live: Mutex<Option<mpsc::Receiver<GreetingEvent>>>,
}

impl ChannelSource {
    pub fn new(history: Vec<GreetingEvent>) -> (Self, mpsc::Sender<GreetingEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                history,
                live: Mutex::new(Some(rx)),
            },
            tx,
        )
    }
}

#[async_trait]
impl GreetingEventSource for ChannelSource {
    async fn query_history(&self) -> Result<Vec<GreetingEvent>, GreetKitError> {
        Ok(self.history.clone())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<GreetingEvent>, GreetKitError> {
        self.live
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| GreetKitError::NetworkError {
                url: "channel".to_string(),
                status: None,
                error: "already subscribed".to_string(),
            })
    }
}

pub fn greeting_event(id: &str, name: &str, age: u16, message: &str) -> GreetingEvent {
    let word = Greeting::new(name, Age::new(age), message)
        .unwrap()
        .encode()
        .unwrap();
    GreetingEvent {
        id: id.to_string(),
        data: word.as_bytes().to_vec(),
    }
}

/// Renders commitments the way the membership endpoint serves them.
pub fn commitments_json(commitments: &[Scalar]) -> String {
    let decimal: Vec<String> = commitments.iter().map(|c| c.0.to_string()).collect();
    serde_json::to_string(&decimal).unwrap()
}
