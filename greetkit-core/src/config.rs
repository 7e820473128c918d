//! Endpoints and tunables of a GreetKit session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::GreetKitError, http_request::Request, merkle_tree::DEFAULT_TREE_DEPTH,
    proof::ProvingKeyRef,
};

/// Address the greeter contract gets on a fresh local Hardhat node.
pub const LOCAL_GREETER_CONTRACT: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

/// Endpoints and parameters of a greeter deployment.
///
/// Every field is optional in JSON; missing fields take the local development defaults.
///
/// ```
/// use greetkit_core::config::GreetKitConfig;
///
/// let config = GreetKitConfig::from_json_str(r#"{ "rpcUrl": "http://node:8545" }"#).unwrap();
/// assert_eq!(config.rpc_url, "http://node:8545");
/// assert_eq!(config.tree_depth, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreetKitConfig {
    /// Serves the identity commitment list as a JSON array of decimal strings.
    pub commitments_url: String,
    /// Verifier endpoint greetings are posted to.
    pub submission_url: String,
    /// Ethereum JSON-RPC endpoint for reading greeting events.
    pub rpc_url: String,
    /// Greeter contract emitting `NewGreeting(bytes32)`.
    pub greeter_contract: String,
    /// Depth of the membership tree the circuit was compiled for.
    pub tree_depth: usize,
    /// Circuit wasm and zkey.
    pub proving_key: ProvingKeyRef,
    /// Timeout for every HTTP request, in milliseconds.
    pub request_timeout_ms: u64,
    /// How often the JSON-RPC node is polled for new greetings, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for GreetKitConfig {
    fn default() -> Self {
        Self {
            commitments_url: "http://localhost:3000/identityCommitments.json".to_string(),
            submission_url: "http://localhost:3000/api/greet".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            greeter_contract: LOCAL_GREETER_CONTRACT.to_string(),
            tree_depth: DEFAULT_TREE_DEPTH,
            proving_key: ProvingKeyRef::default(),
            request_timeout_ms: 5_000,
            poll_interval_ms: 2_000,
        }
    }
}

impl GreetKitConfig {
    /// Parses a JSON configuration.
    ///
    /// # Errors
    /// Returns `GreetKitError::SerializationError` if the JSON is invalid.
    pub fn from_json_str(json: &str) -> Result<Self, GreetKitError> {
        serde_json::from_str(json).map_err(|err| {
            GreetKitError::SerializationError(format!("invalid greetkit config: {err}"))
        })
    }

    /// An HTTP client honoring the configured timeout.
    #[must_use]
    pub fn request(&self) -> Request {
        Request::with_timeout(self.request_timeout())
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Interval between polls for new greeting events.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
