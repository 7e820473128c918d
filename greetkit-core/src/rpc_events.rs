//! Reads `NewGreeting(bytes32)` events of the greeter contract from an Ethereum JSON-RPC node.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::{keccak256, Address, B256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::{
    error::GreetKitError,
    greeting_log::{GreetingEvent, GreetingEventSource},
    http_request::Request,
};

/// Signature of the event emitted for every accepted greeting.
pub const NEW_GREETING_EVENT: &str = "NewGreeting(bytes32)";

const SUBSCRIPTION_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    data: String,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

struct RpcClient {
    url: String,
    request: Request,
    next_id: AtomicU64,
}

impl RpcClient {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, GreetKitError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .request
            .handle(self.request.post(&self.url).json(&body))
            .await?;
        let status = response.status();
        let text = response.text().await.map_err(|err| GreetKitError::NetworkError {
            url: self.url.clone(),
            status: Some(status.as_u16()),
            error: format!("failed to read {method} response: {err}"),
        })?;

        if !status.is_success() {
            return Err(GreetKitError::NetworkError {
                url: self.url.clone(),
                status: Some(status.as_u16()),
                error: format!("{method} failed with status {status}"),
            });
        }

        let parsed: RpcResponse<T> = serde_json::from_str(&text).map_err(|err| {
            GreetKitError::SerializationError(format!(
                "[JsonRpcEventSource] Failed to parse {method} response: {err}"
            ))
        })?;

        match (parsed.result, parsed.error) {
            (_, Some(error)) => Err(GreetKitError::NetworkError {
                url: self.url.clone(),
                status: Some(status.as_u16()),
                error: format!("{method} error {}: {}", error.code, error.message),
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(GreetKitError::SerializationError(format!(
                "[JsonRpcEventSource] {method} response has neither result nor error"
            ))),
        }
    }

    async fn block_number(&self) -> Result<u64, GreetKitError> {
        let hex: String = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity(&hex)
    }

    async fn logs(
        &self,
        contract: Address,
        topic: B256,
        from_block: u64,
        to_block: Option<u64>,
    ) -> Result<Vec<GreetingEvent>, GreetKitError> {
        let to_block = to_block.map_or_else(
            || "latest".to_string(),
            |block| format!("{block:#x}"),
        );
        let filter = json!([{
            "address": contract.to_string(),
            "topics": [topic.to_string()],
            "fromBlock": format!("{from_block:#x}"),
            "toBlock": to_block,
        }]);

        let logs: Vec<RpcLog> = self.call("eth_getLogs", filter).await?;
        Ok(logs
            .into_iter()
            .filter(|log| !log.removed)
            .filter_map(to_event)
            .collect())
    }
}

fn to_event(log: RpcLog) -> Option<GreetingEvent> {
    let Some(id) = log.transaction_hash else {
        log::debug!("skipping pending greeting log without transaction hash");
        return None;
    };
    // undecodable payloads are passed on as empty data and dropped by the listener
    let data = match hex::decode(log.data.trim_start_matches("0x")) {
        Ok(data) => data,
        Err(err) => {
            log::warn!("greeting log {id} carries non-hex data: {err}");
            Vec::new()
        }
    };
    Some(GreetingEvent { id, data })
}

fn parse_quantity(hex: &str) -> Result<u64, GreetKitError> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|_| GreetKitError::InvalidNumber)
}

/// A [`GreetingEventSource`] backed by `eth_getLogs`.
///
/// History is read from block 0 up to the head observed when the query starts. Live polling
/// resumes at the block after that head, so nothing mined between [`query_history`] and
/// [`subscribe`] is skipped. Without a prior history query, polling starts after the current head.
///
/// Delivery latency is bounded by the poll interval. A failed poll is logged and retried on the
/// next tick; the listener's deduplication absorbs any overlap.
///
/// [`query_history`]: GreetingEventSource::query_history
/// [`subscribe`]: GreetingEventSource::subscribe
pub struct JsonRpcEventSource {
    client: Arc<RpcClient>,
    contract: Address,
    topic: B256,
    poll_interval: Duration,
    history_head: Mutex<Option<u64>>,
}

impl JsonRpcEventSource {
    /// Creates a source for the greeter contract at `contract`.
    ///
    /// # Errors
    /// Returns `GreetKitError::InvalidNumber` if `contract` is not a valid address.
    pub fn new(
        rpc_url: impl Into<String>,
        contract: &str,
        poll_interval: Duration,
        request: Request,
    ) -> Result<Self, GreetKitError> {
        let contract = Address::from_str(contract).map_err(|_| GreetKitError::InvalidNumber)?;
        Ok(Self {
            client: Arc::new(RpcClient {
                url: rpc_url.into(),
                request,
                next_id: AtomicU64::new(1),
            }),
            contract,
            topic: keccak256(NEW_GREETING_EVENT.as_bytes()),
            poll_interval,
            history_head: Mutex::new(None),
        })
    }

    fn history_head(&self) -> MutexGuard<'_, Option<u64>> {
        self.history_head
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GreetingEventSource for JsonRpcEventSource {
    async fn query_history(&self) -> Result<Vec<GreetingEvent>, GreetKitError> {
        let head = self.client.block_number().await?;
        let events = self
            .client
            .logs(self.contract, self.topic, 0, Some(head))
            .await?;
        *self.history_head() = Some(head);
        Ok(events)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<GreetingEvent>, GreetKitError> {
        let history_head = *self.history_head();
        let head = match history_head {
            Some(head) => head,
            None => self.client.block_number().await?,
        };
        let mut next_block = head.saturating_add(1);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let client = Arc::clone(&self.client);
        let contract = self.contract;
        let topic = self.topic;
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tokio::spawn(async move {
            while !tx.is_closed() {
                interval.tick().await;

                let latest = match client.block_number().await {
                    Ok(latest) => latest,
                    Err(err) => {
                        log::warn!("greeting poll failed: {err}");
                        continue;
                    }
                };
                if latest < next_block {
                    continue;
                }

                match client.logs(contract, topic, next_block, Some(latest)).await {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        next_block = latest + 1;
                    }
                    Err(err) => log::warn!("greeting poll failed: {err}"),
                }
            }
        });

        Ok(rx)
    }
}
