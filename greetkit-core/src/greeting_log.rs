//! The read path: the set of accepted greetings as observed on the verifier's public,
//! append-only event stream.
//!
//! [`EventListener`] is the only writer of a [`GreetingLog`]. It moves the log through
//! `Uninitialized -> Loaded -> Listening`. Events are deduplicated by their identifier, so a
//! re-delivered event neither adds a record nor fires a second notification.
//!
//! Events that fail to decode are dropped. They are counted and logged so drift between the
//! encoder and this decoder shows up without bringing the listener down. Chain reorganizations
//! are not reconciled.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    error::GreetKitError,
    greeting::{decode, EncodedGreeting},
};

/// A raw event as delivered by the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingEvent {
    /// Opaque per-event identifier (the transaction hash).
    pub id: String,
    /// Event payload, expected to be one 32-byte greeting word.
    pub data: Vec<u8>,
}

/// A decoded, accepted greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingRecord {
    /// Identifier of the submission that produced this greeting.
    pub id: String,
    /// Display name of the sender.
    pub name: String,
    /// Age of the sender as written in the event. Not range checked.
    pub age: i64,
    /// The greeting text.
    pub message: String,
}

impl GreetingRecord {
    fn decode(event: &GreetingEvent) -> Result<Self, GreetKitError> {
        let word = EncodedGreeting::from_slice(&event.data)?;
        let (name, age, message) = decode(&word)?;
        Ok(Self {
            id: event.id.clone(),
            name,
            age,
            message,
        })
    }
}

impl fmt::Display for GreetingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.age, self.message)
    }
}

/// The announcement for a newly observed greeting. Only the name is carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingNotification {
    /// Display name of the sender.
    pub name: String,
}

impl fmt::Display for GreetingNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "New greeting from {}", self.name)
    }
}

/// A public, append-only stream of greeting events.
#[async_trait]
pub trait GreetingEventSource: Send + Sync {
    /// All historical events, in discovery order.
    async fn query_history(&self) -> Result<Vec<GreetingEvent>, GreetKitError>;

    /// Starts delivering new events. The stream ends when the sender side is dropped.
    async fn subscribe(&self) -> Result<mpsc::Receiver<GreetingEvent>, GreetKitError>;
}

/// Lifecycle of a [`GreetingLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum LogPhase {
    /// Nothing loaded yet.
    Uninitialized,
    /// History loaded.
    Loaded,
    /// History loaded and a live subscription is running.
    Listening,
}

#[derive(Debug)]
struct LogState {
    phase: LogPhase,
    records: Vec<GreetingRecord>,
    seen: HashSet<String>,
}

impl LogState {
    /// Appends unless the id is already known. Returns whether it was appended.
    fn append(&mut self, record: GreetingRecord) -> bool {
        if !self.seen.insert(record.id.clone()) {
            return false;
        }
        self.records.push(record);
        true
    }
}

/// The session's view of accepted greetings. Cloning shares the same underlying set.
#[derive(Debug, Clone)]
pub struct GreetingLog {
    state: Arc<Mutex<LogState>>,
    decode_failures: Arc<AtomicU64>,
}

impl GreetingLog {
    /// Creates an empty, uninitialized log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                phase: LogPhase::Uninitialized,
                records: Vec::new(),
                seen: HashSet::new(),
            })),
            decode_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the records, in observation order.
    #[must_use]
    pub fn records(&self) -> Vec<GreetingRecord> {
        self.lock().records.clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Whether no records have been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> LogPhase {
        self.lock().phase
    }

    /// Number of events dropped because they could not be decoded.
    #[must_use]
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        // a panic while holding the lock cannot leave the state half-written
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn decode(&self, event: &GreetingEvent) -> Option<GreetingRecord> {
        match GreetingRecord::decode(event) {
            Ok(record) => Some(record),
            Err(err) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("dropping undecodable greeting event {}: {err}", event.id);
                None
            }
        }
    }
}

impl Default for GreetingLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds a [`GreetingLog`] from a [`GreetingEventSource`].
pub struct EventListener {
    source: Arc<dyn GreetingEventSource>,
    log: GreetingLog,
}

impl EventListener {
    /// Creates a listener writing into `log`.
    #[must_use]
    pub fn new(source: Arc<dyn GreetingEventSource>, log: GreetingLog) -> Self {
        Self { source, log }
    }

    /// The log this listener writes to.
    #[must_use]
    pub const fn log(&self) -> &GreetingLog {
        &self.log
    }

    /// Fetches the full history once and loads it into the log.
    ///
    /// # Errors
    /// Returns the source's error if the history cannot be fetched. Undecodable events are not
    /// errors.
    pub async fn load_all(&self) -> Result<Vec<GreetingRecord>, GreetKitError> {
        let events = self.source.query_history().await?;
        let decoded: Vec<GreetingRecord> = events
            .iter()
            .filter_map(|event| self.log.decode(event))
            .collect();

        let mut state = self.log.lock();
        for record in decoded {
            state.append(record);
        }
        if state.phase == LogPhase::Uninitialized {
            state.phase = LogPhase::Loaded;
        }
        log::info!(
            "loaded {} greetings ({} dropped)",
            state.records.len(),
            self.log.decode_failures()
        );
        Ok(state.records.clone())
    }

    /// Starts listening for new greetings, loading the history first if that has not happened.
    ///
    /// `on_new_record` is called exactly once for every event whose id was not seen before,
    /// carrying only the sender's name.
    ///
    /// # Errors
    /// Returns the source's error if loading or subscribing fails.
    pub async fn subscribe<F>(&self, on_new_record: F) -> Result<Subscription, GreetKitError>
    where
        F: Fn(GreetingNotification) + Send + 'static,
    {
        if self.log.phase() == LogPhase::Uninitialized {
            self.load_all().await?;
        }

        let mut events = self.source.subscribe().await?;
        self.log.lock().phase = LogPhase::Listening;

        let greeting_log = self.log.clone();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = &mut cancel_rx => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };

                let Some(record) = greeting_log.decode(&event) else {
                    continue;
                };
                let notification = GreetingNotification {
                    name: record.name.clone(),
                };

                let appended = greeting_log.lock().append(record);
                if appended {
                    log::debug!("observed new greeting {}", event.id);
                    on_new_record(notification);
                }
            }

            let mut state = greeting_log.lock();
            if state.phase == LogPhase::Listening {
                state.phase = LogPhase::Loaded;
            }
        });

        Ok(Subscription {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }
}

/// Handle to a running subscription. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stops the subscription and waits for the listener task to wind down.
    pub async fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.join().await;
    }

    /// Waits until the event stream ends on its own.
    pub async fn finished(mut self) {
        self.join().await;
    }

    /// Whether the listener task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                log::error!("greeting listener task failed: {err}");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}
