#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! `greetkit-core` posts greetings anonymously on behalf of members of a Semaphore group and
//! reads back the public greeting log.
//!
//! A greeting is packed into a single 32-byte word, signed into an anonymous identity, proven to
//! come from a group member with a Groth16 proof, and handed to a verifier that rejects repeat
//! posts within the same round. Signing and proving are capabilities supplied by the host.
//!
//! ```
//! use greetkit_core::{greeting::Age, Greeting};
//!
//! let greeting = Greeting::new("Bob", Age::new(50), "Sup!").unwrap();
//! let word = greeting.encode().unwrap();
//! assert_eq!(Greeting::decode(&word).unwrap(), greeting);
//! ```

pub mod config;
pub mod greeter;
pub mod greeting;
pub mod greeting_log;
pub mod identity;
pub mod logger;
pub mod merkle_tree;
pub mod poseidon;
pub mod proof;
pub mod rpc_events;
pub mod submission;

mod error;
pub use error::GreetKitError;

mod scalar;
pub use scalar::Scalar;

mod http_request;
pub use http_request::Request;

pub use config::GreetKitConfig;
pub use greeter::{GreetProgress, GreetReceipt, Greeter};
pub use greeting::{EncodedGreeting, Greeting};
pub use greeting_log::{EventListener, GreetingLog, GreetingRecord, Subscription};
pub use identity::{ChallengeSigner, Identity, IdentityManager};
pub use merkle_tree::MembershipProof;
pub use proof::{ProofGenerator, Prover};
