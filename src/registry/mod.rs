//! Stream registry for live audio relay
//!
//! The registry maps stream names to channels. A channel takes chunks from one
//! producer, keeps every byte for the recording, and fans each chunk out to its
//! listeners' private queues.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Name,  │
//!                     │   StreamChannel {       │
//!                     │     buffer,             │
//!                     │     listeners,          │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Producer]              [Listener]              [Listener]
//!    POST /stream/data       receive()               receive()
//!         │                       │                       │
//!         └──► channel.write() ──► queue.push() ──► HTTP body
//! ```
//!
//! # Zero-Copy Fan-out
//!
//! `bytes::Bytes` is reference counted, so every listener queue shares the
//! allocation of the chunk that was written. Only the recording buffer copies.

pub mod channel;
pub mod config;
pub mod error;
pub mod listener;
pub mod store;

pub use channel::{ChannelState, ChannelStats, StopOutcome, StreamChannel};
pub use config::{OverflowPolicy, RegistryConfig};
pub use error::RegistryError;
pub use listener::{ListenerHandle, ListenerId, Recv};
pub use store::StreamRegistry;
