//! Websocket event subscriptions.
//!
//! # Data Flow
//! ```text
//! WsClient::connect(url)
//!     → client.rs (one socket, reader + writer tasks, reconnect)
//!     → types.rs (EventData decoding)
//!     → Subscription channel  or  subscriber.rs (typed handler tasks)
//! ```

pub mod client;
pub mod subscriber;
pub mod types;

pub use client::{Subscription, SubscriptionState, WsClient};
pub use subscriber::SubscriptionHandle;
pub use types::{queries, tx_hash, DecodedTx, Event, EventData};
