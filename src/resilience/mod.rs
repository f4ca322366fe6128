//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Transaction path:
//!     → retries.rs (attempt / should_retry / on_retry, bounded by the attempt ceiling)
//!
//! Websocket path:
//!     → backoff.rs (exponential delay + jitter between redials)
//! ```
//!
//! # Design Decisions
//! - Retry policy is a plain combinator, testable without a network
//! - Only sequence mismatches are retried on the transaction path
//! - Jittered backoff prevents reconnect storms after a node restart

pub mod backoff;
pub mod retries;

pub use backoff::Backoff;
pub use retries::attempt;
