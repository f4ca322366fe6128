//! Per-account state for the transaction pipeline.
//!
//! # Data Flow
//! ```text
//! build_and_send(from)
//!     → locker.rs (serialize on the signer's address)
//!     → cache.rs (account number + next sequence, node query on miss)
//!     → tx factory
//! ```

pub mod cache;
pub mod locker;

pub use cache::{AccountCache, AccountInfo};
pub use locker::{fnv1a32, ShardedLocker};
