//! Key management subsystem.
//!
//! # Data Flow
//! ```text
//! add / recover / import
//!     → algo.rs (PrivKey: secret → pubkey, address, signature)
//!     → manager.rs (named, password-guarded storage)
//!     → KeyManager trait → tx factory (find + sign)
//! ```
//!
//! # Security
//! - Private keys are never logged or serialized
//! - Every operation touching a secret requires the key's password

pub mod algo;
pub mod manager;

pub use algo::{KeyAlgo, PrivKey, PublicKey, COSMOS_HD_PATH, ETH_HD_PATH};
pub use manager::{KeyInfo, KeyManager, MemoryKeyManager};
