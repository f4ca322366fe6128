//! Transaction subsystem.
//!
//! # Data Flow
//! ```text
//! msgs (MsgRef) + BaseTx
//!     → broadcaster.rs (lock, cache, retry, batch split)
//!     → factory.rs (fee, gas, simulation, signing)
//!     → sign_mode.rs (direct / amino JSON sign bytes)
//!     → unsigned.rs (TxBody / AuthInfo / TxRaw)
//!     → TxBroadcaster (JSON-RPC)
//! ```

pub mod broadcaster;
pub mod coins;
pub mod factory;
pub mod sign_mode;
pub mod types;
pub mod unsigned;

pub use broadcaster::{BroadcastSettings, Broadcaster};
pub use coins::{parse_coins, parse_dec_coins, Coin, DecCoin};
pub use factory::{adjust_gas, Factory, GasEstimate};
pub use sign_mode::{DefaultSignModeHandler, SignMode, SignModeHandler, SignerData};
pub use types::{AbciEvent, AminoMsg, BaseTx, BroadcastMode, EventAttribute, Msg, MsgRef, ResultTx};
pub use unsigned::UnsignedTx;
