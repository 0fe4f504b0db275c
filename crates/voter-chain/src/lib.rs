//! Chain transport and transaction execution.
//!
//! The single point of contact with the account's signing key and the
//! network's transaction sequence counter:
//! - [`RpcClient`]: JSON-RPC over HTTP (balance/sequence queries,
//!   broadcast, simulation, log queries)
//! - [`SequenceCache`]: locally cached sequence numbers with a forced
//!   refresh countdown
//! - [`TxSender`]: signs, broadcasts, waits for finalization with bounded
//!   exponential backoff and classifies failures
//! - [`ActionQueue`]: strictly sequential job worker, so at most one
//!   transaction for this account is ever in flight
//! - [`ConfirmationListener`]: advances record lifecycles from observed
//!   on-chain events and cross-checks revealed prices

pub mod contracts;
pub mod error;
pub mod events;
pub mod queue;
pub mod rpc;
pub mod sender;
pub mod sequence;
pub mod whitelist;

pub use error::{ChainError, ChainResult};
pub use events::{ConfirmationListener, ListenerConfig};
pub use queue::{ActionQueue, ActionWorker};
pub use rpc::{BoxFuture, ChainRpc, LogEntry, RpcClient};
pub use sender::{FinalizeConfig, TxSender};
pub use sequence::SequenceCache;
pub use whitelist::{WhitelistBitmap, WhitelistGuard};
