//! EVM chain access: the provider seam, the Gravity contract client and the
//! mempool de-duplication cache.

pub mod gravity_contract;
pub mod pending;
pub mod provider;

pub use gravity_contract::GravityContract;
pub use pending::{run_pending_tx_subscription, PendingTxInputList, SharedPendingInputs};
pub use provider::{AlloyEvmProvider, EvmProvider, LogQuery};
