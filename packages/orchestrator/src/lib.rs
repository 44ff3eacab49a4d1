//! Gravity Orchestrator - Library interface
//!
//! Re-exports internal modules for use by the binary and integration tests.

pub mod config;
pub mod cosmos;
pub mod endpoint_pool;
pub mod event_watcher;
pub mod evm;
pub mod group;
pub mod orchestrator;
pub mod price_feed;
pub mod relayer;
pub mod retry;
pub mod signer;

pub use config::Config;
pub use orchestrator::{fetch_params, Collaborators, Orchestrator, OrchestratorSettings};
