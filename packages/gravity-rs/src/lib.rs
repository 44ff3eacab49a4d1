//! Gravity-RS: Shared Bridge Library for the Gravity Orchestrator
//!
//! This crate holds the chain-agnostic pieces of the bridge that every
//! orchestrator component (and its tests) relies on:
//!
//! - **Types** - Valsets, outgoing batches and confirmations as the Cosmos chain reports them
//! - **Checkpoint** - Valset and batch checkpoint hashes matching the Gravity contract
//! - **Signatures** - Confirmation repacking and the 66% voting power threshold
//! - **Contracts** - Gravity and ERC20 ABI bindings using alloy's `sol!` macro
//! - **Events** - Typed bridge events decoded from Gravity contract logs
//! - **Msgs** - Protobuf messages for the Cosmos `peggy` module
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! gravity-rs = { path = "../gravity-rs" }
//! ```

pub mod checkpoint;
pub mod contracts;
pub mod error;
pub mod events;
pub mod hash;
pub mod msgs;
pub mod redact;
pub mod signatures;
pub mod types;

pub use checkpoint::{encode_batch_checkpoint, encode_valset_checkpoint};
pub use error::GravityError;
pub use events::{
    filter_by_nonce, merge_sorted, BridgeEvent, DepositEvent, Erc20DeployedEvent, ValsetUpdatedEvent,
    WithdrawEvent,
};
pub use hash::{bytes32_to_hex, gravity_id_from_str, keccak256, parse_address, parse_amount};
pub use signatures::{check_and_repack, Confirmation, RepackedSigs};
pub use types::{
    BatchConfirm, BridgeValidator, Erc20Token, OutgoingTransferTx, OutgoingTxBatch, Valset,
    ValsetConfirm,
};
