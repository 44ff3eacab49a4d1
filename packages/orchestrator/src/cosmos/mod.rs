//! Cosmos chain access: bridge queries, transaction broadcasting and the
//! domain-level broadcast client built on top of them.

pub mod broadcast;
pub mod query;
pub mod sink;

pub use broadcast::BroadcastClient;
pub use query::{
    optional, BatchFees, CosmosQueryClient, Erc20ToDenom, LastClaimEvent, LcdQueryClient, Params,
    QueryError, QueryResult,
};
pub use sink::{BroadcastSink, CosmosTxSink, TxResponse};
