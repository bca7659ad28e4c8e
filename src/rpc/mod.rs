//! Transaction detail lookups over plain JSON-RPC.

pub mod client;

pub use client::{EthersRpcClient, TransactionSource, record_from_rpc};
