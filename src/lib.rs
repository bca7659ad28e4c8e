//! Core library for the mempool-sentinel monitor.
//!
//! The binary (`main.rs`) only wires these pieces together:
//! `mempool` keeps a pending-transaction subscription alive, `pipeline`
//! classifies each hash with `risk`, and `alerts` fans the assessments out.

pub mod alerts;
pub mod config;
pub mod errors;
pub mod mempool;
pub mod models;
pub mod pipeline;
pub mod risk;
pub mod rpc;
pub mod stats;
pub mod utils;
