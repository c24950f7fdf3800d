//! # tillsync protocol
//!
//! Wire types for the tillsync batch endpoint.
//!
//! This crate provides:
//! - `SyncBatchRequest` / `OutboundItem` for `POST /sync/{endpoint}`
//! - `SyncBatchResponse` with per-item success and failure outcomes
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    endpoint_path, BatchResults, ItemFailure, ItemSuccess, OutboundItem, SyncAction,
    SyncBatchRequest, SyncBatchResponse, DEFAULT_ENDPOINT_PREFIX,
};
