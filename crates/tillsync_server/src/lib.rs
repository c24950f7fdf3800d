//! # Tillsync Server
//!
//! In-process reference backend for the tillsync batch endpoint.
//!
//! This crate provides:
//! - `POST {prefix}{endpoint}` handling for JSON batch bodies
//! - Document storage with 24-hex remote identities
//! - Idempotent creates keyed by the device-local id
//! - Confirmed deletions
//! - Test hooks for plan expiry, per-item rejection and dropped replies
//!
//! # Protocol
//!
//! Every item in a batch is answered individually:
//! 1. A rejected item is reported in `results.failed`
//! 2. A tombstone deletes the document and is reported as `deleted`
//! 3. Anything else is created or updated and reported with its remote id
//!
//! A seller whose plan is expired gets `planInvalid` and nothing is applied.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod documents;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use documents::{DocumentStore, StoredDocument};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, PLAN_EXPIRED};
pub use server::SyncServer;
