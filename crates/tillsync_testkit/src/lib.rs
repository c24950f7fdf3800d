//! # Tillsync Testkit
//!
//! Test utilities for tillsync.
//!
//! This crate provides:
//! - Retail record fixtures
//! - Property-based test generators using proptest
//! - A harness wiring the engine to the reference backend
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tillsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn customers_sync() {
//!     let harness = SyncHarness::new();
//!     harness.insert(retail::CUSTOMERS, customer("c1", "Ada"));
//!     assert!(harness.sweep().await.success);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use tillsync_engine::retail;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
