//! Capgate Test - Shared test utilities for the capgate crates.
//!
//! This crate provides mock handlers, fixtures and harness helpers that can
//! be used across capgate crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! capgate-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use capgate_test::{RecordingHandler, test_manager};
//!
//! #[tokio::test]
//! async fn test_dispatch() {
//!     let manager = test_manager(10);
//!     let handler = RecordingHandler::new();
//!     manager.register(handler.descriptor("db:query")).unwrap();
//!     // ...
//!     assert_eq!(handler.call_count(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
