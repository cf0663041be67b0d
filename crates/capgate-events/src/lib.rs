//! Capgate Events - Activation event bus for the capgate capability manager.
//!
//! This crate provides:
//! - Event types for registry, active-set, context and dispatch changes
//! - Broadcast-based event bus for async subscribers
//!
//! # Example
//!
//! ```rust
//! use capgate_events::{ActivationEvent, EventBus, EventMetadata};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(ActivationEvent::Deactivated {
//!     metadata: EventMetadata::new("manager"),
//!     capability: "db:query".to_string(),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "deactivated");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{ActivationCause, ActivationEvent, EventMetadata};
