//! # Slot Scan
//!
//! This crate tracks vaccination-slot availability reported by the CoWIN
//! public API and decides which observations deserve a fresh notification.
//! It provides the tracker store, the publish gate, the city pollers and the
//! Telegram notification sink.

/// Upstream data model and error type
mod slot_types;
pub use slot_types::*;

/// Which sessions may be announced at all
mod eligibility;
pub use eligibility::*;

/// Re-notification policy
mod publish_gate;
pub use publish_gate::*;

/// In-memory slot tracker
mod tracker;
pub use tracker::*;

/// Process-wide counters
mod stats;
pub use stats::*;

/// Environment and fleet configuration
mod config;
pub use config::*;

/// CoWIN API client
mod cowin_client;
pub use cowin_client::*;

/// City polling loop and notification seams
mod executor;
pub use executor::*;

/// Channel fan-out and message formatting
mod notification_service;
pub use notification_service::*;

/// Telegram Bot API chat service
mod telegram_service;
pub use telegram_service::*;
