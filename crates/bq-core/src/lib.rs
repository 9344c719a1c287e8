//! # bq-core
//!
//! Core types for the BrowserQuest session bridge.
//!
//! This crate provides the foundational types shared by the protocol
//! client, the session registry, and the HTTP boundary:
//! - Player position, vitals, and the public state snapshot
//! - Command parsing (free text -> typed intent) and the compass table
//! - The bridge error taxonomy

pub mod command;
pub mod error;
pub mod state;

pub use command::{CommandIntent, compass_delta, parse_command};
pub use error::{BridgeError, ErrorCategory, Result};
pub use state::{PlayerId, Position, StateSnapshot, Vitals};
