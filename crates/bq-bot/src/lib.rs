//! # bq-bot
//!
//! Protocol client for a single BrowserQuest world-server connection.
//!
//! A [`WorldBot`] owns one long-lived connection: it dials the server,
//! performs the hello/welcome handshake, translates typed command
//! intents into wire frames, and reconciles the authoritative state the
//! server pushes against its own optimistic view. Inbound frames are
//! handled by a background reader task, independent of any in-flight
//! command.

pub mod client;
pub mod framing;
pub mod wire;

pub use client::{BotConfig, ConnectionState, WorldBot};
pub use framing::{FrameRead, FrameWrite, LineFrameReader, LineFrameWriter};
pub use wire::{ClientFrame, OpcodeTable, ServerFrame};
