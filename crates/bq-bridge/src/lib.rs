//! # bq-bridge
//!
//! Session registry bridging stateless request/response callers to
//! long-lived world-server connections.
//!
//! A join mints an unforgeable token bound to the identity the world
//! server assigned; every later request presents both. Commands against
//! the same session are serialized FIFO; sessions never block each
//! other.

pub mod registry;
pub mod session;

pub use registry::{CommandOutcome, JoinReceipt, SessionRegistry};
pub use session::Session;
