//! Player state types

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the world server at handshake
pub type PlayerId = String;

/// Grid position in the world
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Position one step away in the given delta
    pub fn stepped(&self, (dx, dy): (i32, i32)) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Health as reported by the server; unknown until the server supplies it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    pub current_health: i32,
    pub max_health: i32,
}

/// Public view of a session, returned alongside every command result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub identity: PlayerId,
    pub display_name: String,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_health: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_health: Option<i32>,
}
