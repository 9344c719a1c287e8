//! Wire codec for the world-server protocol
//!
//! Frames are JSON objects carrying a numeric `"op"` discriminant,
//! e.g. `{"op":0,"name":"alice"}`. The opcode numbering used by
//! BrowserQuest forks in the wild is not authoritative, so the codec is
//! table-driven: point [`OpcodeTable`] at whatever numbering the target
//! server speaks. Frames with a discriminant outside the table decode
//! to [`ServerFrame::Unknown`] and are ignored by the client.

use bq_core::{BridgeError, PlayerId, Position, Result, Vitals};
use serde_json::{Value, json};

/// Opcode assignments for the target server.
///
/// Defaults follow the classic client subset: HELLO=0, WELCOME=1,
/// MOVE=2, with 3 and 4 for the authoritative position and health
/// pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeTable {
    pub hello: u64,
    pub welcome: u64,
    pub move_to: u64,
    pub position: u64,
    pub health: u64,
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self {
            hello: 0,
            welcome: 1,
            move_to: 2,
            position: 3,
            health: 4,
        }
    }
}

/// Frames the client sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Login request carrying the chosen display name
    Hello { name: String },
    /// Request to move to an absolute grid position
    Move { x: i32, y: i32 },
}

impl ClientFrame {
    pub fn encode(&self, ops: &OpcodeTable) -> Result<String> {
        let value = match self {
            ClientFrame::Hello { name } => json!({ "op": ops.hello, "name": name }),
            ClientFrame::Move { x, y } => json!({ "op": ops.move_to, "x": x, "y": y }),
        };
        serde_json::to_string(&value).map_err(Into::into)
    }
}

/// Frames the server pushes to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Handshake acknowledgment: identity plus whatever initial state
    /// the server chose to include
    Welcome {
        id: PlayerId,
        position: Option<Position>,
        vitals: Option<Vitals>,
    },
    /// Authoritative position correction
    Position(Position),
    /// Authoritative health update
    Health(Vitals),
    /// Recognizably framed, but not an opcode we speak
    Unknown(u64),
}

/// Decode one inbound frame.
///
/// Errors mean the frame was malformed (not JSON, or no usable `"op"`);
/// the caller drops those without touching the connection.
pub fn decode(ops: &OpcodeTable, frame: &str) -> Result<ServerFrame> {
    let value: Value = serde_json::from_str(frame)?;
    let op = value
        .get("op")
        .and_then(Value::as_u64)
        .ok_or_else(|| BridgeError::Wire("missing op discriminant".into()))?;

    if op == ops.welcome {
        let id = decode_id(&value)?;
        let position = match (field_i32(&value, "x"), field_i32(&value, "y")) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            _ => None,
        };
        let vitals = match (field_i32(&value, "hp"), field_i32(&value, "maxHp")) {
            (Some(current_health), Some(max_health)) => Some(Vitals {
                current_health,
                max_health,
            }),
            _ => None,
        };
        Ok(ServerFrame::Welcome {
            id,
            position,
            vitals,
        })
    } else if op == ops.position {
        let x = field_i32(&value, "x")
            .ok_or_else(|| BridgeError::Wire("position frame missing x".into()))?;
        let y = field_i32(&value, "y")
            .ok_or_else(|| BridgeError::Wire("position frame missing y".into()))?;
        Ok(ServerFrame::Position(Position::new(x, y)))
    } else if op == ops.health {
        let current_health = field_i32(&value, "hp")
            .ok_or_else(|| BridgeError::Wire("health frame missing hp".into()))?;
        let max_health = field_i32(&value, "maxHp")
            .ok_or_else(|| BridgeError::Wire("health frame missing maxHp".into()))?;
        Ok(ServerFrame::Health(Vitals {
            current_health,
            max_health,
        }))
    } else {
        Ok(ServerFrame::Unknown(op))
    }
}

/// Servers disagree on whether ids are strings or numbers; accept both.
fn decode_id(value: &Value) -> Result<PlayerId> {
    match value.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(BridgeError::Wire("welcome frame missing id".into())),
    }
}

fn field_i32(value: &Value, key: &str) -> Option<i32> {
    value.get(key).and_then(Value::as_i64).map(|n| n as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_encodes_name() {
        let ops = OpcodeTable::default();
        let frame = ClientFrame::Hello {
            name: "alice".into(),
        }
        .encode(&ops)
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], 0);
        assert_eq!(value["name"], "alice");
    }

    #[test]
    fn move_encodes_target() {
        let ops = OpcodeTable::default();
        let frame = ClientFrame::Move { x: 3, y: -1 }.encode(&ops).unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["op"], 2);
        assert_eq!(value["x"], 3);
        assert_eq!(value["y"], -1);
    }

    #[test]
    fn welcome_with_full_state() {
        let ops = OpcodeTable::default();
        let frame = decode(&ops, r#"{"op":1,"id":"p7","x":5,"y":9,"hp":18,"maxHp":20}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Welcome {
                id: "p7".into(),
                position: Some(Position::new(5, 9)),
                vitals: Some(Vitals {
                    current_health: 18,
                    max_health: 20
                }),
            }
        );
    }

    #[test]
    fn welcome_with_bare_id() {
        let ops = OpcodeTable::default();
        let frame = decode(&ops, r#"{"op":1,"id":42}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Welcome {
                id: "42".into(),
                position: None,
                vitals: None,
            }
        );
    }

    #[test]
    fn authoritative_position() {
        let ops = OpcodeTable::default();
        let frame = decode(&ops, r#"{"op":3,"x":-2,"y":7}"#).unwrap();
        assert_eq!(frame, ServerFrame::Position(Position::new(-2, 7)));
    }

    #[test]
    fn authoritative_health() {
        let ops = OpcodeTable::default();
        let frame = decode(&ops, r#"{"op":4,"hp":10,"maxHp":20}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Health(Vitals {
                current_health: 10,
                max_health: 20
            })
        );
    }

    #[test]
    fn unrecognized_opcode_is_not_an_error() {
        let ops = OpcodeTable::default();
        let frame = decode(&ops, r#"{"op":99,"whatever":true}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown(99));
    }

    #[test]
    fn malformed_frames_error_out() {
        let ops = OpcodeTable::default();
        assert!(decode(&ops, "not json").is_err());
        assert!(decode(&ops, r#"{"name":"no op field"}"#).is_err());
        assert!(decode(&ops, r#"{"op":1}"#).is_err()); // welcome without id
        assert!(decode(&ops, r#"{"op":3,"x":1}"#).is_err()); // position without y
    }

    #[test]
    fn codec_follows_a_custom_table() {
        let ops = OpcodeTable {
            hello: 100,
            welcome: 101,
            move_to: 102,
            position: 103,
            health: 104,
        };
        let hello = ClientFrame::Hello { name: "bob".into() }.encode(&ops).unwrap();
        assert!(hello.contains("\"op\":100"));
        let frame = decode(&ops, r#"{"op":101,"id":"p1"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Welcome { .. }));
        // The default welcome opcode is just noise under this table.
        let frame = decode(&ops, r#"{"op":1,"id":"p1"}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown(1));
    }
}
