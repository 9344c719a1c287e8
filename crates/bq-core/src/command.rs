//! Free-text command parsing
//!
//! Parsing never fails: unrecognized verbs still produce an intent, and
//! the protocol client decides what to reject. That keeps the command
//! table in exactly one place.

/// Parsed representation of a free-text command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandIntent {
    /// First token, lowercased
    pub verb: String,
    /// Remaining tokens joined, if any
    pub argument: Option<String>,
}

/// Split a command string into a typed intent.
///
/// The verb is case-folded; the rest of the line becomes the argument.
pub fn parse_command(text: &str) -> CommandIntent {
    let mut tokens = text.split_whitespace();
    let verb = tokens.next().unwrap_or("").to_lowercase();
    let rest: Vec<&str> = tokens.collect();
    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };
    CommandIntent { verb, argument }
}

/// Unit delta for a compass direction, or None if the direction is
/// unknown. Matches the world's screen coordinates: north is -y.
pub fn compass_delta(direction: &str) -> Option<(i32, i32)> {
    match direction.to_lowercase().as_str() {
        "n" | "up" => Some((0, -1)),
        "s" | "down" => Some((0, 1)),
        "e" | "right" => Some((1, 0)),
        "w" | "left" => Some((-1, 0)),
        _ => None,
    }
}
