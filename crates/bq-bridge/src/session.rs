//! One registered session: credentials plus the bot that owns the
//! backend connection.

use bq_bot::WorldBot;
use bq_core::{PlayerId, Position, StateSnapshot, Vitals};
use tokio::sync::Mutex;

/// Server-side record binding a caller-visible credential to a live
/// world connection. The bot sits behind a fair mutex: concurrent
/// commands against the same session queue FIFO instead of
/// interleaving around the optimistic position update.
pub struct Session {
    identity: PlayerId,
    display_name: String,
    pub(crate) bot: Mutex<WorldBot>,
}

impl Session {
    pub(crate) fn new(identity: PlayerId, display_name: String, bot: WorldBot) -> Self {
        Self {
            identity,
            display_name,
            bot: Mutex::new(bot),
        }
    }

    pub fn identity(&self) -> &PlayerId {
        &self.identity
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Current public state of this session.
    pub async fn snapshot(&self) -> StateSnapshot {
        let bot = self.bot.lock().await;
        let (_, position, vitals) = bot.view().await;
        self.snapshot_from(position, vitals)
    }

    pub(crate) fn snapshot_from(
        &self,
        position: Position,
        vitals: Option<Vitals>,
    ) -> StateSnapshot {
        StateSnapshot {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            position,
            current_health: vitals.map(|v| v.current_health),
            max_health: vitals.map(|v| v.max_health),
        }
    }
}
