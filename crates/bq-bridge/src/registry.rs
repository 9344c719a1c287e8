//! Session registry and the transport-agnostic boundary API

use crate::session::Session;
use bq_bot::{BotConfig, WorldBot};
use bq_core::{BridgeError, PlayerId, Result, StateSnapshot, parse_command};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Credentials returned by a successful join
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinReceipt {
    pub player_id: PlayerId,
    pub token: String,
}

/// Result of one dispatched command
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub output: String,
    pub state: StateSnapshot,
}

/// Registry of live sessions, keyed by token.
///
/// The token table is the only shared mutable structure in the system;
/// it is sharded, so requests for unrelated sessions never contend.
pub struct SessionRegistry {
    bot_config: BotConfig,
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    /// Create a registry whose sessions connect with the given config.
    pub fn new(bot_config: BotConfig) -> Self {
        Self {
            bot_config,
            sessions: DashMap::new(),
        }
    }

    /// Join the world: connect, handshake, mint a token, register.
    ///
    /// On any failure the half-built bot is closed and nothing is
    /// registered, so the registry never holds a session it cannot
    /// reach.
    pub async fn join(&self, display_name: &str) -> Result<JoinReceipt> {
        let mut bot = WorldBot::new(self.bot_config.clone());
        if let Err(e) = bot.connect().await {
            bot.close().await;
            return Err(e);
        }
        let identity = match bot.handshake(display_name).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(display_name, "join failed during handshake: {}", e);
                bot.close().await;
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(
            identity.clone(),
            display_name.to_string(),
            bot,
        ));
        let token = self.register(session);
        info!(identity = %identity, "session joined");
        Ok(JoinReceipt {
            player_id: identity,
            token,
        })
    }

    /// Insert under a freshly minted token, retrying on the
    /// astronomically unlikely collision with a live one.
    fn register(&self, session: Arc<Session>) -> String {
        loop {
            let token = Uuid::new_v4().simple().to_string();
            match self.sessions.entry(token.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(session);
                    return token;
                }
                Entry::Occupied(_) => continue,
            }
        }
    }

    /// Look a session up by its credentials.
    ///
    /// An absent token and a token bound to a different player are
    /// distinct failures; callers that want to hide the distinction can
    /// collapse on the error category.
    pub fn resolve(&self, identity: &str, token: &str) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(BridgeError::UnknownToken)?;
        if session.identity() != identity {
            return Err(BridgeError::IdentityMismatch);
        }
        Ok(session)
    }

    /// Execute one free-text command against a session and return the
    /// acknowledgment plus the resulting public state.
    pub async fn command(
        &self,
        identity: &str,
        token: &str,
        command_text: &str,
    ) -> Result<CommandOutcome> {
        let session = self.resolve(identity, token)?;
        let intent = parse_command(command_text);

        let mut bot = session.bot.lock().await;
        let output = bot.apply_intent(&intent).await?;
        let (_, position, vitals) = bot.view().await;
        drop(bot);

        Ok(CommandOutcome {
            output,
            state: session.snapshot_from(position, vitals),
        })
    }

    /// Read-only state fetch.
    pub async fn snapshot(&self, identity: &str, token: &str) -> Result<StateSnapshot> {
        let session = self.resolve(identity, token)?;
        Ok(session.snapshot().await)
    }

    /// Explicitly end a session: remove it and close its connection.
    pub async fn leave(&self, identity: &str, token: &str) -> Result<()> {
        self.resolve(identity, token)?;
        if let Some((_, session)) = self.sessions.remove(token) {
            session.bot.lock().await.close().await;
            info!(identity, "session left");
        }
        Ok(())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
