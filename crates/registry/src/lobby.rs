use chrono::Duration;
use shared::domain::{BoardId, PlayerId};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    board::{BoardSnapshot, GameBoard},
    board_actor::{BoardChange, BoardError, BoardHandle, JoinOutcome},
    clock::SharedClock,
    player::PlayerProfile,
    registry::{EntityRegistry, ExpiryPolicy, RegistryError, RegistryOptions, MAX_ENTITIES},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobbyConfig {
    pub max_entities: usize,
    pub player_ttl: Duration,
    pub board_idle_ttl: Duration,
    pub board_grace: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_entities: MAX_ENTITIES,
            player_ttl: Duration::hours(1),
            board_idle_ttl: Duration::hours(1),
            board_grace: Duration::minutes(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("{0} has not registered a name yet")]
    NotRegistered(PlayerId),
    #[error("board {0} no longer exists")]
    BoardNotFound(BoardId),
}

/// What a sweep removed or changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_players: Vec<PlayerId>,
    pub reaped_boards: Vec<BoardId>,
    pub terminated: Vec<BoardSnapshot>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired_players.is_empty()
            && self.reaped_boards.is_empty()
            && self.terminated.is_empty()
    }
}

/// Players and boards, plus the rules that tie them together.
#[derive(Clone)]
pub struct Lobby {
    players: EntityRegistry<PlayerId, PlayerProfile>,
    boards: EntityRegistry<BoardId, BoardHandle>,
    clock: SharedClock,
}

impl Lobby {
    pub fn new(config: LobbyConfig, clock: SharedClock) -> Self {
        let expiry = ExpiryPolicy {
            idle_ttl: config.board_idle_ttl,
            closed_grace: config.board_grace,
        };
        let players = EntityRegistry::new(
            "players",
            RegistryOptions {
                max_entities: config.max_entities,
                entry_ttl: Some(config.player_ttl),
                expiry,
            },
            clock.clone(),
        );
        let boards = EntityRegistry::new(
            "boards",
            RegistryOptions {
                max_entities: config.max_entities,
                entry_ttl: None,
                expiry,
            },
            clock.clone(),
        );
        Self {
            players,
            boards,
            clock,
        }
    }

    pub fn register_player(&self, id: &PlayerId, name: &str) -> Result<String, LobbyError> {
        let player = id.clone();
        let name = self
            .players
            .register(name, id.clone(), |name| PlayerProfile::new(player, name))?;
        Ok(name)
    }

    /// Removes the player and ends every ongoing game it was seated in.
    /// Returns `None` when the session never registered.
    pub async fn unregister_player(&self, id: &PlayerId) -> Option<Vec<BoardSnapshot>> {
        let profile = self.players.delete(id)?;
        Some(self.cascade(id, &profile).await)
    }

    #[cfg(test)]
    pub(crate) fn players(&self) -> &EntityRegistry<PlayerId, PlayerProfile> {
        &self.players
    }

    pub fn player_available(&self, name: &str) -> Result<(), RegistryError> {
        self.players.available(name)
    }

    pub fn player_name_taken(&self, name: &str) -> bool {
        self.players.contains_name(name)
    }

    pub fn display_name(&self, id: &PlayerId) -> Option<String> {
        self.players.find(id).map(|player| player.display_name)
    }

    /// Live display names in registration order.
    pub fn player_names(&self) -> Vec<String> {
        self.players
            .list()
            .into_iter()
            .map(|(_, name)| name)
            .collect()
    }

    pub async fn create_board(&self, name: &str) -> Result<BoardSnapshot, LobbyError> {
        let id = BoardId::generate();
        let now = self.clock.now();
        let clock = self.clock.clone();
        let board_id = id.clone();
        self.boards.register(name, id.clone(), move |name| {
            BoardHandle::spawn(GameBoard::new(board_id, name, now), clock)
        })?;
        self.board(&id)
            .map(|handle| handle.latest())
            .ok_or(LobbyError::BoardNotFound(id))
    }

    pub fn board(&self, id: &BoardId) -> Option<BoardHandle> {
        self.boards.find(id)
    }

    /// Live `(id, name)` pairs in creation order.
    pub fn board_list(&self) -> Vec<(BoardId, String)> {
        self.boards.list()
    }

    /// Seats (or re-seats) a registered player and records the membership.
    pub async fn join_board(
        &self,
        board_id: &BoardId,
        player: &PlayerId,
    ) -> Result<JoinOutcome, LobbyError> {
        if self.players.find(player).is_none() {
            return Err(LobbyError::NotRegistered(player.clone()));
        }
        let handle = self.require_board(board_id)?;
        let outcome = handle.join(player.clone()).await?;

        let recorded = self
            .players
            .modify(player, |profile| profile.join_board(board_id.clone()));
        if recorded.is_err() {
            // The player went away while joining, so its cascade never saw this board.
            handle.abandon(player.clone()).await?;
            return Err(LobbyError::NotRegistered(player.clone()));
        }
        Ok(outcome)
    }

    pub async fn play(
        &self,
        board_id: &BoardId,
        player: &PlayerId,
        x: usize,
        y: usize,
    ) -> Result<BoardSnapshot, LobbyError> {
        let handle = self.require_board(board_id)?;
        Ok(handle.play(player.clone(), x, y).await?)
    }

    pub async fn leave_board(
        &self,
        board_id: &BoardId,
        player: &PlayerId,
    ) -> Result<BoardChange, LobbyError> {
        let _ = self
            .players
            .modify(player, |profile| profile.leave_board(board_id));
        let handle = self.require_board(board_id)?;
        let change = handle.leave(player.clone()).await?;
        if change.changed {
            info!(%board_id, %player, "seat holder left, board terminated");
        }
        Ok(change)
    }

    /// Reaps both kinds and cascades players that expired since the last
    /// sweep.
    pub async fn sweep(&self) -> SweepReport {
        self.players.reap();
        self.boards.reap();

        let mut report = SweepReport::default();
        for (id, handle) in self.boards.take_evicted() {
            info!(board_id = %id, state = ?handle.latest().state, "board reaped");
            report.reaped_boards.push(id);
        }
        for (id, profile) in self.players.take_evicted() {
            report.terminated.extend(self.cascade(&id, &profile).await);
            report.expired_players.push(id);
        }
        report
    }

    async fn cascade(&self, id: &PlayerId, profile: &PlayerProfile) -> Vec<BoardSnapshot> {
        let mut changed = Vec::new();
        for board_id in profile.boards() {
            let Some(handle) = self.boards.find(board_id) else {
                continue;
            };
            match handle.abandon(id.clone()).await {
                Ok(BoardChange {
                    changed: true,
                    snapshot,
                }) => {
                    info!(%board_id, player = %id, "player removed, board terminated");
                    changed.push(snapshot);
                }
                Ok(_) => {}
                Err(err) => warn!(%board_id, player = %id, %err, "cascade skipped board"),
            }
        }
        changed
    }

    fn require_board(&self, id: &BoardId) -> Result<BoardHandle, LobbyError> {
        self.boards
            .find(id)
            .ok_or_else(|| LobbyError::BoardNotFound(id.clone()))
    }
}

#[cfg(test)]
#[path = "tests/lobby_tests.rs"]
mod tests;
