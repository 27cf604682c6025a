use chrono::{DateTime, Utc};
use shared::domain::{BoardId, BoardState, PlayerId, Role};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::{
    board::{BoardSnapshot, GameBoard, MoveError},
    clock::SharedClock,
    registry::{Entity, ExpiryPolicy, Reapable},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error("board {0} is no longer accepting commands")]
    Closed(BoardId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub role: Role,
    pub state: BoardState,
    pub snapshot: BoardSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardChange {
    pub changed: bool,
    pub snapshot: BoardSnapshot,
}

enum Command {
    Join {
        player: PlayerId,
        reply: oneshot::Sender<JoinOutcome>,
    },
    Play {
        player: PlayerId,
        x: usize,
        y: usize,
        reply: oneshot::Sender<Result<BoardSnapshot, MoveError>>,
    },
    Leave {
        player: PlayerId,
        reply: oneshot::Sender<BoardChange>,
    },
    Abandon {
        player: PlayerId,
        reply: oneshot::Sender<BoardChange>,
    },
    Terminate {
        reply: oneshot::Sender<BoardChange>,
    },
    Snapshot {
        reply: oneshot::Sender<BoardSnapshot>,
    },
}

/// Address of a board's owning task. Every mutation is queued and applied one
/// at a time, in arrival order, by that task.
#[derive(Debug, Clone)]
pub struct BoardHandle {
    id: BoardId,
    name: String,
    commands: mpsc::UnboundedSender<Command>,
    latest: watch::Receiver<BoardSnapshot>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Command::Join { .. } => "join",
            Command::Play { .. } => "play",
            Command::Leave { .. } => "leave",
            Command::Abandon { .. } => "abandon",
            Command::Terminate { .. } => "terminate",
            Command::Snapshot { .. } => "snapshot",
        };
        f.write_str(label)
    }
}

impl BoardHandle {
    /// Starts the owning task. Must be called from within a tokio runtime.
    pub fn spawn(board: GameBoard, clock: SharedClock) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (publish, latest) = watch::channel(board.snapshot());
        let handle = Self {
            id: board.id().clone(),
            name: board.name().to_string(),
            commands,
            latest,
        };
        tokio::spawn(run(board, clock, inbox, publish));
        handle
    }

    pub fn id(&self) -> &BoardId {
        &self.id
    }

    /// Last published state; may trail commands still in the queue.
    pub fn latest(&self) -> BoardSnapshot {
        self.latest.borrow().clone()
    }

    pub async fn snapshot(&self) -> Result<BoardSnapshot, BoardError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn join(&self, player: PlayerId) -> Result<JoinOutcome, BoardError> {
        self.request(|reply| Command::Join { player, reply }).await
    }

    pub async fn play(
        &self,
        player: PlayerId,
        x: usize,
        y: usize,
    ) -> Result<BoardSnapshot, BoardError> {
        let result = self
            .request(|reply| Command::Play {
                player,
                x,
                y,
                reply,
            })
            .await?;
        Ok(result?)
    }

    pub async fn leave(&self, player: PlayerId) -> Result<BoardChange, BoardError> {
        self.request(|reply| Command::Leave { player, reply }).await
    }

    pub async fn abandon(&self, player: PlayerId) -> Result<BoardChange, BoardError> {
        self.request(|reply| Command::Abandon { player, reply }).await
    }

    pub async fn terminate(&self) -> Result<BoardChange, BoardError> {
        self.request(|reply| Command::Terminate { reply }).await
    }

    async fn request<T, F>(&self, build: F) -> Result<T, BoardError>
    where
        F: FnOnce(oneshot::Sender<T>) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| BoardError::Closed(self.id.clone()))?;
        response
            .await
            .map_err(|_| BoardError::Closed(self.id.clone()))
    }
}

impl Reapable for BoardHandle {
    fn should_expire(&self, now: DateTime<Utc>, policy: &ExpiryPolicy) -> bool {
        self.commands.is_closed() || self.latest.borrow().should_expire(now, policy)
    }
}

impl Entity for BoardHandle {
    fn name(&self) -> &str {
        &self.name
    }
}

async fn run(
    mut board: GameBoard,
    clock: SharedClock,
    mut inbox: mpsc::UnboundedReceiver<Command>,
    publish: watch::Sender<BoardSnapshot>,
) {
    while let Some(command) = inbox.recv().await {
        debug!(board_id = %board.id(), ?command, "applying board command");
        let changed = match command {
            Command::Join { player, reply } => {
                board.touch(clock.now());
                let (role, state) = board.join(player);
                let _ = reply.send(JoinOutcome {
                    role,
                    state,
                    snapshot: board.snapshot(),
                });
                true
            }
            Command::Play {
                player,
                x,
                y,
                reply,
            } => {
                let result = board.update(x, y, &player).map(|_| {
                    board.touch(clock.now());
                    board.snapshot()
                });
                let accepted = result.is_ok();
                let _ = reply.send(result);
                accepted
            }
            Command::Leave { player, reply } => {
                let changed = board.leave(&player);
                finish_change(&mut board, &clock, changed, reply)
            }
            Command::Abandon { player, reply } => {
                let changed = board.abandon(&player);
                finish_change(&mut board, &clock, changed, reply)
            }
            Command::Terminate { reply } => {
                let changed = board.terminate();
                finish_change(&mut board, &clock, changed, reply)
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(board.snapshot());
                false
            }
        };
        if changed {
            publish.send_replace(board.snapshot());
        }
    }
    debug!(board_id = %board.id(), "board task stopped");
}

fn finish_change(
    board: &mut GameBoard,
    clock: &SharedClock,
    changed: bool,
    reply: oneshot::Sender<BoardChange>,
) -> bool {
    if changed {
        board.touch(clock.now());
    }
    let _ = reply.send(BoardChange {
        changed,
        snapshot: board.snapshot(),
    });
    changed
}

#[cfg(test)]
#[path = "tests/board_actor_tests.rs"]
mod tests;
