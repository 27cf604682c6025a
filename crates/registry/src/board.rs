use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::domain::{BoardId, BoardState, Grid, Mark, Outcome, PlayerId, Role, GRID_SIZE};
use thiserror::Error;

use crate::registry::{ExpiryPolicy, Reapable};

const MIN_MOVES_FOR_WIN: u8 = 5;
const MAX_MOVES: u8 = (GRID_SIZE * GRID_SIZE) as u8;

/// Rows, then columns, then both diagonals.
pub const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("cell ({x}, {y}) is outside the board")]
    OutOfBounds { x: usize, y: usize },
    #[error("player has not joined this board")]
    NotSeated,
    #[error("viewers cannot play")]
    NotAllowed,
    #[error("the game is not in progress")]
    NotOngoing,
    #[error("it is not this player's turn")]
    NotYourTurn,
    #[error("cell ({x}, {y}) is already marked")]
    CellTaken { x: usize, y: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub id: BoardId,
    pub name: String,
    pub grid: Grid,
    pub move_count: u8,
    pub state: BoardState,
    pub outcome: Outcome,
    pub seat_x: Option<PlayerId>,
    pub seat_o: Option<PlayerId>,
    pub last_activity: DateTime<Utc>,
}

impl Reapable for BoardSnapshot {
    fn should_expire(&self, now: DateTime<Utc>, policy: &ExpiryPolicy) -> bool {
        let idle = now - self.last_activity;
        if self.state.is_closed() {
            idle > policy.closed_grace
        } else {
            idle > policy.idle_ttl
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameBoard {
    id: BoardId,
    name: String,
    grid: Grid,
    move_count: u8,
    seats: HashMap<PlayerId, Role>,
    state: BoardState,
    outcome: Outcome,
    last_activity: DateTime<Utc>,
}

impl GameBoard {
    pub fn new(id: BoardId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            grid: Grid::default(),
            move_count: 0,
            seats: HashMap::new(),
            state: BoardState::Waiting,
            outcome: Outcome::Pending,
            last_activity: now,
        }
    }

    pub fn id(&self) -> &BoardId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn move_count(&self) -> u8 {
        self.move_count
    }

    pub fn role_of(&self, player: &PlayerId) -> Option<Role> {
        self.seats.get(player).copied()
    }

    pub fn seat_holder(&self, role: Role) -> Option<&PlayerId> {
        self.seats
            .iter()
            .find(|(_, seat)| **seat == role)
            .map(|(player, _)| player)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }

    /// Seats a player in join order. Joining again returns the existing seat
    /// untouched; closed boards only take viewers.
    pub fn join(&mut self, player: PlayerId) -> (Role, BoardState) {
        if let Some(role) = self.role_of(&player) {
            return (role, self.state);
        }

        let seated = self.seats.values().filter(|role| role.is_seated()).count();
        let role = match (seated, self.state) {
            (0, BoardState::Waiting) => Role::X,
            (1, BoardState::Waiting) => {
                self.state = BoardState::Ongoing;
                Role::O
            }
            _ => Role::Viewer,
        };
        self.seats.insert(player, role);
        (role, self.state)
    }

    pub fn update(
        &mut self,
        x: usize,
        y: usize,
        player: &PlayerId,
    ) -> Result<BoardSnapshot, MoveError> {
        if x >= GRID_SIZE || y >= GRID_SIZE {
            return Err(MoveError::OutOfBounds { x, y });
        }
        let role = self.role_of(player).ok_or(MoveError::NotSeated)?;
        let mark = role.mark().ok_or(MoveError::NotAllowed)?;
        if self.state != BoardState::Ongoing {
            return Err(MoveError::NotOngoing);
        }
        if mark != self.mark_to_play() {
            return Err(MoveError::NotYourTurn);
        }
        if self.grid[x][y] != Mark::Empty {
            return Err(MoveError::CellTaken { x, y });
        }

        self.grid[x][y] = mark;
        self.move_count += 1;

        if self.move_count >= MIN_MOVES_FOR_WIN && self.completed_line().is_some() {
            self.outcome = Outcome::win_for(mark);
            self.state = BoardState::Finished;
        } else if self.move_count == MAX_MOVES {
            self.outcome = Outcome::Draw;
            self.state = BoardState::Finished;
        }

        Ok(self.snapshot())
    }

    /// Abandons the game. A finished game keeps its result.
    pub fn terminate(&mut self) -> bool {
        if self.state.is_closed() {
            return false;
        }
        self.state = BoardState::Terminated;
        true
    }

    /// Cascade rule for a removed player: only an ongoing game loses a seat holder.
    pub fn abandon(&mut self, player: &PlayerId) -> bool {
        let seated = self.role_of(player).is_some_and(Role::is_seated);
        if seated && self.state == BoardState::Ongoing {
            self.terminate()
        } else {
            false
        }
    }

    /// A seat holder walking away ends the game even before it starts.
    pub fn leave(&mut self, player: &PlayerId) -> bool {
        let seated = self.role_of(player).is_some_and(Role::is_seated);
        if seated {
            self.terminate()
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            grid: self.grid,
            move_count: self.move_count,
            state: self.state,
            outcome: self.outcome,
            seat_x: self.seat_holder(Role::X).cloned(),
            seat_o: self.seat_holder(Role::O).cloned(),
            last_activity: self.last_activity,
        }
    }

    fn mark_to_play(&self) -> Mark {
        if self.move_count % 2 == 0 {
            Mark::X
        } else {
            Mark::O
        }
    }

    fn completed_line(&self) -> Option<[(usize, usize); 3]> {
        LINES.into_iter().find(|line| {
            let [a, b, c] = (*line).map(|(x, y)| self.grid[x][y]);
            a != Mark::Empty && a == b && b == c
        })
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
