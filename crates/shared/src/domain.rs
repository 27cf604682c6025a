use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

// Opaque per-session identity issued by the transport.
id_newtype!(PlayerId);
id_newtype!(BoardId);

pub const GRID_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mark {
    #[default]
    #[serde(rename = "")]
    Empty,
    #[serde(rename = "x")]
    X,
    #[serde(rename = "o")]
    O,
}

pub type Grid = [[Mark; GRID_SIZE]; GRID_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    X,
    O,
    Viewer,
}

impl Role {
    pub fn is_seated(self) -> bool {
        matches!(self, Role::X | Role::O)
    }

    pub fn mark(self) -> Option<Mark> {
        match self {
            Role::X => Some(Mark::X),
            Role::O => Some(Mark::O),
            Role::Viewer => None,
        }
    }
}

/// Lifecycle of one board. Transitions only move forward; `Finished` and
/// `Terminated` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardState {
    Waiting,
    Ongoing,
    Finished,
    Terminated,
}

impl BoardState {
    pub fn is_closed(self) -> bool {
        matches!(self, BoardState::Finished | BoardState::Terminated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pending,
    XWins,
    OWins,
    Draw,
}

impl Outcome {
    pub fn win_for(mark: Mark) -> Self {
        match mark {
            Mark::X => Outcome::XWins,
            Mark::O => Outcome::OWins,
            Mark::Empty => Outcome::Pending,
        }
    }
}
