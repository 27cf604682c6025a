use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{BoardId, BoardState, Grid, Outcome, Role},
    error::ApiError,
};

const BOARD_TOPIC_PREFIX: &str = "board:";

/// Fan-out scope for broadcasts: the board list, the player roster, or one board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Topic {
    Lobby,
    Roster,
    Board(BoardId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Lobby => f.write_str("lobby"),
            Topic::Roster => f.write_str("roster"),
            Topic::Board(board_id) => write!(f, "{BOARD_TOPIC_PREFIX}{board_id}"),
        }
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "lobby" => Ok(Topic::Lobby),
            "roster" => Ok(Topic::Roster),
            _ => match raw.strip_prefix(BOARD_TOPIC_PREFIX) {
                Some(id) if !id.is_empty() => Ok(Topic::Board(BoardId::new(id))),
                _ => Err(format!("unknown topic '{raw}'")),
            },
        }
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum ClientRequest {
    #[serde(rename = "lobby:subscribe")]
    LobbySubscribe,
    #[serde(rename = "lobby:create")]
    CreateBoard { name: String },
    #[serde(rename = "lobby:announce")]
    LobbyAnnounce { message: String },
    #[serde(rename = "roster:subscribe")]
    RosterSubscribe {
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "roster:register")]
    Register { name: String },
    #[serde(rename = "roster:unregister")]
    Unregister,
    #[serde(rename = "roster:announce")]
    RosterAnnounce { message: String },
    #[serde(rename = "board:subscribe")]
    BoardSubscribe { board_id: BoardId },
    #[serde(rename = "board:move")]
    Move { board_id: BoardId, x: usize, y: usize },
    #[serde(rename = "board:announce")]
    BoardAnnounce { board_id: BoardId, message: String },
    #[serde(rename = "board:leave")]
    Leave { board_id: BoardId },
}

impl ClientRequest {
    pub fn action(&self) -> Action {
        match self {
            ClientRequest::LobbySubscribe => Action::LobbySubscribed,
            ClientRequest::CreateBoard { .. } => Action::CreateBoard,
            ClientRequest::LobbyAnnounce { .. } => Action::LobbyAnnounce,
            ClientRequest::RosterSubscribe { .. } => Action::RosterSubscribed,
            ClientRequest::Register { .. } => Action::Register,
            ClientRequest::Unregister => Action::Unregister,
            ClientRequest::RosterAnnounce { .. } => Action::RosterAnnounce,
            ClientRequest::BoardSubscribe { .. } => Action::BoardSubscribed,
            ClientRequest::Move { .. } => Action::Move,
            ClientRequest::BoardAnnounce { .. } => Action::BoardAnnounce,
            ClientRequest::Leave { .. } => Action::Leave,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "lobby:subscribed")]
    LobbySubscribed,
    #[serde(rename = "lobby:create")]
    CreateBoard,
    #[serde(rename = "lobby:announce")]
    LobbyAnnounce,
    #[serde(rename = "roster:subscribed")]
    RosterSubscribed,
    #[serde(rename = "roster:register")]
    Register,
    #[serde(rename = "roster:unregister")]
    Unregister,
    #[serde(rename = "roster:announce")]
    RosterAnnounce,
    #[serde(rename = "board:subscribed")]
    BoardSubscribed,
    #[serde(rename = "board:move")]
    Move,
    #[serde(rename = "board:announce")]
    BoardAnnounce,
    #[serde(rename = "board:leave")]
    Leave,
    #[serde(rename = "board:terminated")]
    BoardTerminated,
    #[serde(rename = "invalid")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Retry,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    MaxNumber,
    DuplicateName,
    InvalidName,
    NotFound,
    NotRegistered,
    NotAllowed,
    InvalidMove,
    BadRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSummary {
    pub board_id: BoardId,
    pub board_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    pub board_id: BoardId,
    pub board_name: String,
    pub seat_x_name: String,
    pub seat_o_name: String,
    pub outcome: Outcome,
    pub state: BoardState,
    pub move_count: u8,
    pub grid: Grid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Board(BoardView),
    Boards {
        boards: Vec<BoardSummary>,
    },
    Roster {
        players: Vec<String>,
        #[serde(default, rename = "nameTaken", skip_serializing_if = "Option::is_none")]
        name_taken: Option<bool>,
    },
    Empty {},
}

/// Result of one action, either sent back to the requester or fanned out to
/// a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: Action,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RetryReason>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    pub fn success(action: Action, payload: Payload) -> Self {
        Self {
            action,
            status: Status::Success,
            message: None,
            reason: None,
            payload,
        }
    }

    pub fn failure(action: Action, error: &ApiError) -> Self {
        Self {
            action,
            status: error.status(),
            message: Some(error.message.clone()),
            reason: error.reason,
            payload: Payload::Empty {},
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
