pub mod board;
pub mod board_actor;
pub mod clock;
pub mod lobby;
pub mod names;
pub mod player;
pub mod registry;

pub use board::{BoardSnapshot, GameBoard, MoveError};
pub use board_actor::{BoardChange, BoardError, BoardHandle, JoinOutcome};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use lobby::{Lobby, LobbyConfig, LobbyError, SweepReport};
pub use player::PlayerProfile;
pub use registry::{
    Entity, EntityRegistry, ExpiryPolicy, Reapable, RegistryError, RegistryOptions, MAX_ENTITIES,
};
