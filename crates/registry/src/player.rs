use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use shared::domain::{BoardId, PlayerId};

use crate::registry::{Entity, ExpiryPolicy, Reapable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub display_name: String,
    boards: BTreeSet<BoardId>,
}

impl PlayerProfile {
    pub fn new(id: PlayerId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            boards: BTreeSet::new(),
        }
    }

    pub fn boards(&self) -> impl Iterator<Item = &BoardId> {
        self.boards.iter()
    }

    pub fn is_member_of(&self, board_id: &BoardId) -> bool {
        self.boards.contains(board_id)
    }

    pub fn join_board(&mut self, board_id: BoardId) -> bool {
        self.boards.insert(board_id)
    }

    pub fn leave_board(&mut self, board_id: &BoardId) -> bool {
        self.boards.remove(board_id)
    }
}

impl Entity for PlayerProfile {
    fn name(&self) -> &str {
        &self.display_name
    }
}

// Players only leave through an explicit delete or the store TTL.
impl Reapable for PlayerProfile {
    fn should_expire(&self, _now: DateTime<Utc>, _policy: &ExpiryPolicy) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memberships_are_a_set() {
        let mut player = PlayerProfile::new(PlayerId::new("p-1"), "Alice");
        assert!(player.join_board(BoardId::new("b-1")));
        assert!(!player.join_board(BoardId::new("b-1")));
        assert!(player.join_board(BoardId::new("b-2")));
        assert_eq!(player.boards().count(), 2);

        assert!(player.leave_board(&BoardId::new("b-1")));
        assert!(!player.is_member_of(&BoardId::new("b-1")));
        assert!(player.is_member_of(&BoardId::new("b-2")));
    }

    #[test]
    fn players_are_never_reaped_by_activity() {
        let player = PlayerProfile::new(PlayerId::new("p-1"), "Alice");
        let far_future = Utc::now() + chrono::Duration::days(365);
        assert!(!player.should_expire(far_future, &ExpiryPolicy::default()));
    }
}
