use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use lobby_api::LobbyContext;
use shared::domain::PlayerId;

use crate::hub::TopicHub;

pub(crate) struct AppState {
    pub(crate) api: LobbyContext,
    pub(crate) hub: TopicHub,
    pub(crate) sockets: SocketCounts,
}

impl AppState {
    pub(crate) fn new(api: LobbyContext, event_buffer: usize) -> Self {
        Self {
            api,
            hub: TopicHub::new(event_buffer),
            sockets: SocketCounts::default(),
        }
    }
}

/// Open sockets per session id. A session only leaves the lobby with its
/// last socket.
#[derive(Default)]
pub(crate) struct SocketCounts {
    open: Mutex<HashMap<PlayerId, usize>>,
}

impl SocketCounts {
    /// Returns the number of sockets now open for `session`.
    pub(crate) fn opened(&self, session: &PlayerId) -> usize {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let count = open.entry(session.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// True when that was the session's last socket.
    pub(crate) fn closed(&self, session: &PlayerId) -> bool {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        match open.get_mut(session) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                open.remove(session);
                true
            }
            None => true,
        }
    }
}

#[cfg(test)]
#[path = "tests/app_state_tests.rs"]
mod tests;
