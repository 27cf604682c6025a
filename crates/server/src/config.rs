use std::{collections::HashMap, fs};

use chrono::Duration;
use registry::LobbyConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub max_entities: usize,
    pub player_ttl_seconds: i64,
    pub board_idle_ttl_seconds: i64,
    pub board_grace_seconds: i64,
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            max_entities: registry::MAX_ENTITIES,
            player_ttl_seconds: 3600,
            board_idle_ttl_seconds: 3600,
            board_grace_seconds: 120,
            event_buffer: 256,
        }
    }
}

impl Settings {
    /// Lifetimes chrono cannot represent fall back to the defaults.
    pub fn lobby_config(&self) -> LobbyConfig {
        let defaults = LobbyConfig::default();
        LobbyConfig {
            max_entities: self.max_entities,
            player_ttl: lifetime(self.player_ttl_seconds, defaults.player_ttl),
            board_idle_ttl: lifetime(self.board_idle_ttl_seconds, defaults.board_idle_ttl),
            board_grace: lifetime(self.board_grace_seconds, defaults.board_grace),
        }
    }
}

fn lifetime(seconds: i64, fallback: Duration) -> Duration {
    Duration::try_seconds(seconds)
        .filter(|ttl| *ttl > Duration::zero())
        .unwrap_or(fallback)
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string("server.toml").ok();
    let settings = apply_file(Settings::default(), file.as_deref());
    apply_env(settings, |key| std::env::var(key).ok())
}

/// Flat `key = value` table; values may be strings or integers.
fn apply_file(mut settings: Settings, raw: Option<&str>) -> Settings {
    let Some(raw) = raw else {
        return settings;
    };
    let Ok(table) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return settings;
    };
    let text = |key: &str| -> Option<String> {
        match table.get(key)? {
            toml::Value::String(v) => Some(v.clone()),
            toml::Value::Integer(v) => Some(v.to_string()),
            _ => None,
        }
    };

    if let Some(v) = text("bind_addr") {
        settings.server_bind = v;
    }
    set_parsed(&mut settings.max_entities, text("max_entities"));
    set_parsed(&mut settings.player_ttl_seconds, text("player_ttl_seconds"));
    set_parsed(
        &mut settings.board_idle_ttl_seconds,
        text("board_idle_ttl_seconds"),
    );
    set_parsed(&mut settings.board_grace_seconds, text("board_grace_seconds"));
    set_parsed(&mut settings.event_buffer, text("event_buffer"));
    settings
}

fn apply_env(mut settings: Settings, var: impl Fn(&str) -> Option<String>) -> Settings {
    if let Some(v) = var("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = var("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    set_parsed(&mut settings.max_entities, var("APP__MAX_ENTITIES"));
    set_parsed(&mut settings.player_ttl_seconds, var("APP__PLAYER_TTL_SECONDS"));
    set_parsed(
        &mut settings.board_idle_ttl_seconds,
        var("APP__BOARD_IDLE_TTL_SECONDS"),
    );
    set_parsed(
        &mut settings.board_grace_seconds,
        var("APP__BOARD_GRACE_SECONDS"),
    );
    set_parsed(&mut settings.event_buffer, var("APP__EVENT_BUFFER"));
    settings
}

/// Every numeric setting is a count or a lifetime, so zero and negatives are
/// ignored along with anything unparsable.
fn set_parsed<T>(slot: &mut T, raw: Option<String>)
where
    T: std::str::FromStr + PartialOrd + Default,
{
    if let Some(parsed) = raw
        .and_then(|v| v.trim().parse().ok())
        .filter(|parsed| *parsed > T::default())
    {
        *slot = parsed;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
