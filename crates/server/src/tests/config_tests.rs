use super::{apply_env, apply_file, Settings};

use std::collections::HashMap;

use chrono::Duration;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_match_the_lobby_limits() {
    let settings = Settings::default();
    assert_eq!(settings.server_bind, "127.0.0.1:3000");
    assert_eq!(settings.max_entities, 20);

    let lobby = settings.lobby_config();
    assert_eq!(lobby.player_ttl, Duration::hours(1));
    assert_eq!(lobby.board_idle_ttl, Duration::hours(1));
    assert_eq!(lobby.board_grace, Duration::minutes(2));
}

#[test]
fn file_values_accept_strings_and_integers() {
    let settings = apply_file(
        Settings::default(),
        Some("bind_addr = \"0.0.0.0:9000\"\nmax_entities = 5\nboard_grace_seconds = \"30\"\n"),
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.max_entities, 5);
    assert_eq!(settings.board_grace_seconds, 30);
    assert_eq!(settings.event_buffer, 256);
}

#[test]
fn unreadable_files_keep_the_defaults() {
    assert_eq!(apply_file(Settings::default(), None), Settings::default());
    assert_eq!(
        apply_file(Settings::default(), Some("not = [valid")),
        Settings::default()
    );
}

#[test]
fn app_prefixed_bind_wins_over_server_bind() {
    let settings = apply_env(
        Settings::default(),
        env(&[
            ("SERVER_BIND", "127.0.0.1:4000"),
            ("APP__BIND_ADDR", "127.0.0.1:5000"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:5000");
}

#[test]
fn numeric_overrides_ignore_garbage() {
    let settings = apply_env(
        Settings::default(),
        env(&[
            ("APP__MAX_ENTITIES", "8"),
            ("APP__PLAYER_TTL_SECONDS", "soon"),
            ("APP__EVENT_BUFFER", " 64 "),
        ]),
    );
    assert_eq!(settings.max_entities, 8);
    assert_eq!(settings.player_ttl_seconds, 3600);
    assert_eq!(settings.event_buffer, 64);
}

#[test]
fn zero_and_negative_overrides_are_ignored() {
    let settings = apply_env(
        Settings::default(),
        env(&[
            ("APP__PLAYER_TTL_SECONDS", "-5"),
            ("APP__BOARD_GRACE_SECONDS", "0"),
            ("APP__MAX_ENTITIES", "0"),
        ]),
    );
    assert_eq!(settings, Settings::default());
}

#[test]
fn lifetimes_chrono_cannot_hold_fall_back_to_defaults() {
    let settings = apply_env(
        Settings::default(),
        env(&[
            ("APP__PLAYER_TTL_SECONDS", "9223372036854775807"),
            ("APP__BOARD_IDLE_TTL_SECONDS", "7200"),
        ]),
    );
    assert_eq!(settings.player_ttl_seconds, i64::MAX);

    let lobby = settings.lobby_config();
    assert_eq!(lobby.player_ttl, Duration::hours(1));
    assert_eq!(lobby.board_idle_ttl, Duration::hours(2));
}
