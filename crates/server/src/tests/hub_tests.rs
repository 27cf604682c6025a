use super::*;
use shared::{
    domain::BoardId,
    protocol::{Action, Payload},
};

fn envelope(message: &str) -> Envelope {
    Envelope::success(Action::LobbyAnnounce, Payload::Boards { boards: vec![] })
        .with_message(message)
}

#[tokio::test]
async fn subscribers_only_hear_their_topic() {
    let hub = TopicHub::new(8);
    let board = Topic::Board(BoardId::new("b-1"));
    let mut lobby_rx = hub.subscribe(&Topic::Lobby);
    let mut board_rx = hub.subscribe(&board);

    assert_eq!(hub.publish(&Topic::Lobby, envelope("hi")), 1);
    assert_eq!(
        lobby_rx.recv().await.expect("lobby event").message.as_deref(),
        Some("hi")
    );
    assert!(board_rx.try_recv().is_err());
}

#[test]
fn publishing_to_an_unknown_topic_reaches_nobody() {
    let hub = TopicHub::new(8);
    assert_eq!(hub.publish(&Topic::Roster, envelope("anyone?")), 0);
    assert_eq!(hub.topic_count(), 0);
}

#[test]
fn abandoned_topics_are_dropped() {
    let hub = TopicHub::new(8);
    let rx = hub.subscribe(&Topic::Roster);
    drop(rx);
    assert_eq!(hub.topic_count(), 1);
    assert_eq!(hub.publish(&Topic::Roster, envelope("gone")), 0);
    assert_eq!(hub.topic_count(), 0);
}

#[test]
fn topics_without_listeners_are_pruned() {
    let hub = TopicHub::new(8);
    let board = Topic::Board(BoardId::new("b-1"));
    let lobby_rx = hub.subscribe(&Topic::Lobby);
    drop(hub.subscribe(&board));
    assert_eq!(hub.topic_count(), 2);

    assert_eq!(hub.prune(), 1);
    assert_eq!(hub.topic_count(), 1);
    drop(lobby_rx);
}

#[test]
fn subscribing_sweeps_abandoned_topics() {
    let hub = TopicHub::new(8);
    for n in 0..5 {
        drop(hub.subscribe(&Topic::Board(BoardId::new(format!("b-{n}")))));
    }
    let _roster = hub.subscribe(&Topic::Roster);
    assert_eq!(hub.topic_count(), 1);
}
