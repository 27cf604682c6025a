use super::*;
use axum::{body, body::Body, http::Request, http::StatusCode};
use registry::LobbyConfig;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_state() -> Arc<AppState> {
    let lobby = Lobby::new(LobbyConfig::default(), Arc::new(SystemClock));
    Arc::new(AppState::new(LobbyContext { lobby }, 32))
}

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(test_state());
    tokio::spawn(async move { axum::serve(listener, app).await });
    addr
}

async fn connect(addr: SocketAddr, session: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws?session_id={session}"))
        .await
        .expect("connect");
    ws
}

async fn send(ws: &mut Client, request: Value) {
    ws.send(WsMessage::Text(request.to_string()))
        .await
        .expect("send");
}

/// Reads envelopes until one carries `action`.
async fn expect_action(ws: &mut Client, action: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(message) = ws.next().await {
            if let WsMessage::Text(text) = message.expect("frame") {
                let envelope: Value = serde_json::from_str(&text).expect("json");
                if envelope["action"] == action {
                    return envelope;
                }
            }
        }
        panic!("socket closed before {action}");
    })
    .await
    .expect("timed out waiting for envelope")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_router(test_state());
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn websocket_route_requires_an_upgrade() {
    let app = build_router(test_state());
    let request = Request::get("/ws?session_id=abc")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn unreadable_requests_get_a_bad_request_retry() {
    let addr = spawn_server().await;
    let mut ws = connect(addr, "s-garbage").await;
    send(&mut ws, json!({ "action": "board:fly", "payload": {} })).await;

    let reply = expect_action(&mut ws, "invalid").await;
    assert_eq!(reply["status"], "retry");
    assert_eq!(reply["reason"], "bad_request");
}

#[tokio::test]
async fn two_sessions_play_and_a_disconnect_ends_the_game() {
    let addr = spawn_server().await;
    let mut ann = connect(addr, "s-ann").await;
    let mut ben = connect(addr, "s-ben").await;

    send(&mut ann, json!({ "action": "roster:register", "payload": { "name": "Ann" } })).await;
    let registered = expect_action(&mut ann, "roster:register").await;
    assert_eq!(registered["status"], "success");
    send(&mut ben, json!({ "action": "roster:register", "payload": { "name": "Ben" } })).await;
    expect_action(&mut ben, "roster:register").await;

    send(&mut ann, json!({ "action": "lobby:create", "payload": { "name": "Arena" } })).await;
    let created = expect_action(&mut ann, "lobby:create").await;
    let board_id = created["boardId"].as_str().expect("board id").to_string();

    send(
        &mut ann,
        json!({ "action": "board:subscribe", "payload": { "board_id": board_id } }),
    )
    .await;
    let seated = expect_action(&mut ann, "board:subscribed").await;
    assert_eq!(seated["playerRole"], "x");

    send(
        &mut ben,
        json!({ "action": "board:subscribe", "payload": { "board_id": board_id } }),
    )
    .await;
    let seated = expect_action(&mut ben, "board:subscribed").await;
    assert_eq!(seated["playerRole"], "o");
    assert_eq!(seated["state"], "ongoing");

    send(
        &mut ann,
        json!({ "action": "board:move", "payload": { "board_id": board_id, "x": 0, "y": 0 } }),
    )
    .await;
    let moved = expect_action(&mut ben, "board:move").await;
    assert_eq!(moved["moveCount"], 1);
    assert_eq!(moved["grid"][0][0], "x");
    assert_eq!(moved["seatXName"], "Ann");

    ann.close(None).await.expect("close");
    let ended = expect_action(&mut ben, "board:terminated").await;
    assert_eq!(ended["boardId"], board_id.as_str());
    assert_eq!(ended["state"], "terminated");
}

#[tokio::test]
async fn a_session_survives_until_its_last_socket_closes() {
    let addr = spawn_server().await;
    let mut first = connect(addr, "s-ann").await;
    let mut second = connect(addr, "s-ann").await;
    let mut ben = connect(addr, "s-ben").await;

    send(&mut first, json!({ "action": "roster:register", "payload": { "name": "Ann" } })).await;
    expect_action(&mut first, "roster:register").await;
    send(&mut ben, json!({ "action": "roster:subscribe", "payload": { "name": "Ann" } })).await;
    expect_action(&mut ben, "roster:subscribed").await;

    first.close(None).await.expect("close");
    tokio::time::sleep(Duration::from_millis(200)).await;
    send(&mut second, json!({ "action": "roster:subscribe", "payload": { "name": "Ann" } })).await;
    let roster = expect_action(&mut second, "roster:subscribed").await;
    assert_eq!(roster["nameTaken"], true);
    assert_eq!(roster["players"], json!(["Ann"]));

    second.close(None).await.expect("close");
    let left = expect_action(&mut ben, "roster:unregister").await;
    assert_eq!(left["players"], json!([]));
}
