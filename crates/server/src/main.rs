use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use lobby_api::{Delivery, LobbyContext};
use registry::{Lobby, SystemClock};
use serde::Deserialize;
use shared::{
    domain::PlayerId,
    error::{ApiError, ErrorCode},
    protocol::{Action, ClientRequest, Envelope, RetryReason, Topic},
};
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    StreamMap,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod hub;

use app_state::AppState;
use config::load_settings;
use hub::TopicHub;

type Subscriptions = StreamMap<Topic, BroadcastStream<Envelope>>;
type WsSink = SplitSink<WebSocket, Message>;

#[derive(Debug, Deserialize)]
struct WsQuery {
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let lobby = Lobby::new(settings.lobby_config(), Arc::new(SystemClock));
    let state = AppState::new(LobbyContext { lobby }, settings.event_buffer);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings
        .server_bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.server_bind))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    let session = q
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map(PlayerId::new)
        .unwrap_or_else(PlayerId::generate);
    ws.on_upgrade(move |socket| ws_connection(state, socket, session))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket, session: PlayerId) {
    let sockets = state.sockets.opened(&session);
    info!(%session, sockets, "session connected");
    let (mut sender, mut receiver) = socket.split();
    let mut subscriptions = Subscriptions::new();

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let deliveries = match serde_json::from_str::<ClientRequest>(&text) {
                        Ok(request) => lobby_api::handle(&state.api, &session, request).await,
                        Err(err) => vec![Delivery::Reply(bad_request(&err))],
                    };
                    if dispatch(&state.hub, &mut subscriptions, &mut sender, deliveries)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            Some((topic, event)) = subscriptions.next(), if !subscriptions.is_empty() => {
                match event {
                    Ok(envelope) => {
                        if send_envelope(&mut sender, &envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(%session, %topic, skipped, "subscriber lagged, events dropped");
                    }
                }
            }
        }
    }

    drop(subscriptions);
    state.hub.prune();
    if !state.sockets.closed(&session) {
        info!(%session, "socket closed, session still has others open");
        return;
    }
    for delivery in lobby_api::disconnect(&state.api, &session).await {
        if let Delivery::Broadcast(topic, envelope) = delivery {
            state.hub.publish(&topic, envelope);
        }
    }
    info!(%session, "session disconnected");
}

async fn dispatch(
    hub: &TopicHub,
    subscriptions: &mut Subscriptions,
    sender: &mut WsSink,
    deliveries: Vec<Delivery>,
) -> Result<(), axum::Error> {
    for delivery in deliveries {
        match delivery {
            Delivery::Reply(envelope) => send_envelope(sender, &envelope).await?,
            Delivery::Broadcast(topic, envelope) => {
                let reached = hub.publish(&topic, envelope);
                debug!(%topic, reached, "broadcast");
            }
            Delivery::Subscribe(topic) => {
                if !subscriptions.contains_key(&topic) {
                    let stream = BroadcastStream::new(hub.subscribe(&topic));
                    subscriptions.insert(topic, stream);
                }
            }
            Delivery::Unsubscribe(topic) => {
                subscriptions.remove(&topic);
                hub.prune();
            }
        }
    }
    Ok(())
}

async fn send_envelope(sender: &mut WsSink, envelope: &Envelope) -> Result<(), axum::Error> {
    match serde_json::to_string(envelope) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(err) => {
            warn!(%err, "failed to encode envelope");
            Ok(())
        }
    }
}

fn bad_request(err: &serde_json::Error) -> Envelope {
    Envelope::failure(
        Action::Invalid,
        &ApiError::retry(
            ErrorCode::Validation,
            RetryReason::BadRequest,
            format!("unreadable request: {err}"),
        ),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
