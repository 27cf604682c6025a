use registry::{BoardError, BoardSnapshot, Lobby, LobbyError, MoveError, RegistryError};
use shared::{
    domain::{BoardId, PlayerId, Role},
    error::{ApiError, ErrorCode},
    protocol::{
        Action, BoardSummary, BoardView, ClientRequest, Envelope, Payload, RetryReason, Topic,
    },
};
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct LobbyContext {
    pub lobby: Lobby,
}

/// Where an envelope goes, plus topic membership changes for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Reply(Envelope),
    Broadcast(Topic, Envelope),
    Subscribe(Topic),
    Unsubscribe(Topic),
}

/// Runs one request for `session`. Failures become a reply to the requester;
/// nothing here is fatal to the session.
pub async fn handle(
    ctx: &LobbyContext,
    session: &PlayerId,
    request: ClientRequest,
) -> Vec<Delivery> {
    let mut deliveries = sweep(ctx).await;
    let action = request.action();
    let result = match request {
        ClientRequest::LobbySubscribe => Ok(lobby_subscribe(ctx)),
        ClientRequest::CreateBoard { name } => create_board(ctx, &name).await,
        ClientRequest::LobbyAnnounce { message } => Ok(lobby_announce(ctx, message)),
        ClientRequest::RosterSubscribe { name } => Ok(roster_subscribe(ctx, name.as_deref())),
        ClientRequest::Register { name } => register(ctx, session, &name),
        ClientRequest::Unregister => Ok(unregister(ctx, session).await),
        ClientRequest::RosterAnnounce { message } => Ok(roster_announce(ctx, message)),
        ClientRequest::BoardSubscribe { board_id } => {
            board_subscribe(ctx, session, &board_id).await
        }
        ClientRequest::Move { board_id, x, y } => play(ctx, session, &board_id, x, y).await,
        ClientRequest::BoardAnnounce { board_id, message } => {
            board_announce(ctx, session, &board_id, message).await
        }
        ClientRequest::Leave { board_id } => leave(ctx, session, &board_id).await,
    };

    match result {
        Ok(mut produced) => deliveries.append(&mut produced),
        Err(err) => {
            if err.code == ErrorCode::Internal {
                error!(%session, ?action, message = %err.message, "request failed");
            } else {
                debug!(%session, ?action, message = %err.message, "request needs a retry");
            }
            deliveries.push(Delivery::Reply(Envelope::failure(action, &err)));
        }
    }
    deliveries
}

/// A closed socket counts as an explicit unregister.
pub async fn disconnect(ctx: &LobbyContext, session: &PlayerId) -> Vec<Delivery> {
    let mut deliveries = sweep(ctx).await;
    let Some(terminated) = ctx.lobby.unregister_player(session).await else {
        return deliveries;
    };
    info!(%session, "session left the roster on disconnect");
    deliveries.extend(terminated_boards(ctx, &terminated));
    deliveries.push(Delivery::Broadcast(
        Topic::Roster,
        Envelope::success(Action::Unregister, roster_payload(ctx, None)),
    ));
    deliveries
}

/// Board view with seat names resolved; names of departed players are blank.
pub fn board_view(ctx: &LobbyContext, snapshot: &BoardSnapshot) -> BoardView {
    let name_of = |seat: &Option<PlayerId>| {
        seat.as_ref()
            .and_then(|id| ctx.lobby.display_name(id))
            .unwrap_or_default()
    };
    BoardView {
        board_id: snapshot.id.clone(),
        board_name: snapshot.name.clone(),
        seat_x_name: name_of(&snapshot.seat_x),
        seat_o_name: name_of(&snapshot.seat_o),
        outcome: snapshot.outcome,
        state: snapshot.state,
        move_count: snapshot.move_count,
        grid: snapshot.grid,
        player_role: None,
        player_name: None,
    }
}

pub fn boards_payload(ctx: &LobbyContext) -> Payload {
    Payload::Boards {
        boards: ctx
            .lobby
            .board_list()
            .into_iter()
            .map(|(board_id, board_name)| BoardSummary {
                board_id,
                board_name,
            })
            .collect(),
    }
}

fn roster_payload(ctx: &LobbyContext, name_taken: Option<bool>) -> Payload {
    Payload::Roster {
        players: ctx.lobby.player_names(),
        name_taken,
    }
}

async fn sweep(ctx: &LobbyContext) -> Vec<Delivery> {
    let report = ctx.lobby.sweep().await;
    let mut deliveries = terminated_boards(ctx, &report.terminated);
    if !report.expired_players.is_empty() {
        deliveries.push(Delivery::Broadcast(
            Topic::Roster,
            Envelope::success(Action::Unregister, roster_payload(ctx, None)),
        ));
    }
    if !report.reaped_boards.is_empty() {
        deliveries.push(Delivery::Broadcast(
            Topic::Lobby,
            Envelope::success(Action::LobbySubscribed, boards_payload(ctx)),
        ));
    }
    deliveries
}

fn terminated_boards(ctx: &LobbyContext, snapshots: &[BoardSnapshot]) -> Vec<Delivery> {
    snapshots
        .iter()
        .map(|snapshot| {
            Delivery::Broadcast(
                Topic::Board(snapshot.id.clone()),
                Envelope::success(
                    Action::BoardTerminated,
                    Payload::Board(board_view(ctx, snapshot)),
                )
                .with_message(format!("{} was abandoned.", snapshot.name)),
            )
        })
        .collect()
}

fn lobby_subscribe(ctx: &LobbyContext) -> Vec<Delivery> {
    vec![
        Delivery::Subscribe(Topic::Lobby),
        Delivery::Reply(Envelope::success(
            Action::LobbySubscribed,
            boards_payload(ctx),
        )),
    ]
}

async fn create_board(ctx: &LobbyContext, name: &str) -> Result<Vec<Delivery>, ApiError> {
    let snapshot = ctx.lobby.create_board(name).await.map_err(api_error)?;
    info!(board_id = %snapshot.id, name = %snapshot.name, "board created");
    Ok(vec![
        Delivery::Reply(
            Envelope::success(
                Action::CreateBoard,
                Payload::Board(board_view(ctx, &snapshot)),
            )
            .with_message(format!("{} has been created successfully.", snapshot.name)),
        ),
        Delivery::Broadcast(
            Topic::Lobby,
            Envelope::success(Action::CreateBoard, boards_payload(ctx)),
        ),
    ])
}

fn lobby_announce(ctx: &LobbyContext, message: String) -> Vec<Delivery> {
    vec![Delivery::Broadcast(
        Topic::Lobby,
        Envelope::success(Action::LobbyAnnounce, boards_payload(ctx)).with_message(message),
    )]
}

fn roster_subscribe(ctx: &LobbyContext, name: Option<&str>) -> Vec<Delivery> {
    let name_taken = name.map(|name| ctx.lobby.player_name_taken(name));
    vec![
        Delivery::Subscribe(Topic::Roster),
        Delivery::Reply(Envelope::success(
            Action::RosterSubscribed,
            roster_payload(ctx, name_taken),
        )),
    ]
}

fn register(
    ctx: &LobbyContext,
    session: &PlayerId,
    name: &str,
) -> Result<Vec<Delivery>, ApiError> {
    let name = ctx
        .lobby
        .register_player(session, name)
        .map_err(api_error)?;
    Ok(vec![
        Delivery::Reply(
            Envelope::success(Action::Register, roster_payload(ctx, None))
                .with_message(format!("{name} has been registered successfully.")),
        ),
        Delivery::Broadcast(
            Topic::Roster,
            Envelope::success(Action::Register, roster_payload(ctx, None)),
        ),
    ])
}

async fn unregister(ctx: &LobbyContext, session: &PlayerId) -> Vec<Delivery> {
    let terminated = ctx
        .lobby
        .unregister_player(session)
        .await
        .unwrap_or_default();
    let mut deliveries = terminated_boards(ctx, &terminated);
    deliveries.push(Delivery::Reply(Envelope::success(
        Action::Unregister,
        roster_payload(ctx, None),
    )));
    deliveries.push(Delivery::Broadcast(
        Topic::Roster,
        Envelope::success(Action::Unregister, roster_payload(ctx, None)),
    ));
    deliveries
}

fn roster_announce(ctx: &LobbyContext, message: String) -> Vec<Delivery> {
    vec![Delivery::Broadcast(
        Topic::Roster,
        Envelope::success(Action::RosterAnnounce, roster_payload(ctx, None)).with_message(message),
    )]
}

async fn board_subscribe(
    ctx: &LobbyContext,
    session: &PlayerId,
    board_id: &BoardId,
) -> Result<Vec<Delivery>, ApiError> {
    let joined = ctx
        .lobby
        .join_board(board_id, session)
        .await
        .map_err(api_error)?;
    let topic = Topic::Board(board_id.clone());
    let view = board_view(ctx, &joined.snapshot);
    let mut personal = view.clone();
    personal.player_role = Some(joined.role);
    personal.player_name = ctx.lobby.display_name(session);

    let mut deliveries = vec![
        Delivery::Subscribe(topic.clone()),
        Delivery::Reply(
            Envelope::success(Action::BoardSubscribed, Payload::Board(personal))
                .with_message(format!("Successfully subscribed to {}", view.board_name)),
        ),
    ];
    if joined.role.is_seated() {
        deliveries.push(Delivery::Broadcast(
            topic,
            Envelope::success(Action::BoardSubscribed, Payload::Board(view)),
        ));
    }
    Ok(deliveries)
}

async fn play(
    ctx: &LobbyContext,
    session: &PlayerId,
    board_id: &BoardId,
    x: usize,
    y: usize,
) -> Result<Vec<Delivery>, ApiError> {
    let snapshot = ctx
        .lobby
        .play(board_id, session, x, y)
        .await
        .map_err(api_error)?;
    Ok(vec![Delivery::Broadcast(
        Topic::Board(board_id.clone()),
        Envelope::success(Action::Move, Payload::Board(board_view(ctx, &snapshot))),
    )])
}

async fn board_announce(
    ctx: &LobbyContext,
    session: &PlayerId,
    board_id: &BoardId,
    message: String,
) -> Result<Vec<Delivery>, ApiError> {
    let handle = ctx
        .lobby
        .board(board_id)
        .ok_or_else(|| api_error(LobbyError::BoardNotFound(board_id.clone())))?;
    let snapshot = handle.snapshot().await.map_err(|err| api_error(err.into()))?;
    let role = [(Role::X, &snapshot.seat_x), (Role::O, &snapshot.seat_o)]
        .into_iter()
        .find(|(_, seat)| seat.as_ref() == Some(session))
        .map_or(Role::Viewer, |(role, _)| role);

    let mut view = board_view(ctx, &snapshot);
    view.player_role = Some(role);
    view.player_name = Some(ctx.lobby.display_name(session).unwrap_or_default());
    Ok(vec![Delivery::Broadcast(
        Topic::Board(board_id.clone()),
        Envelope::success(Action::BoardAnnounce, Payload::Board(view)).with_message(message),
    )])
}

async fn leave(
    ctx: &LobbyContext,
    session: &PlayerId,
    board_id: &BoardId,
) -> Result<Vec<Delivery>, ApiError> {
    let topic = Topic::Board(board_id.clone());
    let change = match ctx.lobby.leave_board(board_id, session).await {
        Ok(change) => change,
        Err(LobbyError::BoardNotFound(_)) => {
            return Ok(vec![
                Delivery::Unsubscribe(topic),
                Delivery::Reply(Envelope::success(Action::Leave, Payload::Empty {})),
            ])
        }
        Err(err) => return Err(api_error(err)),
    };

    let view = board_view(ctx, &change.snapshot);
    let mut deliveries = vec![
        Delivery::Unsubscribe(topic.clone()),
        Delivery::Reply(Envelope::success(Action::Leave, Payload::Board(view.clone()))),
    ];
    if change.changed {
        deliveries.push(Delivery::Broadcast(
            topic,
            Envelope::success(Action::BoardTerminated, Payload::Board(view))
                .with_message(format!("{} was abandoned.", change.snapshot.name)),
        ));
    }
    Ok(deliveries)
}

fn api_error(err: LobbyError) -> ApiError {
    let message = err.to_string();
    match err {
        LobbyError::Registry(RegistryError::Duplicate(name)) => ApiError::retry(
            ErrorCode::Validation,
            RetryReason::DuplicateName,
            format!("The name {name} exists. Choose another."),
        ),
        LobbyError::Registry(RegistryError::CapacityExceeded(max)) => ApiError::retry(
            ErrorCode::Validation,
            RetryReason::MaxNumber,
            format!("No more than {max} can exist at once. Try again later."),
        ),
        LobbyError::Registry(RegistryError::InvalidName) => {
            ApiError::retry(ErrorCode::Validation, RetryReason::InvalidName, message)
        }
        LobbyError::Registry(RegistryError::IdTaken(_)) => ApiError::retry(
            ErrorCode::Conflict,
            RetryReason::DuplicateName,
            "This session already has a registered name.",
        ),
        LobbyError::Registry(RegistryError::NotFound(_)) | LobbyError::BoardNotFound(_) => {
            ApiError::retry(
                ErrorCode::NotFound,
                RetryReason::NotFound,
                "The board might be deleted. Choose another or create.",
            )
        }
        LobbyError::NotRegistered(_) => ApiError::retry(
            ErrorCode::Validation,
            RetryReason::NotRegistered,
            "Register a name before joining a board.",
        ),
        LobbyError::Board(BoardError::Move(MoveError::NotSeated | MoveError::NotAllowed)) => {
            ApiError::retry(ErrorCode::Validation, RetryReason::NotAllowed, message)
        }
        LobbyError::Board(BoardError::Move(_)) => {
            ApiError::retry(ErrorCode::Validation, RetryReason::InvalidMove, message)
        }
        LobbyError::Board(BoardError::Closed(_)) => ApiError::internal(message),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
