//! REST mutation API for rooms, users, votes, stories, and canvas nodes.

use std::time::{Duration, UNIX_EPOCH};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        room::{
            ActionResponse, ActivityQuery, ActivityView, CanvasNodeView, CreateNodeRequest,
            CreateRoomRequest, EditUserRequest, EstimationRequest, JoinRoomRequest,
            NextStoryResponse, PickCardRequest, ReactionRequest, RoomSettingsPatch, RoomSnapshot,
            RoomView, SetActiveStoryRequest, UserView, VoteView,
        },
        validation::validate_room_id,
    },
    error::AppError,
    services::{canvas_service, reaction_service, room_service, story_service, voting_service},
    state::SharedState,
};

/// Routes handling every room-scoped mutation and read.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{id}", get(get_room).patch(update_settings))
        .route("/rooms/{id}/join", post(join_room))
        .route("/users/{id}", patch(edit_user).delete(leave_room))
        .route(
            "/rooms/{id}/users/{user_id}/vote",
            post(pick_card).delete(remove_card),
        )
        .route("/rooms/{id}/show", post(show_cards))
        .route("/rooms/{id}/reset", post(reset_game))
        .route("/rooms/{id}/active-story", put(set_active_story))
        .route("/rooms/{id}/estimation", post(submit_estimation))
        .route("/rooms/{id}/skip", post(skip_story))
        .route("/rooms/{id}/users/{user_id}/reaction", post(send_reaction))
        .route("/rooms/{id}/activities", get(get_activities))
        .route("/rooms/{id}/nodes", post(create_node).get(list_nodes))
}

fn checked_room_id(id: &str) -> Result<(), AppError> {
    validate_room_id(id).map_err(|err| AppError::BadRequest(err.to_string()))
}

/// Create a room with a generated slug.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomView)
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreateRoomRequest>,
) -> Result<Json<RoomView>, AppError> {
    payload.validate()?;
    let view = room_service::create_room(&state, payload).await?;
    Ok(Json(view))
}

/// Fetch the authoritative snapshot of a room.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room slug")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshot),
        (status = 404, description = "Room not found")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RoomSnapshot>, AppError> {
    checked_room_id(&id)?;
    let snapshot = room_service::get_room(&state, &id).await?;
    Ok(Json(snapshot))
}

/// Apply a partial settings update to a room.
#[utoipa::path(
    patch,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = String, Path, description = "Room slug")),
    request_body = RoomSettingsPatch,
    responses(
        (status = 200, description = "Settings updated", body = RoomView)
    )
)]
pub async fn update_settings(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<RoomSettingsPatch>,
) -> Result<Json<RoomView>, AppError> {
    checked_room_id(&id)?;
    let view = room_service::update_settings(&state, &id, payload).await?;
    Ok(Json(view))
}

/// Join a room, creating the user.
#[utoipa::path(
    post,
    path = "/rooms/{id}/join",
    tag = "users",
    params(("id" = String, Path, description = "Room slug")),
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "User joined", body = UserView),
        (status = 401, description = "Wrong room password")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<UserView>, AppError> {
    checked_room_id(&id)?;
    payload.validate()?;
    let user = room_service::join_user(&state, &id, payload).await?;
    Ok(Json(user))
}

/// Rename a user or toggle its spectator flag.
#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User identifier")),
    request_body = EditUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserView)
    )
)]
pub async fn edit_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditUserRequest>,
) -> Result<Json<UserView>, AppError> {
    payload.validate()?;
    let user = room_service::edit_user(&state, id, payload).await?;
    Ok(Json(user.into()))
}

/// Remove a user from its room, cascading to the user's vote.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User identifier")),
    responses(
        (status = 200, description = "User removed", body = ActionResponse)
    )
)]
pub async fn leave_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    room_service::leave_user(&state, id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Record (or replace) a user's vote for the current round.
#[utoipa::path(
    post,
    path = "/rooms/{id}/users/{user_id}/vote",
    tag = "voting",
    params(
        ("id" = String, Path, description = "Room slug"),
        ("user_id" = Uuid, Path, description = "Voting user")
    ),
    request_body = PickCardRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteView),
        (status = 400, description = "Card does not belong to the deck")
    )
)]
pub async fn pick_card(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(String, Uuid)>,
    Json(payload): Json<PickCardRequest>,
) -> Result<Json<VoteView>, AppError> {
    checked_room_id(&id)?;
    payload.validate()?;
    let outcome = voting_service::pick_card(&state, &id, user_id, payload).await?;
    Ok(Json(VoteView::sanitized(&outcome.vote)))
}

/// Withdraw a user's vote.
#[utoipa::path(
    delete,
    path = "/rooms/{id}/users/{user_id}/vote",
    tag = "voting",
    params(
        ("id" = String, Path, description = "Room slug"),
        ("user_id" = Uuid, Path, description = "Voting user")
    ),
    responses(
        (status = 200, description = "Vote withdrawn", body = ActionResponse)
    )
)]
pub async fn remove_card(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(String, Uuid)>,
) -> Result<Json<ActionResponse>, AppError> {
    checked_room_id(&id)?;
    voting_service::remove_card(&state, &id, user_id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Reveal the current round.
#[utoipa::path(
    post,
    path = "/rooms/{id}/show",
    tag = "voting",
    params(("id" = String, Path, description = "Room slug")),
    responses(
        (status = 200, description = "Cards revealed", body = ActionResponse)
    )
)]
pub async fn show_cards(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    checked_room_id(&id)?;
    voting_service::show_cards(&state, &id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Start a fresh round.
#[utoipa::path(
    post,
    path = "/rooms/{id}/reset",
    tag = "voting",
    params(("id" = String, Path, description = "Room slug")),
    responses(
        (status = 200, description = "Round reset", body = ActionResponse)
    )
)]
pub async fn reset_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    checked_room_id(&id)?;
    voting_service::reset_game(&state, &id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Point the room at another story node.
#[utoipa::path(
    put,
    path = "/rooms/{id}/active-story",
    tag = "stories",
    params(("id" = String, Path, description = "Room slug")),
    request_body = SetActiveStoryRequest,
    responses(
        (status = 200, description = "Active story changed", body = ActionResponse),
        (status = 404, description = "Story node not found")
    )
)]
pub async fn set_active_story(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<SetActiveStoryRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    checked_room_id(&id)?;
    story_service::set_active_story(&state, &id, payload.node_id).await?;
    Ok(Json(ActionResponse::ok()))
}

/// Record the consensus estimate on the active story and rotate to the next.
#[utoipa::path(
    post,
    path = "/rooms/{id}/estimation",
    tag = "stories",
    params(("id" = String, Path, description = "Room slug")),
    request_body = EstimationRequest,
    responses(
        (status = 200, description = "Story estimated", body = NextStoryResponse),
        (status = 409, description = "No active story")
    )
)]
pub async fn submit_estimation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<EstimationRequest>,
) -> Result<Json<NextStoryResponse>, AppError> {
    checked_room_id(&id)?;
    payload.validate()?;
    let next = story_service::submit_estimation(&state, &id, payload.estimate).await?;
    Ok(Json(NextStoryResponse {
        next_story_node_id: next,
    }))
}

/// Skip the active story and rotate to the next.
#[utoipa::path(
    post,
    path = "/rooms/{id}/skip",
    tag = "stories",
    params(("id" = String, Path, description = "Room slug")),
    responses(
        (status = 200, description = "Story skipped", body = NextStoryResponse),
        (status = 409, description = "No active story")
    )
)]
pub async fn skip_story(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<NextStoryResponse>, AppError> {
    checked_room_id(&id)?;
    let next = story_service::skip_story(&state, &id).await?;
    Ok(Json(NextStoryResponse {
        next_story_node_id: next,
    }))
}

/// Record a reaction on the user's durable trace, enforcing the cooldown.
#[utoipa::path(
    post,
    path = "/rooms/{id}/users/{user_id}/reaction",
    tag = "users",
    params(
        ("id" = String, Path, description = "Room slug"),
        ("user_id" = Uuid, Path, description = "Reacting user")
    ),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Reaction recorded", body = UserView),
        (status = 429, description = "Reaction cooldown active")
    )
)]
pub async fn send_reaction(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(String, Uuid)>,
    Json(payload): Json<ReactionRequest>,
) -> Result<Json<UserView>, AppError> {
    checked_room_id(&id)?;
    payload.validate()?;
    let user =
        reaction_service::record_reaction(&state, &id, user_id, payload.emoji_type).await?;
    Ok(Json(user.into()))
}

/// Activities of a room, optionally limited to entries after `since`.
#[utoipa::path(
    get,
    path = "/rooms/{id}/activities",
    tag = "rooms",
    params(
        ("id" = String, Path, description = "Room slug"),
        ("since" = Option<u64>, Query, description = "Milliseconds since epoch")
    ),
    responses(
        (status = 200, description = "Activity log", body = [ActivityView])
    )
)]
pub async fn get_activities(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityView>>, AppError> {
    checked_room_id(&id)?;
    let since = query
        .since
        .map(|millis| UNIX_EPOCH + Duration::from_millis(millis));
    let activities = room_service::get_recent_activities(&state, &id, since).await?;
    Ok(Json(activities))
}

/// Place a new node on the room's canvas.
#[utoipa::path(
    post,
    path = "/rooms/{id}/nodes",
    tag = "canvas",
    params(("id" = String, Path, description = "Room slug")),
    request_body = CreateNodeRequest,
    responses(
        (status = 200, description = "Node created", body = CanvasNodeView),
        (status = 409, description = "Node key already in use")
    )
)]
pub async fn create_node(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<CreateNodeRequest>,
) -> Result<Json<CanvasNodeView>, AppError> {
    checked_room_id(&id)?;
    payload.validate()?;
    let node = canvas_service::create_node(&state, &id, payload).await?;
    Ok(Json(node))
}

/// All nodes of a room, in creation order.
#[utoipa::path(
    get,
    path = "/rooms/{id}/nodes",
    tag = "canvas",
    params(("id" = String, Path, description = "Room slug")),
    responses(
        (status = 200, description = "Canvas nodes", body = [CanvasNodeView])
    )
)]
pub async fn list_nodes(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CanvasNodeView>>, AppError> {
    checked_room_id(&id)?;
    let nodes = canvas_service::list_nodes(&state, &id).await?;
    Ok(Json(nodes))
}
