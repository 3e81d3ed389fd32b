//! Room lifecycle and membership operations.

use std::time::SystemTime;

use rand::Rng;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{ActivityEntity, RoomEntity, RoomSettingsUpdate, UserEntity},
    dto::{
        room::{
            ActivityView, CreateRoomRequest, EditUserRequest, JoinRoomRequest, RoomSettingsPatch,
            RoomSnapshot, RoomView, UserView,
        },
        ws::RelayOutboundMessage,
    },
    error::ServiceError,
    state::SharedState,
};

const SLUG_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SLUG_GROUPS: usize = 3;
const SLUG_GROUP_LEN: usize = 4;
const SLUG_ATTEMPTS: usize = 8;

/// Create a room with a freshly generated slug.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomView, ServiceError> {
    let store = state.require_room_store().await?;

    let mut slug = generate_slug();
    let mut attempts = 1;
    while store.find_room(slug.clone()).await?.is_some() {
        if attempts >= SLUG_ATTEMPTS {
            return Err(ServiceError::InvalidState(
                "could not allocate a unique room id".into(),
            ));
        }
        slug = generate_slug();
        attempts += 1;
    }

    let now = SystemTime::now();
    let room = RoomEntity {
        id: slug,
        name: request.name,
        voting_system: request.voting_system,
        voting_categorized: request.voting_categorized,
        auto_complete_voting: request.auto_complete_voting,
        room_type: request.room_type,
        is_game_over: false,
        active_story_node_id: None,
        created_at: now,
        last_activity_at: now,
        owner_id: request.owner_id,
        password_hash: request.password_hash,
    };

    store.save_room(room.clone()).await?;
    store
        .append_activity(activity(
            &room.id,
            None,
            None,
            "room_created",
            format!("Room \"{}\" was created", room.name),
        ))
        .await?;

    info!(room_id = %room.id, "room created");
    Ok(room.into())
}

/// Load a full room snapshot, sanitizing votes while the round is running.
pub async fn get_room(state: &SharedState, room_id: &str) -> Result<RoomSnapshot, ServiceError> {
    let store = state.require_room_store().await?;

    let room = require_room(state, room_id).await?;
    let users = store.find_users_by_room(room_id.to_owned()).await?;
    let votes = store.find_votes_by_room(room_id.to_owned()).await?;

    Ok(RoomSnapshot::assemble(room, users, votes))
}

/// Add a user to a room, enforcing the password when the room carries one.
pub async fn join_user(
    state: &SharedState,
    room_id: &str,
    request: JoinRoomRequest,
) -> Result<UserView, ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    if let Some(expected) = &room.password_hash {
        let supplied = request.password_hash.as_deref().unwrap_or_default();
        if supplied != expected {
            return Err(ServiceError::Unauthorized("wrong room password".into()));
        }
    }

    let now = SystemTime::now();
    let user = UserEntity {
        id: Uuid::new_v4(),
        room_id: room.id.clone(),
        name: request.name,
        is_spectator: request.is_spectator,
        joined_at: now,
        last_reaction_type: None,
        last_reaction_at: None,
    };

    store.save_user(user.clone()).await?;
    store.touch_room(room.id.clone(), now).await?;
    store
        .append_activity(activity(
            &room.id,
            Some(user.id),
            Some(&user.name),
            "user_joined",
            format!("{} joined the room", user.name),
        ))
        .await?;

    info!(room_id = %room.id, user_id = %user.id, "user joined");
    Ok(user.into())
}

/// Record a relay channel join durably: bump the room's activity clock and
/// make sure the announced user has a membership record.
///
/// Called off the relay hot path; the user normally already exists from the
/// HTTP join, in which case only the room timestamp moves.
pub async fn record_join(
    state: &SharedState,
    room_id: &str,
    user_id: Uuid,
    user_name: &str,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    let now = SystemTime::now();
    if store.find_user(user_id).await?.is_none() {
        store
            .save_user(UserEntity {
                id: user_id,
                room_id: room.id.clone(),
                name: user_name.to_owned(),
                is_spectator: false,
                joined_at: now,
                last_reaction_type: None,
                last_reaction_at: None,
            })
            .await?;
        store
            .append_activity(activity(
                &room.id,
                Some(user_id),
                Some(user_name),
                "user_joined",
                format!("{user_name} joined the room"),
            ))
            .await?;
    }
    store.touch_room(room.id, now).await?;
    Ok(())
}

/// Rename a user or toggle its spectator flag.
pub async fn edit_user(
    state: &SharedState,
    user_id: Uuid,
    request: EditUserRequest,
) -> Result<UserEntity, ServiceError> {
    let store = state.require_room_store().await?;

    let mut user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user `{user_id}` not found")))?;

    if let Some(name) = request.name {
        user.name = name;
    }
    if let Some(is_spectator) = request.is_spectator {
        user.is_spectator = is_spectator;
    }

    store.save_user(user.clone()).await?;
    store
        .touch_room(user.room_id.clone(), SystemTime::now())
        .await?;

    // Peers learn about renames and spectator toggles without a refetch.
    state.channels().broadcast(
        &user.room_id,
        None,
        &RelayOutboundMessage::UserUpdated {
            user: user.clone().into(),
        },
    );

    Ok(user)
}

/// Remove a user from its room, cascading to the user's vote.
///
/// Returns the removed user so callers can announce the departure.
pub async fn leave_user(state: &SharedState, user_id: Uuid) -> Result<UserEntity, ServiceError> {
    let store = state.require_room_store().await?;

    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user `{user_id}` not found")))?;

    store.delete_user_cascade(user_id).await?;
    let now = SystemTime::now();
    store.touch_room(user.room_id.clone(), now).await?;
    store
        .append_activity(activity(
            &user.room_id,
            Some(user.id),
            Some(&user.name),
            "user_left",
            format!("{} left the room", user.name),
        ))
        .await?;

    info!(room_id = %user.room_id, user_id = %user.id, "user left");
    Ok(user)
}

/// Apply a partial settings update to a room.
///
/// The write goes through a dedicated settings patch so a concurrent reveal or
/// story change is never overwritten with stale round state.
pub async fn update_settings(
    state: &SharedState,
    room_id: &str,
    patch: RoomSettingsPatch,
) -> Result<RoomView, ServiceError> {
    let store = state.require_room_store().await?;
    require_room(state, room_id).await?;

    if let Some(name) = &patch.name {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "room name must not be empty".into(),
            ));
        }
    }

    store
        .patch_room_settings(
            room_id.to_owned(),
            RoomSettingsUpdate {
                name: patch.name,
                voting_system: patch.voting_system,
                voting_categorized: patch.voting_categorized,
                auto_complete_voting: patch.auto_complete_voting,
            },
            SystemTime::now(),
        )
        .await?;

    let room = require_room(state, room_id).await?;
    Ok(room.into())
}

/// Activities of a room newer than `since`, oldest first.
pub async fn get_recent_activities(
    state: &SharedState,
    room_id: &str,
    since: Option<SystemTime>,
) -> Result<Vec<ActivityView>, ServiceError> {
    let store = state.require_room_store().await?;
    require_room(state, room_id).await?;

    let activities = store.find_activities_since(room_id.to_owned(), since).await?;
    Ok(activities.into_iter().map(Into::into).collect())
}

/// Load a room or fail with [`ServiceError::NotFound`].
pub(crate) async fn require_room(
    state: &SharedState,
    room_id: &str,
) -> Result<RoomEntity, ServiceError> {
    let store = state.require_room_store().await?;
    store
        .find_room(room_id.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room `{room_id}` not found")))
}

/// Build an activity log entry stamped with the current time.
pub(crate) fn activity(
    room_id: &str,
    user_id: Option<Uuid>,
    user_name: Option<&str>,
    kind: &str,
    description: String,
) -> ActivityEntity {
    ActivityEntity {
        id: Uuid::new_v4(),
        room_id: room_id.to_owned(),
        user_id,
        user_name: user_name.map(str::to_owned),
        kind: kind.to_owned(),
        description,
        created_at: SystemTime::now(),
    }
}

/// Random room slug of the form `xxxx-xxxx-xxxx`.
fn generate_slug() -> String {
    let mut rng = rand::rng();
    let mut slug = String::with_capacity(SLUG_GROUPS * (SLUG_GROUP_LEN + 1) - 1);
    for group in 0..SLUG_GROUPS {
        if group > 0 {
            slug.push('-');
        }
        for _ in 0..SLUG_GROUP_LEN {
            let idx = rng.random_range(0..SLUG_CHARSET.len());
            slug.push(SLUG_CHARSET[idx] as char);
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::VotingSystem, room_store::memory::MemoryRoomStore},
        dto::validation::validate_room_id,
        state::AppState,
    };

    async fn state_with_memory_store() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::default()))
            .await;
        state
    }

    fn create_request(password_hash: Option<String>) -> CreateRoomRequest {
        CreateRoomRequest {
            name: "Sprint 42".into(),
            voting_system: VotingSystem::Fibonacci,
            voting_categorized: false,
            auto_complete_voting: false,
            room_type: crate::dao::models::RoomType::Classic,
            owner_id: None,
            password_hash,
        }
    }

    #[test]
    fn generated_slugs_are_valid_room_ids() {
        for _ in 0..32 {
            assert!(validate_room_id(&generate_slug()).is_ok());
        }
    }

    #[tokio::test]
    async fn created_room_can_be_fetched_back() {
        let state = state_with_memory_store().await;
        let view = create_room(&state, create_request(None)).await.unwrap();

        let snapshot = get_room(&state, &view.id).await.unwrap();
        assert_eq!(snapshot.room.name, "Sprint 42");
        assert!(snapshot.users.is_empty());
        assert!(snapshot.votes.is_empty());
    }

    #[tokio::test]
    async fn joining_a_protected_room_requires_the_password() {
        let state = state_with_memory_store().await;
        let view = create_room(&state, create_request(Some("h4sh".into())))
            .await
            .unwrap();

        let denied = join_user(
            &state,
            &view.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: Some("wrong".into()),
            },
        )
        .await;
        assert!(matches!(denied, Err(ServiceError::Unauthorized(_))));

        let joined = join_user(
            &state,
            &view.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: Some("h4sh".into()),
            },
        )
        .await;
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn settings_update_does_not_clobber_concurrent_round_state() {
        let state = state_with_memory_store().await;
        let view = create_room(&state, create_request(None)).await.unwrap();

        // Round state written between the settings read and write must survive.
        let store = state.require_room_store().await.unwrap();
        store
            .set_game_over(view.id.clone(), true, SystemTime::now())
            .await
            .unwrap();
        store
            .set_active_story(view.id.clone(), Some("story-1".into()), SystemTime::now())
            .await
            .unwrap();

        let updated = update_settings(
            &state,
            &view.id,
            RoomSettingsPatch {
                name: Some("Sprint 43".into()),
                voting_system: None,
                voting_categorized: None,
                auto_complete_voting: Some(true),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "Sprint 43");
        assert!(updated.auto_complete_voting);
        assert!(updated.is_game_over);
        assert_eq!(updated.active_story_node_id.as_deref(), Some("story-1"));
    }

    #[tokio::test]
    async fn editing_a_user_notifies_the_room_channel() {
        let state = state_with_memory_store().await;
        let view = create_room(&state, create_request(None)).await.unwrap();
        let user = join_user(
            &state,
            &view.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: None,
            },
        )
        .await
        .unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        state.channels().register(
            &view.id,
            crate::state::ClientConnection {
                user_id: user.id,
                user_name: "alex".into(),
                tx,
            },
        );

        edit_user(
            &state,
            user.id,
            EditUserRequest {
                name: Some("sam".into()),
                is_spectator: None,
            },
        )
        .await
        .unwrap();

        let Ok(axum::extract::ws::Message::Text(text)) = rx.try_recv() else {
            panic!("expected a relay frame");
        };
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["type"], "user-updated");
        assert_eq!(frame["user"]["name"], "sam");
    }

    #[tokio::test]
    async fn record_join_backfills_missing_membership_only() {
        let state = state_with_memory_store().await;
        let view = create_room(&state, create_request(None)).await.unwrap();
        let user = join_user(
            &state,
            &view.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: None,
            },
        )
        .await
        .unwrap();

        // Known user: nothing to backfill.
        record_join(&state, &view.id, user.id, "alex").await.unwrap();
        let snapshot = get_room(&state, &view.id).await.unwrap();
        assert_eq!(snapshot.users.len(), 1);

        // Unknown user announced over the relay gets a record.
        let stray = Uuid::new_v4();
        record_join(&state, &view.id, stray, "sam").await.unwrap();
        let snapshot = get_room(&state, &view.id).await.unwrap();
        assert_eq!(snapshot.users.len(), 2);
        assert!(snapshot.users.iter().any(|member| member.id == stray));
    }

    #[tokio::test]
    async fn leaving_records_an_activity_and_removes_the_user() {
        let state = state_with_memory_store().await;
        let view = create_room(&state, create_request(None)).await.unwrap();
        let user = join_user(
            &state,
            &view.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: None,
            },
        )
        .await
        .unwrap();

        leave_user(&state, user.id).await.unwrap();

        let snapshot = get_room(&state, &view.id).await.unwrap();
        assert!(snapshot.users.is_empty());

        let activities = get_recent_activities(&state, &view.id, None).await.unwrap();
        assert!(activities.iter().any(|entry| entry.kind == "user_left"));
    }
}
