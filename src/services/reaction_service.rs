//! Emoji reactions with a per-user cooldown.

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::UserEntity,
    error::ServiceError,
    services::room_service::require_room,
    state::SharedState,
};

/// Record a reaction on the user's durable trace, enforcing the cooldown.
///
/// The reaction itself is relayed live by the caller; this only validates the
/// rate limit and stamps `last_reaction_type`/`last_reaction_at` so late
/// joiners can replay the most recent reaction per user.
pub async fn record_reaction(
    state: &SharedState,
    room_id: &str,
    user_id: Uuid,
    emoji_type: String,
) -> Result<UserEntity, ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    let mut user = store
        .find_user(user_id)
        .await?
        .filter(|user| user.room_id == room.id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("user `{user_id}` not found in room `{room_id}`"))
        })?;

    let now = SystemTime::now();
    let cooldown = state.config().reaction_cooldown();
    if let Some(last) = user.last_reaction_at {
        if let Ok(elapsed) = now.duration_since(last) {
            if elapsed < cooldown {
                let remaining = cooldown - elapsed;
                return Err(ServiceError::Cooldown {
                    remaining_ms: remaining.as_millis() as u64,
                });
            }
        }
        // A clock step backwards counts as an expired cooldown.
    }

    user.last_reaction_type = Some(emoji_type);
    user.last_reaction_at = Some(now);
    store.save_user(user.clone()).await?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{RoomType, VotingSystem},
            room_store::{RoomStore, memory::MemoryRoomStore},
        },
        dto::room::{CreateRoomRequest, JoinRoomRequest},
        services::room_service::{create_room, join_user},
    };

    async fn seeded(state: &SharedState) -> (String, Uuid) {
        let view = create_room(
            state,
            CreateRoomRequest {
                name: "Sprint 42".into(),
                voting_system: VotingSystem::Fibonacci,
                voting_categorized: false,
                auto_complete_voting: false,
                room_type: RoomType::Classic,
                owner_id: None,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        let user = join_user(
            state,
            &view.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        (view.id, user.id)
    }

    #[tokio::test]
    async fn back_to_back_reactions_hit_the_cooldown() {
        let state = crate::state::AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::default()))
            .await;
        let (room_id, user_id) = seeded(&state).await;

        record_reaction(&state, &room_id, user_id, "thumbs-up".into())
            .await
            .unwrap();
        let second = record_reaction(&state, &room_id, user_id, "thumbs-up".into()).await;
        assert!(matches!(second, Err(ServiceError::Cooldown { .. })));
    }

    #[tokio::test]
    async fn an_expired_cooldown_lets_the_reaction_through() {
        let state = crate::state::AppState::new(AppConfig::default());
        let store = Arc::new(MemoryRoomStore::default());
        state.install_room_store(store.clone()).await;
        let (room_id, user_id) = seeded(&state).await;

        record_reaction(&state, &room_id, user_id, "thumbs-up".into())
            .await
            .unwrap();

        // Backdate the durable trace past the cooldown window.
        let mut user = store.find_user(user_id).await.unwrap().unwrap();
        user.last_reaction_at =
            Some(SystemTime::now() - (state.config().reaction_cooldown() + Duration::from_secs(1)));
        store.save_user(user).await.unwrap();

        let again = record_reaction(&state, &room_id, user_id, "party".into()).await;
        assert!(again.is_ok());
        assert_eq!(
            again.unwrap().last_reaction_type.as_deref(),
            Some("party")
        );
    }
}
