//! Background deletion of abandoned rooms.

use tokio::time::interval;
use tracing::{info, warn};

use crate::{error::ServiceError, state::SharedState};

/// Periodically delete rooms whose last activity is older than the configured
/// retention window. Runs for the lifetime of the process.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval());
    loop {
        ticker.tick().await;
        match sweep(&state).await {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "retention sweep removed inactive rooms"),
            Err(err) => warn!(error = %err, "retention sweep failed"),
        }
    }
}

/// Delete every room past the retention cutoff, returning how many went away.
pub async fn sweep(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_room_store().await?;

    let cutoff = std::time::SystemTime::now() - state.config().retention_window();
    let stale = store.list_inactive_rooms(cutoff).await?;

    let mut deleted = 0;
    for room_id in stale {
        if store.delete_room_cascade(room_id.clone()).await? {
            info!(room_id = %room_id, "deleted inactive room");
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::{RoomStore, memory::MemoryRoomStore},
        dto::room::{CreateRoomRequest, JoinRoomRequest},
        services::room_service::{create_room, join_user},
        state::AppState,
    };

    #[tokio::test]
    async fn sweep_removes_only_rooms_past_the_cutoff() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryRoomStore::default());
        state.install_room_store(store.clone()).await;

        let stale = create_room(
            &state,
            CreateRoomRequest {
                name: "Old".into(),
                voting_system: crate::dao::models::VotingSystem::Fibonacci,
                voting_categorized: false,
                auto_complete_voting: false,
                room_type: crate::dao::models::RoomType::Classic,
                owner_id: None,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        let fresh = create_room(
            &state,
            CreateRoomRequest {
                name: "New".into(),
                voting_system: crate::dao::models::VotingSystem::Fibonacci,
                voting_categorized: false,
                auto_complete_voting: false,
                room_type: crate::dao::models::RoomType::Classic,
                owner_id: None,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        join_user(
            &state,
            &stale.id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: None,
            },
        )
        .await
        .unwrap();

        // Backdate the stale room past the retention window.
        let cutoff_age = state.config().retention_window() * 2;
        store
            .touch_room(stale.id.clone(), SystemTime::now() - cutoff_age)
            .await
            .unwrap();

        let deleted = sweep(&state).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.find_room(stale.id.clone()).await.unwrap().is_none());
        assert!(store.find_room(fresh.id).await.unwrap().is_some());
        // The cascade took the stale room's users along.
        assert!(
            store
                .find_users_by_room(stale.id)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
