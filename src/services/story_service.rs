//! Active story selection and the story rotation.

use std::time::SystemTime;

use tracing::info;

use crate::{
    dao::models::{CanvasNodeEntity, NodeData},
    error::ServiceError,
    services::room_service::{activity, require_room},
    state::SharedState,
};

/// Point the room at another story node, starting a fresh round.
///
/// Passing `None` clears the active story. The target must be an existing
/// story node of the room.
pub async fn set_active_story(
    state: &SharedState,
    room_id: &str,
    node_id: Option<String>,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    if let Some(node_id) = &node_id {
        let node = store
            .find_node(room.id.clone(), node_id.clone())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("node `{node_id}` not found in room `{room_id}`"))
            })?;
        if !node.data.is_story() {
            return Err(ServiceError::InvalidInput(format!(
                "node `{node_id}` is not a story"
            )));
        }
    }

    start_round_on(state, room_id, node_id).await
}

/// Record the consensus estimate on the active story and rotate to the next.
pub async fn submit_estimation(
    state: &SharedState,
    room_id: &str,
    estimate: String,
) -> Result<Option<String>, ServiceError> {
    let (mut node, title) = require_active_story(state, room_id).await?;

    if let NodeData::Story {
        completed_at,
        final_estimate,
        ..
    } = &mut node.data
    {
        *completed_at = Some(SystemTime::now());
        *final_estimate = Some(estimate.clone());
    }
    node.updated_at = SystemTime::now();

    let store = state.require_room_store().await?;
    store.save_node(node.clone()).await?;
    store
        .append_activity(activity(
            room_id,
            None,
            None,
            "story_estimated",
            format!("\"{title}\" was estimated at {estimate}"),
        ))
        .await?;

    info!(room_id = %room_id, node_id = %node.node_id, estimate = %estimate, "story estimated");
    advance_rotation(state, room_id).await
}

/// Mark the active story as skipped and rotate to the next.
pub async fn skip_story(state: &SharedState, room_id: &str) -> Result<Option<String>, ServiceError> {
    let (mut node, title) = require_active_story(state, room_id).await?;

    if let NodeData::Story { skipped, .. } = &mut node.data {
        *skipped = true;
    }
    node.updated_at = SystemTime::now();

    let store = state.require_room_store().await?;
    store.save_node(node.clone()).await?;
    store
        .append_activity(activity(
            room_id,
            None,
            None,
            "story_skipped",
            format!("\"{title}\" was skipped"),
        ))
        .await?;

    info!(room_id = %room_id, node_id = %node.node_id, "story skipped");
    advance_rotation(state, room_id).await
}

/// First story in creation order that is neither completed nor skipped.
pub fn next_story_node(nodes: &[CanvasNodeEntity]) -> Option<&CanvasNodeEntity> {
    nodes.iter().find(|node| {
        matches!(
            &node.data,
            NodeData::Story {
                completed_at: None,
                skipped: false,
                ..
            }
        )
    })
}

/// Load the room's active story node or fail.
async fn require_active_story(
    state: &SharedState,
    room_id: &str,
) -> Result<(CanvasNodeEntity, String), ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    let node_id = room.active_story_node_id.ok_or_else(|| {
        ServiceError::InvalidState(format!("room `{room_id}` has no active story"))
    })?;

    let node = store
        .find_node(room.id, node_id.clone())
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("node `{node_id}` not found in room `{room_id}`"))
        })?;

    let title = match &node.data {
        NodeData::Story { title, .. } => title.clone(),
        _ => {
            return Err(ServiceError::InvalidState(format!(
                "active node `{node_id}` is not a story"
            )));
        }
    };

    Ok((node, title))
}

/// Activate the next pending story (or none) and start a fresh round.
async fn advance_rotation(
    state: &SharedState,
    room_id: &str,
) -> Result<Option<String>, ServiceError> {
    let store = state.require_room_store().await?;
    let nodes = store.find_nodes_by_room(room_id.to_owned()).await?;
    let next = next_story_node(&nodes).map(|node| node.node_id.clone());

    start_round_on(state, room_id, next.clone()).await?;
    Ok(next)
}

/// Repoint the active story and reset the round around it.
async fn start_round_on(
    state: &SharedState,
    room_id: &str,
    node_id: Option<String>,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let now = SystemTime::now();

    store.delete_votes_by_room(room_id.to_owned()).await?;
    store.set_game_over(room_id.to_owned(), false, now).await?;
    store
        .set_active_story(room_id.to_owned(), node_id, now)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{NodePosition, RoomType, VotingSystem},
            room_store::memory::MemoryRoomStore,
        },
        dto::room::{CreateRoomRequest, JoinRoomRequest, PickCardRequest},
        services::{
            room_service::{create_room, get_room, join_user},
            voting_service::pick_card,
        },
        state::SharedState,
    };

    async fn state_with_memory_store() -> SharedState {
        let state = crate::state::AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::default()))
            .await;
        state
    }

    async fn seeded_canvas_room(state: &SharedState) -> String {
        let view = create_room(
            state,
            CreateRoomRequest {
                name: "Sprint 42".into(),
                voting_system: VotingSystem::Fibonacci,
                voting_categorized: false,
                auto_complete_voting: false,
                room_type: RoomType::Canvas,
                owner_id: None,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        view.id
    }

    async fn seeded_story(state: &SharedState, room_id: &str, node_id: &str, title: &str) {
        let store = state.room_store().await.unwrap();
        store
            .save_node(CanvasNodeEntity {
                id: Uuid::new_v4(),
                room_id: room_id.to_owned(),
                node_id: node_id.to_owned(),
                position: NodePosition { x: 0.0, y: 0.0 },
                data: NodeData::Story {
                    title: title.to_owned(),
                    description: None,
                    completed_at: None,
                    skipped: false,
                    final_estimate: None,
                },
                is_locked: false,
                created_at: SystemTime::now(),
                updated_at: SystemTime::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rotation_picks_stories_in_creation_order() {
        let state = state_with_memory_store().await;
        let room_id = seeded_canvas_room(&state).await;
        seeded_story(&state, &room_id, "story-a", "A").await;
        seeded_story(&state, &room_id, "story-b", "B").await;
        seeded_story(&state, &room_id, "story-c", "C").await;

        set_active_story(&state, &room_id, Some("story-a".into()))
            .await
            .unwrap();

        let next = submit_estimation(&state, &room_id, "5".into()).await.unwrap();
        assert_eq!(next.as_deref(), Some("story-b"));

        let next = skip_story(&state, &room_id).await.unwrap();
        assert_eq!(next.as_deref(), Some("story-c"));

        set_active_story(&state, &room_id, Some("story-c".into()))
            .await
            .unwrap();
        let next = submit_estimation(&state, &room_id, "8".into()).await.unwrap();
        // Skipped and completed stories are out of the rotation.
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn estimation_starts_a_fresh_round() {
        let state = state_with_memory_store().await;
        let room_id = seeded_canvas_room(&state).await;
        seeded_story(&state, &room_id, "story-a", "A").await;
        set_active_story(&state, &room_id, Some("story-a".into()))
            .await
            .unwrap();

        let user = join_user(
            &state,
            &room_id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: false,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        pick_card(
            &state,
            &room_id,
            user.id,
            PickCardRequest {
                card_label: "5".into(),
                card_value: None,
                card_icon: None,
            },
        )
        .await
        .unwrap();

        submit_estimation(&state, &room_id, "5".into()).await.unwrap();

        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert!(snapshot.votes.is_empty());
        assert!(!snapshot.room.is_game_over);
        assert!(snapshot.room.active_story_node_id.is_none());
    }

    #[tokio::test]
    async fn activating_a_non_story_node_is_rejected() {
        let state = state_with_memory_store().await;
        let room_id = seeded_canvas_room(&state).await;
        let store = state.room_store().await.unwrap();
        store
            .save_node(CanvasNodeEntity {
                id: Uuid::new_v4(),
                room_id: room_id.clone(),
                node_id: "timer".into(),
                position: NodePosition { x: 0.0, y: 0.0 },
                data: NodeData::Timer {
                    is_running: false,
                    seconds: 0,
                },
                is_locked: false,
                created_at: SystemTime::now(),
                updated_at: SystemTime::now(),
            })
            .await
            .unwrap();

        let result = set_active_story(&state, &room_id, Some("timer".into())).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}
