//! Canvas node management, including the shared timer node.

use std::time::SystemTime;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{CanvasNodeEntity, NodeData, NodePosition},
    dto::{
        room::{CanvasNodeView, CreateNodeRequest},
        ws::TimerState,
    },
    error::ServiceError,
    services::room_service::require_room,
    state::SharedState,
};

/// Stable key of the singleton timer node a room lazily creates.
const TIMER_NODE_ID: &str = "timer";

/// Place a new node on the room's canvas.
pub async fn create_node(
    state: &SharedState,
    room_id: &str,
    request: CreateNodeRequest,
) -> Result<CanvasNodeView, ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    if store
        .find_node(room.id.clone(), request.node_id.clone())
        .await?
        .is_some()
    {
        return Err(ServiceError::InvalidState(format!(
            "node `{}` already exists in room `{room_id}`",
            request.node_id
        )));
    }

    let now = SystemTime::now();
    let node = CanvasNodeEntity {
        id: Uuid::new_v4(),
        room_id: room.id.clone(),
        node_id: request.node_id,
        position: request.position,
        data: request.data,
        is_locked: request.is_locked,
        created_at: now,
        updated_at: now,
    };

    store.save_node(node.clone()).await?;
    store.touch_room(room.id, now).await?;
    Ok(node.into())
}

/// All nodes of a room, in creation order.
pub async fn list_nodes(
    state: &SharedState,
    room_id: &str,
) -> Result<Vec<CanvasNodeView>, ServiceError> {
    let store = state.require_room_store().await?;
    require_room(state, room_id).await?;

    let nodes = store.find_nodes_by_room(room_id.to_owned()).await?;
    Ok(nodes.into_iter().map(Into::into).collect())
}

/// Apply a relayed node update.
///
/// Locked nodes keep their position; a payload that does not deserialize into
/// a known node type is rejected.
pub async fn apply_update(
    state: &SharedState,
    room_id: &str,
    node_id: &str,
    position: Option<NodePosition>,
    data: Option<Value>,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;

    let mut node = store
        .find_node(room_id.to_owned(), node_id.to_owned())
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("node `{node_id}` not found in room `{room_id}`"))
        })?;

    if let Some(position) = position {
        if node.is_locked {
            debug!(room_id = %room_id, node_id = %node_id, "ignoring move of a locked node");
        } else {
            node.position = position;
        }
    }
    if let Some(data) = data {
        node.data = serde_json::from_value(data)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed node payload: {err}")))?;
    }
    node.updated_at = SystemTime::now();

    store.save_node(node).await?;
    store
        .touch_room(room_id.to_owned(), SystemTime::now())
        .await?;
    Ok(())
}

/// Persist a relayed timer change on the room's singleton timer node,
/// creating it on first use.
pub async fn apply_timer_update(
    state: &SharedState,
    room_id: &str,
    timer: TimerState,
) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    let now = SystemTime::now();
    let mut node = match store.find_node(room.id.clone(), TIMER_NODE_ID.into()).await? {
        Some(node) => node,
        None => CanvasNodeEntity {
            id: Uuid::new_v4(),
            room_id: room.id.clone(),
            node_id: TIMER_NODE_ID.into(),
            position: NodePosition { x: 0.0, y: 0.0 },
            data: NodeData::Timer {
                is_running: false,
                seconds: 0,
            },
            is_locked: false,
            created_at: now,
            updated_at: now,
        },
    };

    node.data = NodeData::Timer {
        is_running: timer.is_running,
        seconds: timer.seconds,
    };
    node.updated_at = now;

    store.save_node(node).await?;
    store.touch_room(room.id, now).await?;
    Ok(())
}
