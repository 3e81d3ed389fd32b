//! Abstraction over the persistence layer for rooms and everything they own.

pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        ActivityEntity, CanvasNodeEntity, RoomEntity, RoomSettingsUpdate, UserEntity, VoteEntity,
    },
    storage::StorageResult,
};

/// Document store for rooms, users, votes, canvas nodes, and activities.
///
/// Rooms own the lifecycle of everything else: deleting a room cascades to its
/// users, votes, nodes, and activities, and deleting a user cascades to that
/// user's vote. The contended room fields (`is_game_over`,
/// `active_story_node_id`, `last_activity_at`) are patched through dedicated
/// single-document operations rather than read-modify-write round trips.
pub trait RoomStore: Send + Sync {
    /// Insert or replace a room document.
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a room by its slug.
    fn find_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Delete a room together with its users, votes, nodes, and activities.
    fn delete_room_cascade(&self, room_id: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Ids of rooms whose last activity predates `cutoff`.
    fn list_inactive_rooms(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Bump a room's activity timestamp.
    fn touch_room(&self, room_id: String, at: SystemTime)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Atomically flip the reveal flag, bumping the activity timestamp.
    fn set_game_over(
        &self,
        room_id: String,
        is_game_over: bool,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Atomically patch the settings fields present in `update`, bumping the
    /// activity timestamp. Round state is never touched.
    fn patch_room_settings(
        &self,
        room_id: String,
        update: RoomSettingsUpdate,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Atomically point the room at another story node (or none).
    fn set_active_story(
        &self,
        room_id: String,
        node_id: Option<String>,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert or replace a user document.
    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a user by id.
    fn find_user(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>>;
    /// All users of a room, in join order.
    fn find_users_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>>;
    /// Delete a user and that user's vote, if any.
    fn delete_user_cascade(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Insert or replace the vote for the vote's (room, user) pair.
    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// All votes of a room.
    fn find_votes_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>>;
    /// Delete a single user's vote in a room, reporting whether one existed.
    fn delete_vote(
        &self,
        room_id: String,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Delete every vote of a room.
    fn delete_votes_by_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert or replace a node keyed by its (room, node_id) pair.
    fn save_node(&self, node: CanvasNodeEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a node by its client-assigned key.
    fn find_node(
        &self,
        room_id: String,
        node_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<CanvasNodeEntity>>>;
    /// All nodes of a room, in creation order.
    fn find_nodes_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<CanvasNodeEntity>>>;

    /// Append an entry to the room's activity log.
    fn append_activity(&self, activity: ActivityEntity)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Activities of a room newer than `since`, oldest first.
    fn find_activities_since(
        &self,
        room_id: String,
        since: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>>;

    /// Cheap readiness probe against the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
