//! In-process store backend used by tests and for running without a database.

use std::{
    sync::{Arc, Mutex},
    time::SystemTime,
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::dao::{
    models::{
        ActivityEntity, CanvasNodeEntity, RoomEntity, RoomSettingsUpdate, UserEntity, VoteEntity,
    },
    room_store::RoomStore,
    storage::StorageResult,
};

/// Room store keeping everything in process memory.
///
/// Insertion order of the underlying maps provides the join order of users and
/// the creation order of canvas nodes, matching the secondary-index ordering
/// the MongoDB backend gets from its indexes.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rooms: Mutex<IndexMap<String, RoomEntity>>,
    users: Mutex<IndexMap<Uuid, UserEntity>>,
    votes: Mutex<IndexMap<(String, Uuid), VoteEntity>>,
    nodes: Mutex<IndexMap<(String, String), CanvasNodeEntity>>,
    activities: Mutex<Vec<ActivityEntity>>,
}

impl MemoryRoomStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_vote(&self, room_id: &str, user_id: Uuid) -> bool {
        let mut votes = self.inner.votes.lock().expect("votes lock");
        votes
            .shift_remove(&(room_id.to_owned(), user_id))
            .is_some()
    }
}

impl RoomStore for MemoryRoomStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rooms = store.inner.rooms.lock().expect("rooms lock");
            rooms.insert(room.id.clone(), room);
            Ok(())
        })
    }

    fn find_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store.inner.rooms.lock().expect("rooms lock");
            Ok(rooms.get(&room_id).cloned())
        })
    }

    fn delete_room_cascade(&self, room_id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let existed = {
                let mut rooms = store.inner.rooms.lock().expect("rooms lock");
                rooms.shift_remove(&room_id).is_some()
            };
            {
                let mut users = store.inner.users.lock().expect("users lock");
                users.retain(|_, user| user.room_id != room_id);
            }
            {
                let mut votes = store.inner.votes.lock().expect("votes lock");
                votes.retain(|(room, _), _| *room != room_id);
            }
            {
                let mut nodes = store.inner.nodes.lock().expect("nodes lock");
                nodes.retain(|(room, _), _| *room != room_id);
            }
            {
                let mut activities = store.inner.activities.lock().expect("activities lock");
                activities.retain(|activity| activity.room_id != room_id);
            }
            Ok(existed)
        })
    }

    fn list_inactive_rooms(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store.inner.rooms.lock().expect("rooms lock");
            Ok(rooms
                .values()
                .filter(|room| room.last_activity_at < cutoff)
                .map(|room| room.id.clone())
                .collect())
        })
    }

    fn touch_room(
        &self,
        room_id: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rooms = store.inner.rooms.lock().expect("rooms lock");
            if let Some(room) = rooms.get_mut(&room_id) {
                room.last_activity_at = at;
            }
            Ok(())
        })
    }

    fn set_game_over(
        &self,
        room_id: String,
        is_game_over: bool,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rooms = store.inner.rooms.lock().expect("rooms lock");
            if let Some(room) = rooms.get_mut(&room_id) {
                room.is_game_over = is_game_over;
                room.last_activity_at = at;
            }
            Ok(())
        })
    }

    fn patch_room_settings(
        &self,
        room_id: String,
        update: RoomSettingsUpdate,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rooms = store.inner.rooms.lock().expect("rooms lock");
            if let Some(room) = rooms.get_mut(&room_id) {
                if let Some(name) = update.name {
                    room.name = name;
                }
                if let Some(voting_system) = update.voting_system {
                    room.voting_system = voting_system;
                }
                if let Some(voting_categorized) = update.voting_categorized {
                    room.voting_categorized = voting_categorized;
                }
                if let Some(auto_complete_voting) = update.auto_complete_voting {
                    room.auto_complete_voting = auto_complete_voting;
                }
                room.last_activity_at = at;
            }
            Ok(())
        })
    }

    fn set_active_story(
        &self,
        room_id: String,
        node_id: Option<String>,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rooms = store.inner.rooms.lock().expect("rooms lock");
            if let Some(room) = rooms.get_mut(&room_id) {
                room.active_story_node_id = node_id;
                room.last_activity_at = at;
            }
            Ok(())
        })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut users = store.inner.users.lock().expect("users lock");
            users.insert(user.id, user);
            Ok(())
        })
    }

    fn find_user(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let users = store.inner.users.lock().expect("users lock");
            Ok(users.get(&user_id).cloned())
        })
    }

    fn find_users_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let users = store.inner.users.lock().expect("users lock");
            Ok(users
                .values()
                .filter(|user| user.room_id == room_id)
                .cloned()
                .collect())
        })
    }

    fn delete_user_cascade(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let removed = {
                let mut users = store.inner.users.lock().expect("users lock");
                users.shift_remove(&user_id)
            };
            if let Some(user) = &removed {
                store.remove_vote(&user.room_id, user.id);
            }
            Ok(removed.is_some())
        })
    }

    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut votes = store.inner.votes.lock().expect("votes lock");
            votes.insert((vote.room_id.clone(), vote.user_id), vote);
            Ok(())
        })
    }

    fn find_votes_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let votes = store.inner.votes.lock().expect("votes lock");
            Ok(votes
                .values()
                .filter(|vote| vote.room_id == room_id)
                .cloned()
                .collect())
        })
    }

    fn delete_vote(
        &self,
        room_id: String,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.remove_vote(&room_id, user_id)) })
    }

    fn delete_votes_by_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut votes = store.inner.votes.lock().expect("votes lock");
            votes.retain(|(room, _), _| *room != room_id);
            Ok(())
        })
    }

    fn save_node(&self, node: CanvasNodeEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut nodes = store.inner.nodes.lock().expect("nodes lock");
            nodes.insert((node.room_id.clone(), node.node_id.clone()), node);
            Ok(())
        })
    }

    fn find_node(
        &self,
        room_id: String,
        node_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<CanvasNodeEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let nodes = store.inner.nodes.lock().expect("nodes lock");
            Ok(nodes.get(&(room_id, node_id)).cloned())
        })
    }

    fn find_nodes_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<CanvasNodeEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let nodes = store.inner.nodes.lock().expect("nodes lock");
            Ok(nodes
                .values()
                .filter(|node| node.room_id == room_id)
                .cloned()
                .collect())
        })
    }

    fn append_activity(
        &self,
        activity: ActivityEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut activities = store.inner.activities.lock().expect("activities lock");
            activities.push(activity);
            Ok(())
        })
    }

    fn find_activities_since(
        &self,
        room_id: String,
        since: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let activities = store.inner.activities.lock().expect("activities lock");
            Ok(activities
                .iter()
                .filter(|activity| activity.room_id == room_id)
                .filter(|activity| since.is_none_or(|cutoff| activity.created_at > cutoff))
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::models::{NodeData, NodePosition, RoomType, VotingSystem};

    fn room(id: &str) -> RoomEntity {
        RoomEntity {
            id: id.to_owned(),
            name: "sprint 12".into(),
            voting_system: VotingSystem::Fibonacci,
            voting_categorized: false,
            auto_complete_voting: false,
            room_type: RoomType::Classic,
            is_game_over: false,
            active_story_node_id: None,
            created_at: SystemTime::now(),
            last_activity_at: SystemTime::now(),
            owner_id: None,
            password_hash: None,
        }
    }

    fn user(room_id: &str) -> UserEntity {
        UserEntity {
            id: Uuid::new_v4(),
            room_id: room_id.to_owned(),
            name: "alex".into(),
            is_spectator: false,
            joined_at: SystemTime::now(),
            last_reaction_type: None,
            last_reaction_at: None,
        }
    }

    fn vote(room_id: &str, user_id: Uuid, label: &str) -> VoteEntity {
        VoteEntity {
            id: Uuid::new_v4(),
            room_id: room_id.to_owned(),
            user_id,
            card_label: label.to_owned(),
            card_value: None,
            card_icon: None,
        }
    }

    #[tokio::test]
    async fn upsert_vote_keeps_one_record_per_user() {
        let store = MemoryRoomStore::new();
        store.save_room(room("r1")).await.unwrap();
        let member = user("r1");
        store.save_user(member.clone()).await.unwrap();

        store.upsert_vote(vote("r1", member.id, "5")).await.unwrap();
        store.upsert_vote(vote("r1", member.id, "8")).await.unwrap();

        let votes = store.find_votes_by_room("r1".into()).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].card_label, "8");
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_their_vote() {
        let store = MemoryRoomStore::new();
        store.save_room(room("r1")).await.unwrap();
        let member = user("r1");
        store.save_user(member.clone()).await.unwrap();
        store.upsert_vote(vote("r1", member.id, "3")).await.unwrap();

        assert!(store.delete_user_cascade(member.id).await.unwrap());

        assert!(store.find_votes_by_room("r1".into()).await.unwrap().is_empty());
        assert!(store.find_user(member.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_a_room_cascades_to_everything_it_owns() {
        let store = MemoryRoomStore::new();
        store.save_room(room("r1")).await.unwrap();
        store.save_room(room("r2")).await.unwrap();
        let member = user("r1");
        store.save_user(member.clone()).await.unwrap();
        store.upsert_vote(vote("r1", member.id, "2")).await.unwrap();
        store
            .save_node(CanvasNodeEntity {
                id: Uuid::new_v4(),
                room_id: "r1".into(),
                node_id: "story-1".into(),
                position: NodePosition { x: 0.0, y: 0.0 },
                data: NodeData::Story {
                    title: "checkout flow".into(),
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

        assert!(store.delete_room_cascade("r1".into()).await.unwrap());

        assert!(store.find_room("r1".into()).await.unwrap().is_none());
        assert!(store.find_users_by_room("r1".into()).await.unwrap().is_empty());
        assert!(store.find_votes_by_room("r1".into()).await.unwrap().is_empty());
        assert!(store.find_nodes_by_room("r1".into()).await.unwrap().is_empty());
        // The other room is untouched.
        assert!(store.find_room("r2".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn settings_patch_leaves_round_state_untouched() {
        let store = MemoryRoomStore::new();
        store.save_room(room("r1")).await.unwrap();
        store
            .set_game_over("r1".into(), true, SystemTime::now())
            .await
            .unwrap();
        store
            .set_active_story("r1".into(), Some("story-1".into()), SystemTime::now())
            .await
            .unwrap();

        store
            .patch_room_settings(
                "r1".into(),
                RoomSettingsUpdate {
                    name: Some("renamed".into()),
                    voting_system: Some(VotingSystem::Tshirt),
                    ..Default::default()
                },
                SystemTime::now(),
            )
            .await
            .unwrap();

        let updated = store.find_room("r1".into()).await.unwrap().unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.voting_system, VotingSystem::Tshirt);
        assert!(updated.is_game_over);
        assert_eq!(updated.active_story_node_id.as_deref(), Some("story-1"));
    }

    #[tokio::test]
    async fn inactive_room_listing_honors_the_cutoff() {
        let store = MemoryRoomStore::new();
        let mut stale = room("stale");
        stale.last_activity_at = SystemTime::now() - Duration::from_secs(10 * 24 * 60 * 60);
        store.save_room(stale).await.unwrap();
        store.save_room(room("fresh")).await.unwrap();

        let cutoff = SystemTime::now() - Duration::from_secs(5 * 24 * 60 * 60);
        let inactive = store.list_inactive_rooms(cutoff).await.unwrap();

        assert_eq!(inactive, vec!["stale".to_owned()]);
    }
}
