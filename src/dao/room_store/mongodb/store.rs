//! MongoDB implementation of [`RoomStore`].

use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, DateTime, doc},
    options::{ClientOptions, IndexOptions},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoActivityDocument, MongoNodeDocument, MongoRoomDocument, MongoUserDocument,
        MongoVoteDocument, doc_id, uuid_as_binary,
    },
};
use crate::dao::{
    models::{
        ActivityEntity, CanvasNodeEntity, RoomEntity, RoomSettingsUpdate, UserEntity, VoteEntity,
        VotingSystem,
    },
    room_store::RoomStore,
    storage::StorageResult,
};

const ROOM_COLLECTION: &str = "rooms";
const USER_COLLECTION: &str = "users";
const VOTE_COLLECTION: &str = "votes";
const NODE_COLLECTION: &str = "nodes";
const ACTIVITY_COLLECTION: &str = "activities";

/// Connection parameters for the MongoDB backend.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the room collections.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse a connection URI into a config, defaulting the database name.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or("planning_poker").to_owned();
        let options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}

/// Room store backed by MongoDB collections with secondary indexes per query.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        create_index(
            &database.collection::<MongoRoomDocument>(ROOM_COLLECTION),
            ROOM_COLLECTION,
            "last_activity_at",
            doc! {"last_activity_at": 1},
            false,
        )
        .await?;
        create_index(
            &database.collection::<MongoUserDocument>(USER_COLLECTION),
            USER_COLLECTION,
            "room_id",
            doc! {"room_id": 1},
            false,
        )
        .await?;
        create_index(
            &database.collection::<MongoVoteDocument>(VOTE_COLLECTION),
            VOTE_COLLECTION,
            "room_id,user_id",
            doc! {"room_id": 1, "user_id": 1},
            true,
        )
        .await?;
        create_index(
            &database.collection::<MongoNodeDocument>(NODE_COLLECTION),
            NODE_COLLECTION,
            "room_id,node_id",
            doc! {"room_id": 1, "node_id": 1},
            true,
        )
        .await?;
        create_index(
            &database.collection::<MongoActivityDocument>(ACTIVITY_COLLECTION),
            ACTIVITY_COLLECTION,
            "room_id,created_at",
            doc! {"room_id": 1, "created_at": 1},
            false,
        )
        .await?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database().await.collection(ROOM_COLLECTION)
    }

    async fn users(&self) -> Collection<MongoUserDocument> {
        self.database().await.collection(USER_COLLECTION)
    }

    async fn votes(&self) -> Collection<MongoVoteDocument> {
        self.database().await.collection(VOTE_COLLECTION)
    }

    async fn nodes(&self) -> Collection<MongoNodeDocument> {
        self.database().await.collection(NODE_COLLECTION)
    }

    async fn activities(&self) -> Collection<MongoActivityDocument> {
        self.database().await.collection(ACTIVITY_COLLECTION)
    }

    async fn save_room(&self, room: RoomEntity) -> MongoResult<()> {
        let room_id = room.id.clone();
        let document: MongoRoomDocument = room.into();
        self.rooms()
            .await
            .replace_one(doc! {"_id": &room_id}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ROOM_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn find_room(&self, room_id: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc! {"_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ROOM_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn delete_room_cascade(&self, room_id: String) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .delete_one(doc! {"_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: ROOM_COLLECTION,
                source,
            })?;

        let owned = doc! {"room_id": &room_id};
        self.users()
            .await
            .delete_many(owned.clone())
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: USER_COLLECTION,
                source,
            })?;
        self.votes()
            .await
            .delete_many(owned.clone())
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: VOTE_COLLECTION,
                source,
            })?;
        self.nodes()
            .await
            .delete_many(owned.clone())
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: NODE_COLLECTION,
                source,
            })?;
        self.activities()
            .await
            .delete_many(owned)
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: ACTIVITY_COLLECTION,
                source,
            })?;

        Ok(result.deleted_count > 0)
    }

    async fn list_inactive_rooms(&self, cutoff: SystemTime) -> MongoResult<Vec<String>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .await
            .find(doc! {"last_activity_at": {"$lt": DateTime::from_system_time(cutoff)}})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ROOM_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ROOM_COLLECTION,
                source,
            })?;

        Ok(documents
            .into_iter()
            .map(|document| RoomEntity::from(document).id)
            .collect())
    }

    async fn patch_room(&self, room_id: String, set: mongodb::bson::Document) -> MongoResult<()> {
        self.rooms()
            .await
            .update_one(doc! {"_id": &room_id}, doc! {"$set": set})
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ROOM_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn patch_room_settings(
        &self,
        room_id: String,
        update: RoomSettingsUpdate,
        at: SystemTime,
    ) -> MongoResult<()> {
        let mut set = doc! {"last_activity_at": DateTime::from_system_time(at)};
        if let Some(name) = update.name {
            set.insert("name", name);
        }
        if let Some(voting_system) = update.voting_system {
            set.insert("voting_system", voting_system_wire_name(voting_system));
        }
        if let Some(voting_categorized) = update.voting_categorized {
            set.insert("voting_categorized", voting_categorized);
        }
        if let Some(auto_complete_voting) = update.auto_complete_voting {
            set.insert("auto_complete_voting", auto_complete_voting);
        }
        self.patch_room(room_id, set).await
    }

    async fn save_user(&self, user: UserEntity) -> MongoResult<()> {
        let user_id = user.id;
        let document: MongoUserDocument = user.into();
        self.users()
            .await
            .replace_one(doc_id(user_id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: USER_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn find_user(&self, user_id: Uuid) -> MongoResult<Option<UserEntity>> {
        let document = self
            .users()
            .await
            .find_one(doc_id(user_id))
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: USER_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_users_by_room(&self, room_id: String) -> MongoResult<Vec<UserEntity>> {
        let documents: Vec<MongoUserDocument> = self
            .users()
            .await
            .find(doc! {"room_id": &room_id})
            .sort(doc! {"joined_at": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: USER_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: USER_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_user_cascade(&self, user_id: Uuid) -> MongoResult<bool> {
        let Some(user) = self.find_user(user_id).await? else {
            return Ok(false);
        };

        self.votes()
            .await
            .delete_many(doc! {"room_id": &user.room_id, "user_id": uuid_as_binary(user_id)})
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: VOTE_COLLECTION,
                source,
            })?;
        self.users()
            .await
            .delete_one(doc_id(user_id))
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: USER_COLLECTION,
                source,
            })?;
        Ok(true)
    }

    async fn upsert_vote(&self, vote: VoteEntity) -> MongoResult<()> {
        let room_id = vote.room_id.clone();
        let user_id = vote.user_id;
        let document: MongoVoteDocument = vote.into();
        self.votes()
            .await
            .replace_one(
                doc! {"room_id": &room_id, "user_id": uuid_as_binary(user_id)},
                &document,
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: VOTE_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn find_votes_by_room(&self, room_id: String) -> MongoResult<Vec<VoteEntity>> {
        let documents: Vec<MongoVoteDocument> = self
            .votes()
            .await
            .find(doc! {"room_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: VOTE_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: VOTE_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn delete_vote(&self, room_id: String, user_id: Uuid) -> MongoResult<bool> {
        let result = self
            .votes()
            .await
            .delete_many(doc! {"room_id": &room_id, "user_id": uuid_as_binary(user_id)})
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: VOTE_COLLECTION,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_votes_by_room(&self, room_id: String) -> MongoResult<()> {
        self.votes()
            .await
            .delete_many(doc! {"room_id": &room_id})
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: VOTE_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn save_node(&self, node: CanvasNodeEntity) -> MongoResult<()> {
        let room_id = node.room_id.clone();
        let node_id = node.node_id.clone();
        let document: MongoNodeDocument = node.into();
        self.nodes()
            .await
            .replace_one(
                doc! {"room_id": &room_id, "node_id": &node_id},
                &document,
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: NODE_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn find_node(
        &self,
        room_id: String,
        node_id: String,
    ) -> MongoResult<Option<CanvasNodeEntity>> {
        let document = self
            .nodes()
            .await
            .find_one(doc! {"room_id": &room_id, "node_id": &node_id})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: NODE_COLLECTION,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn find_nodes_by_room(&self, room_id: String) -> MongoResult<Vec<CanvasNodeEntity>> {
        let documents: Vec<MongoNodeDocument> = self
            .nodes()
            .await
            .find(doc! {"room_id": &room_id})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: NODE_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: NODE_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn append_activity(&self, activity: ActivityEntity) -> MongoResult<()> {
        let document: MongoActivityDocument = activity.into();
        self.activities()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Write {
                collection: ACTIVITY_COLLECTION,
                source,
            })?;
        Ok(())
    }

    async fn find_activities_since(
        &self,
        room_id: String,
        since: Option<SystemTime>,
    ) -> MongoResult<Vec<ActivityEntity>> {
        let mut filter = doc! {"room_id": &room_id};
        if let Some(cutoff) = since {
            filter.insert(
                "created_at",
                doc! {"$gt": DateTime::from_system_time(cutoff)},
            );
        }

        let documents: Vec<MongoActivityDocument> = self
            .activities()
            .await
            .find(filter)
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ACTIVITY_COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Read {
                collection: ACTIVITY_COLLECTION,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }
}

/// Wire name of a voting system, matching the serde encoding of room documents.
fn voting_system_wire_name(system: VotingSystem) -> &'static str {
    match system {
        VotingSystem::Fibonacci => "fibonacci",
        VotingSystem::ModifiedFibonacci => "modified-fibonacci",
        VotingSystem::Tshirt => "tshirt",
        VotingSystem::PowersOf2 => "powers-of-2",
    }
}

async fn create_index<T: Send + Sync>(
    collection: &Collection<T>,
    collection_name: &'static str,
    index_name: &'static str,
    keys: mongodb::bson::Document,
    unique: bool,
) -> MongoResult<()> {
    let index = IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(Some(unique)).build())
        .build();

    collection
        .create_index(index)
        .await
        .map_err(|source| MongoDaoError::EnsureIndex {
            collection: collection_name,
            index: index_name,
            source,
        })?;
    Ok(())
}

impl RoomStore for MongoRoomStore {
    fn save_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_room(room).await.map_err(Into::into) })
    }

    fn find_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(room_id).await.map_err(Into::into) })
    }

    fn delete_room_cascade(&self, room_id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_room_cascade(room_id).await.map_err(Into::into) })
    }

    fn list_inactive_rooms(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move { store.list_inactive_rooms(cutoff).await.map_err(Into::into) })
    }

    fn touch_room(
        &self,
        room_id: String,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .patch_room(
                    room_id,
                    doc! {"last_activity_at": DateTime::from_system_time(at)},
                )
                .await
                .map_err(Into::into)
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
            store
                .patch_room(
                    room_id,
                    doc! {
                        "is_game_over": is_game_over,
                        "last_activity_at": DateTime::from_system_time(at),
                    },
                )
                .await
                .map_err(Into::into)
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
            store
                .patch_room_settings(room_id, update, at)
                .await
                .map_err(Into::into)
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
            let value = match node_id {
                Some(id) => Bson::String(id),
                None => Bson::Null,
            };
            store
                .patch_room(
                    room_id,
                    doc! {
                        "active_story_node_id": value,
                        "last_activity_at": DateTime::from_system_time(at),
                    },
                )
                .await
                .map_err(Into::into)
        })
    }

    fn save_user(&self, user: UserEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_user(user).await.map_err(Into::into) })
    }

    fn find_user(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<Option<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user(user_id).await.map_err(Into::into) })
    }

    fn find_users_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<UserEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_users_by_room(room_id).await.map_err(Into::into) })
    }

    fn delete_user_cascade(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_user_cascade(user_id).await.map_err(Into::into) })
    }

    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_vote(vote).await.map_err(Into::into) })
    }

    fn find_votes_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_votes_by_room(room_id).await.map_err(Into::into) })
    }

    fn delete_vote(
        &self,
        room_id: String,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_vote(room_id, user_id).await.map_err(Into::into) })
    }

    fn delete_votes_by_room(&self, room_id: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_votes_by_room(room_id).await.map_err(Into::into) })
    }

    fn save_node(&self, node: CanvasNodeEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_node(node).await.map_err(Into::into) })
    }

    fn find_node(
        &self,
        room_id: String,
        node_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<CanvasNodeEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_node(room_id, node_id).await.map_err(Into::into) })
    }

    fn find_nodes_by_room(
        &self,
        room_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<CanvasNodeEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_nodes_by_room(room_id).await.map_err(Into::into) })
    }

    fn append_activity(
        &self,
        activity: ActivityEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_activity(activity).await.map_err(Into::into) })
    }

    fn find_activities_since(
        &self,
        room_id: String,
        since: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Vec<ActivityEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_activities_since(room_id, since)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_the_serde_encoding() {
        for system in [
            VotingSystem::Fibonacci,
            VotingSystem::ModifiedFibonacci,
            VotingSystem::Tshirt,
            VotingSystem::PowersOf2,
        ] {
            let encoded = serde_json::to_value(system).unwrap();
            assert_eq!(encoded, voting_system_wire_name(system));
        }
    }
}
