//! BSON document shapes and conversions for the MongoDB backend.

use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    ActivityEntity, CanvasNodeEntity, NodeData, NodePosition, RoomEntity, RoomType, UserEntity,
    VoteEntity, VotingSystem,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    voting_system: VotingSystem,
    voting_categorized: bool,
    auto_complete_voting: bool,
    room_type: RoomType,
    #[serde(default)]
    is_game_over: bool,
    active_story_node_id: Option<String>,
    created_at: DateTime,
    last_activity_at: DateTime,
    owner_id: Option<Uuid>,
    password_hash: Option<String>,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            voting_system: value.voting_system,
            voting_categorized: value.voting_categorized,
            auto_complete_voting: value.auto_complete_voting,
            room_type: value.room_type,
            is_game_over: value.is_game_over,
            active_story_node_id: value.active_story_node_id,
            created_at: DateTime::from_system_time(value.created_at),
            last_activity_at: DateTime::from_system_time(value.last_activity_at),
            owner_id: value.owner_id,
            password_hash: value.password_hash,
        }
    }
}

impl From<MongoRoomDocument> for RoomEntity {
    fn from(value: MongoRoomDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            voting_system: value.voting_system,
            voting_categorized: value.voting_categorized,
            auto_complete_voting: value.auto_complete_voting,
            room_type: value.room_type,
            is_game_over: value.is_game_over,
            active_story_node_id: value.active_story_node_id,
            created_at: value.created_at.to_system_time(),
            last_activity_at: value.last_activity_at.to_system_time(),
            owner_id: value.owner_id,
            password_hash: value.password_hash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    room_id: String,
    name: String,
    is_spectator: bool,
    joined_at: DateTime,
    last_reaction_type: Option<String>,
    last_reaction_at: Option<DateTime>,
}

impl From<UserEntity> for MongoUserDocument {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            name: value.name,
            is_spectator: value.is_spectator,
            joined_at: DateTime::from_system_time(value.joined_at),
            last_reaction_type: value.last_reaction_type,
            last_reaction_at: value.last_reaction_at.map(DateTime::from_system_time),
        }
    }
}

impl From<MongoUserDocument> for UserEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            name: value.name,
            is_spectator: value.is_spectator,
            joined_at: value.joined_at.to_system_time(),
            last_reaction_type: value.last_reaction_type,
            last_reaction_at: value.last_reaction_at.map(|at| at.to_system_time()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoteDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    room_id: String,
    user_id: Uuid,
    card_label: String,
    card_value: Option<f64>,
    card_icon: Option<String>,
}

impl From<VoteEntity> for MongoVoteDocument {
    fn from(value: VoteEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            card_label: value.card_label,
            card_value: value.card_value,
            card_icon: value.card_icon,
        }
    }
}

impl From<MongoVoteDocument> for VoteEntity {
    fn from(value: MongoVoteDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            card_label: value.card_label,
            card_value: value.card_value,
            card_icon: value.card_icon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoNodeDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    room_id: String,
    node_id: String,
    position: NodePosition,
    data: NodeData,
    is_locked: bool,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<CanvasNodeEntity> for MongoNodeDocument {
    fn from(value: CanvasNodeEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            node_id: value.node_id,
            position: value.position,
            data: value.data,
            is_locked: value.is_locked,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoNodeDocument> for CanvasNodeEntity {
    fn from(value: MongoNodeDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            node_id: value.node_id,
            position: value.position,
            data: value.data,
            is_locked: value.is_locked,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoActivityDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    room_id: String,
    user_id: Option<Uuid>,
    user_name: Option<String>,
    kind: String,
    description: String,
    created_at: DateTime,
}

impl From<ActivityEntity> for MongoActivityDocument {
    fn from(value: ActivityEntity) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            user_name: value.user_name,
            kind: value.kind,
            description: value.description,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoActivityDocument> for ActivityEntity {
    fn from(value: MongoActivityDocument) -> Self {
        Self {
            id: value.id,
            room_id: value.room_id,
            user_id: value.user_id,
            user_name: value.user_name,
            kind: value.kind,
            description: value.description,
            created_at: value.created_at.to_system_time(),
        }
    }
}

pub fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
