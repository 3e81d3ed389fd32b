//! Room, user, vote, node, and activity payloads for the mutation API.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        ActivityEntity, CanvasNodeEntity, NodeData, NodePosition, RoomEntity, RoomType,
        UserEntity, VoteEntity, VotingSystem,
    },
    dto::format_system_time,
};

/// Payload used to create a room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Display name of the room.
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    /// Deck flavor; defaults to fibonacci.
    #[serde(default = "default_voting_system")]
    pub voting_system: VotingSystem,
    /// Group votes by category in the UI.
    #[serde(default)]
    pub voting_categorized: bool,
    /// Reveal automatically once every non-spectator has voted.
    #[serde(default)]
    pub auto_complete_voting: bool,
    /// Layout flavor; defaults to the classic table.
    #[serde(default = "default_room_type")]
    pub room_type: RoomType,
    /// User creating the room, when known.
    #[serde(default)]
    pub owner_id: Option<Uuid>,
    /// Opaque password hash protecting the room.
    #[serde(default)]
    pub password_hash: Option<String>,
}

fn default_voting_system() -> VotingSystem {
    VotingSystem::Fibonacci
}

fn default_room_type() -> RoomType {
    RoomType::Classic
}

/// Payload used to join a room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Display name of the joining user.
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    /// Join as a non-voting observer.
    #[serde(default)]
    pub is_spectator: bool,
    /// Opaque password hash, required for protected rooms.
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Partial update of a user.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EditUserRequest {
    /// New display name, when renaming.
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    /// New spectator flag, when toggling.
    pub is_spectator: Option<bool>,
}

/// Card picked by a user.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PickCardRequest {
    /// Label of the picked card; must belong to the room's deck.
    #[validate(length(min = 1, max = 16))]
    pub card_label: String,
    /// Numeric value of the card, when it has one.
    #[serde(default)]
    pub card_value: Option<f64>,
    /// Optional icon shown instead of the label.
    #[serde(default)]
    pub card_icon: Option<String>,
}

/// Target of an active-story change; `None` clears the active story.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActiveStoryRequest {
    /// Story node to activate, or null.
    pub node_id: Option<String>,
}

/// Final estimate recorded when a story is completed.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct EstimationRequest {
    /// Consensus estimate (a card label).
    #[validate(length(min = 1, max = 16))]
    pub estimate: String,
}

/// Emoji reaction request.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReactionRequest {
    /// Reaction kind (e.g. "thumbs-up").
    #[validate(length(min = 1, max = 32))]
    pub emoji_type: String,
}

/// Payload used to place a node on the canvas.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateNodeRequest {
    /// Stable client-assigned key, unique within the room.
    #[validate(length(min = 1, max = 64))]
    pub node_id: String,
    /// Position on the canvas.
    pub position: NodePosition,
    /// Type-specific payload.
    pub data: NodeData,
    /// Locked nodes cannot be moved.
    #[serde(default)]
    pub is_locked: bool,
}

/// Partial update of room settings, relayed and persisted as-is.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomSettingsPatch {
    /// New room name.
    pub name: Option<String>,
    /// New deck flavor.
    pub voting_system: Option<VotingSystem>,
    /// New categorized-voting flag.
    pub voting_categorized: Option<bool>,
    /// New auto-complete flag.
    pub auto_complete_voting: Option<bool>,
}

/// Query string for the activity feed.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ActivityQuery {
    /// Only return activities created after this instant (ms since epoch).
    pub since: Option<u64>,
}

/// Minimal acknowledgement for state-changing endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Always "ok" on success.
    pub status: String,
}

impl ActionResponse {
    /// Standard success acknowledgement.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Where the story rotation landed after an estimation or a skip.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct NextStoryResponse {
    /// Story node now being estimated, or null when the backlog is done.
    pub next_story_node_id: Option<String>,
}

/// Client-facing view of a room.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomView {
    /// Room slug.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Deck flavor.
    pub voting_system: VotingSystem,
    /// Categorized-voting flag.
    pub voting_categorized: bool,
    /// Auto-complete flag.
    pub auto_complete_voting: bool,
    /// Layout flavor.
    pub room_type: RoomType,
    /// True once the current round has been revealed.
    pub is_game_over: bool,
    /// Story node currently being estimated.
    pub active_story_node_id: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the latest mutation.
    pub last_activity_at: String,
    /// Owner, when known.
    pub owner_id: Option<Uuid>,
    /// Whether a password is required to join.
    pub has_password: bool,
}

impl From<RoomEntity> for RoomView {
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
            created_at: format_system_time(value.created_at),
            last_activity_at: format_system_time(value.last_activity_at),
            owner_id: value.owner_id,
            has_password: value.password_hash.is_some(),
        }
    }
}

/// Client-facing view of a user.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    /// User id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Spectators observe without voting.
    pub is_spectator: bool,
    /// RFC 3339 join timestamp.
    pub joined_at: String,
    /// Last reaction kind, replayed by peers.
    pub last_reaction_type: Option<String>,
    /// RFC 3339 timestamp of the last reaction.
    pub last_reaction_at: Option<String>,
}

impl From<UserEntity> for UserView {
    fn from(value: UserEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            is_spectator: value.is_spectator,
            joined_at: format_system_time(value.joined_at),
            last_reaction_type: value.last_reaction_type,
            last_reaction_at: value.last_reaction_at.map(format_system_time),
        }
    }
}

/// Client-facing view of a vote.
///
/// While the round is running only `has_voted` is meaningful; the card fields
/// are withheld until the room's `is_game_over` flag is set.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoteView {
    /// User who cast this vote.
    pub user_id: Uuid,
    /// Whether the user has a vote on record.
    pub has_voted: bool,
    /// Card label, present only once revealed.
    pub card_label: Option<String>,
    /// Card value, present only once revealed.
    pub card_value: Option<f64>,
    /// Card icon, present only once revealed.
    pub card_icon: Option<String>,
}

impl VoteView {
    /// Hidden rendition used while the round is running.
    pub fn sanitized(vote: &VoteEntity) -> Self {
        Self {
            user_id: vote.user_id,
            has_voted: true,
            card_label: None,
            card_value: None,
            card_icon: None,
        }
    }

    /// Full rendition used once the round has been revealed.
    pub fn revealed(vote: &VoteEntity) -> Self {
        Self {
            user_id: vote.user_id,
            has_voted: true,
            card_label: Some(vote.card_label.clone()),
            card_value: vote.card_value,
            card_icon: vote.card_icon.clone(),
        }
    }
}

/// Durable snapshot of a room returned by `getRoom` and reconciled by clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoomSnapshot {
    /// The room itself.
    pub room: RoomView,
    /// Users in join order.
    pub users: Vec<UserView>,
    /// Votes, sanitized while the round is running.
    pub votes: Vec<VoteView>,
}

impl RoomSnapshot {
    /// Assemble a snapshot, applying the vote sanitization law.
    pub fn assemble(room: RoomEntity, users: Vec<UserEntity>, votes: Vec<VoteEntity>) -> Self {
        let votes = votes
            .iter()
            .map(|vote| {
                if room.is_game_over {
                    VoteView::revealed(vote)
                } else {
                    VoteView::sanitized(vote)
                }
            })
            .collect();

        Self {
            room: room.into(),
            users: users.into_iter().map(Into::into).collect(),
            votes,
        }
    }
}

/// Client-facing view of a canvas node.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CanvasNodeView {
    /// Stable client-assigned key.
    pub node_id: String,
    /// Position on the canvas.
    pub position: NodePosition,
    /// Type-specific payload.
    pub data: NodeData,
    /// Locked nodes cannot be moved.
    pub is_locked: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the latest change.
    pub updated_at: String,
}

impl From<CanvasNodeEntity> for CanvasNodeView {
    fn from(value: CanvasNodeEntity) -> Self {
        Self {
            node_id: value.node_id,
            position: value.position,
            data: value.data,
            is_locked: value.is_locked,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
        }
    }
}

/// Client-facing view of an activity log entry.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivityView {
    /// Entry id.
    pub id: Uuid,
    /// User involved, when the activity concerns one.
    pub user_id: Option<Uuid>,
    /// Display name captured at the time of the activity.
    pub user_name: Option<String>,
    /// Activity kind (e.g. "user_left").
    pub kind: String,
    /// Human readable description.
    pub description: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl From<ActivityEntity> for ActivityView {
    fn from(value: ActivityEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            user_name: value.user_name,
            kind: value.kind,
            description: value.description,
            created_at: format_system_time(value.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn entity_fixtures() -> (RoomEntity, Vec<UserEntity>, Vec<VoteEntity>) {
        let room = RoomEntity {
            id: "sprint-42".into(),
            name: "Sprint 42".into(),
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
        };
        let user = UserEntity {
            id: Uuid::new_v4(),
            room_id: room.id.clone(),
            name: "alex".into(),
            is_spectator: false,
            joined_at: SystemTime::now(),
            last_reaction_type: None,
            last_reaction_at: None,
        };
        let vote = VoteEntity {
            id: Uuid::new_v4(),
            room_id: room.id.clone(),
            user_id: user.id,
            card_label: "5".into(),
            card_value: Some(5.0),
            card_icon: None,
        };
        (room, vec![user], vec![vote])
    }

    #[test]
    fn votes_are_sanitized_while_the_round_is_running() {
        let (room, users, votes) = entity_fixtures();
        let snapshot = RoomSnapshot::assemble(room, users, votes);

        assert_eq!(snapshot.votes.len(), 1);
        assert!(snapshot.votes[0].has_voted);
        assert!(snapshot.votes[0].card_label.is_none());
        assert!(snapshot.votes[0].card_value.is_none());
    }

    #[test]
    fn votes_are_revealed_once_the_round_is_over() {
        let (mut room, users, votes) = entity_fixtures();
        room.is_game_over = true;
        let snapshot = RoomSnapshot::assemble(room, users, votes);

        assert_eq!(snapshot.votes[0].card_label.as_deref(), Some("5"));
        assert_eq!(snapshot.votes[0].card_value, Some(5.0));
    }
}
