//! Persistence entities shared across storage backends and the service layer.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Card deck flavor used by a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum VotingSystem {
    /// Classic fibonacci sequence (0, 1, 2, 3, 5, 8, ...).
    Fibonacci,
    /// Rounded fibonacci variant (..., 20, 40, 100).
    ModifiedFibonacci,
    /// T-shirt sizes, no numeric values.
    Tshirt,
    /// Powers of two (1, 2, 4, 8, ...).
    #[serde(rename = "powers-of-2")]
    PowersOf2,
}

/// Layout flavor of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RoomType {
    /// Plain voting table.
    Classic,
    /// Freeform canvas with story/timer/player nodes.
    Canvas,
}

/// A planning session scoped collaboration space.
///
/// `is_game_over` toggles only through reveal/reset/story transitions;
/// `active_story_node_id`, when set, references an existing story node in the
/// same room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomEntity {
    /// Client-facing slug identifier.
    pub id: String,
    /// Display name of the room.
    pub name: String,
    /// Deck used for estimation.
    pub voting_system: VotingSystem,
    /// Whether votes are grouped by category in the UI.
    pub voting_categorized: bool,
    /// Reveal automatically once every non-spectator has voted.
    pub auto_complete_voting: bool,
    /// Layout flavor.
    pub room_type: RoomType,
    /// True once the current round has been revealed.
    pub is_game_over: bool,
    /// Story node currently being estimated, if any.
    pub active_story_node_id: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Bumped on every mutation; drives the retention sweep.
    pub last_activity_at: SystemTime,
    /// User that created the room, when known.
    pub owner_id: Option<Uuid>,
    /// Opaque password hash; compared verbatim on join.
    pub password_hash: Option<String>,
}

/// Partial update of a room's settings fields.
///
/// Carries only the fields a settings edit may touch; the contended round
/// state (`is_game_over`, `active_story_node_id`) is deliberately absent so a
/// settings write can never race a round-state patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSettingsUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New deck.
    pub voting_system: Option<VotingSystem>,
    /// New categorized-voting flag.
    pub voting_categorized: Option<bool>,
    /// New auto-complete flag.
    pub auto_complete_voting: Option<bool>,
}

/// A room participant.
///
/// Created on join, mutated on rename/spectator-toggle/reaction, deleted on
/// leave or kick. Deleting a user cascades to that user's vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEntity {
    /// Stable identifier for the user.
    pub id: Uuid,
    /// Room owning this user.
    pub room_id: String,
    /// Display name.
    pub name: String,
    /// Spectators observe without voting.
    pub is_spectator: bool,
    /// Timestamp of the join.
    pub joined_at: SystemTime,
    /// Durable trace of the last reaction, replayed by peers.
    pub last_reaction_type: Option<String>,
    /// When the last reaction was recorded; drives the cooldown.
    pub last_reaction_at: Option<SystemTime>,
}

/// A submitted estimation card. At most one per (room, user) — upsert semantics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteEntity {
    /// Stable identifier for the vote.
    pub id: Uuid,
    /// Room owning this vote.
    pub room_id: String,
    /// User who cast this vote.
    pub user_id: Uuid,
    /// Label of the picked card.
    pub card_label: String,
    /// Numeric value of the picked card, when it has one.
    pub card_value: Option<f64>,
    /// Optional icon shown instead of the label.
    pub card_icon: Option<String>,
}

/// 2D position of a node on the canvas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct NodePosition {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Type-specific payload of a canvas node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NodeData {
    /// A unit of work being estimated.
    Story {
        /// Short story title.
        title: String,
        /// Optional longer description.
        #[serde(default)]
        description: Option<String>,
        /// Set when the story received its final estimate.
        #[serde(default)]
        #[schema(value_type = Option<Object>)]
        completed_at: Option<SystemTime>,
        /// Skipped stories are excluded from next-story selection.
        #[serde(default)]
        skipped: bool,
        /// Consensus estimate recorded on completion.
        #[serde(default)]
        final_estimate: Option<String>,
    },
    /// Aggregated results display for the current round.
    Results {
        /// Free-text summary shown on the node.
        #[serde(default)]
        summary: Option<String>,
    },
    /// Shared countdown/count-up timer.
    Timer {
        /// Whether the timer is currently running.
        is_running: bool,
        /// Seconds elapsed at the time of the last sync.
        seconds: u64,
    },
    /// Avatar node representing a participant on the canvas.
    Player {
        /// User this node represents.
        user_id: Uuid,
    },
}

impl NodeData {
    /// Whether this payload is a story.
    pub fn is_story(&self) -> bool {
        matches!(self, NodeData::Story { .. })
    }
}

/// A node placed on the canvas room type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanvasNodeEntity {
    /// Stable identifier for the node record.
    pub id: Uuid,
    /// Room owning this node.
    pub room_id: String,
    /// Stable client-assigned key, unique within the room.
    pub node_id: String,
    /// Position on the canvas.
    pub position: NodePosition,
    /// Type-specific payload.
    pub data: NodeData,
    /// Locked nodes cannot be moved.
    pub is_locked: bool,
    /// Creation timestamp; defines story rotation order.
    pub created_at: SystemTime,
    /// Last modification timestamp.
    pub updated_at: SystemTime,
}

/// Append-only log entry consumed for notification purposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntity {
    /// Stable identifier for the entry.
    pub id: Uuid,
    /// Room this entry belongs to.
    pub room_id: String,
    /// User involved, when the activity concerns one.
    pub user_id: Option<Uuid>,
    /// Display name captured at the time of the activity.
    pub user_name: Option<String>,
    /// Activity kind (e.g. "user_left").
    pub kind: String,
    /// Human readable description.
    pub description: String,
    /// When the activity happened.
    pub created_at: SystemTime,
}
