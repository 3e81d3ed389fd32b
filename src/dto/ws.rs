//! Relay wire protocol.
//!
//! Every frame is a JSON object tagged by `type`. Inbound frames carry the
//! `room_id` they target; outbound frames omit it since a socket belongs to
//! exactly one channel once identified.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    dao::models::NodePosition,
    dto::room::{RoomSettingsPatch, UserView, VoteView},
};

/// Cursor coordinates carried by presence frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CursorPosition {
    /// Horizontal coordinate in canvas space.
    pub x: f64,
    /// Vertical coordinate in canvas space.
    pub y: f64,
}

/// Timer state carried by timer frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimerState {
    /// Whether the countdown is running.
    pub is_running: bool,
    /// Remaining seconds at the time of the frame.
    pub seconds: u64,
}

/// Frames clients send to the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayInboundMessage {
    /// Channel identification; must be the first frame on the socket.
    JoinRoom {
        /// Channel to join.
        room_id: String,
        /// Identity of the connecting user.
        user_id: Uuid,
        /// Display name announced to peers.
        user_name: String,
    },
    /// Durable departure; naming another user is a kick.
    LeaveRoom {
        /// Channel the departure concerns.
        room_id: String,
        /// User leaving (or being kicked).
        user_id: Uuid,
    },
    /// A card was picked.
    VoteCast {
        /// Channel the vote concerns.
        room_id: String,
        /// Voter.
        user_id: Uuid,
        /// Label of the picked card.
        card_label: String,
        /// Numeric value of the picked card, when it has one.
        #[serde(default)]
        card_value: Option<f64>,
    },
    /// Round revealed or un-revealed.
    VoteRevealed {
        /// Channel the reveal concerns.
        room_id: String,
        /// New reveal state.
        revealed: bool,
    },
    /// Round reset.
    VoteReset {
        /// Channel the reset concerns.
        room_id: String,
    },
    /// Room settings changed.
    RoomSettingsUpdated {
        /// Channel the settings concern.
        room_id: String,
        /// Fields that changed.
        settings: RoomSettingsPatch,
    },
    /// Active story changed.
    ActiveStoryChanged {
        /// Channel the change concerns.
        room_id: String,
        /// New active story node, or null.
        story_node_id: Option<String>,
    },
    /// Game-over flag changed.
    GameStateUpdated {
        /// Channel the change concerns.
        room_id: String,
        /// New game-over flag.
        is_game_over: bool,
    },
    /// Ephemeral emoji reaction.
    EmojiReaction {
        /// Channel the reaction concerns.
        room_id: String,
        /// Reacting user.
        user_id: Uuid,
        /// Reaction kind.
        emoji: String,
        /// Horizontal origin of the animation.
        x: f64,
        /// Vertical origin of the animation.
        y: f64,
    },
    /// Ephemeral cursor position.
    PresenceUpdate {
        /// Channel the cursor belongs to.
        room_id: String,
        /// User moving the cursor.
        user_id: Uuid,
        /// New cursor position.
        cursor: CursorPosition,
    },
    /// Canvas node moved or edited.
    CanvasUpdate {
        /// Channel the node belongs to.
        room_id: String,
        /// Stable node key.
        node_id: String,
        /// New position, when the node moved.
        #[serde(default)]
        position: Option<NodePosition>,
        /// New payload, when the node was edited.
        #[serde(default)]
        data: Option<Value>,
    },
    /// Shared timer changed.
    TimerUpdate {
        /// Channel the timer belongs to.
        room_id: String,
        /// New timer state.
        timer_state: TimerState,
    },
    /// Forward-compatibility catch-all for frames this build does not know.
    #[serde(other)]
    Unknown,
}

impl RelayInboundMessage {
    /// Channel the frame targets, if it carries one.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::JoinRoom { room_id, .. }
            | Self::LeaveRoom { room_id, .. }
            | Self::VoteCast { room_id, .. }
            | Self::VoteRevealed { room_id, .. }
            | Self::VoteReset { room_id }
            | Self::RoomSettingsUpdated { room_id, .. }
            | Self::ActiveStoryChanged { room_id, .. }
            | Self::GameStateUpdated { room_id, .. }
            | Self::EmojiReaction { room_id, .. }
            | Self::PresenceUpdate { room_id, .. }
            | Self::CanvasUpdate { room_id, .. }
            | Self::TimerUpdate { room_id, .. } => Some(room_id),
            Self::Unknown => None,
        }
    }
}

/// Frames the relay sends to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelayOutboundMessage {
    /// A peer joined the channel.
    UserConnected {
        /// Joining user.
        user_id: Uuid,
        /// Display name of the joining user.
        user_name: String,
    },
    /// A peer's socket went away.
    UserDisconnected {
        /// Departing user.
        user_id: Uuid,
    },
    /// A user was removed from the room by a peer.
    UserKicked {
        /// Removed user.
        user_id: Uuid,
    },
    /// A user's profile changed.
    UserUpdated {
        /// New rendition of the user.
        user: UserView,
    },
    /// A vote was recorded; card fields follow the room's reveal state.
    VoteCast {
        /// The vote as peers may see it.
        vote: VoteView,
    },
    /// A vote could not be persisted; clients roll back the optimistic echo.
    VoteError {
        /// Voter whose card must be withdrawn.
        user_id: Uuid,
        /// Failure description.
        error: String,
    },
    /// Round revealed or un-revealed.
    VoteRevealed {
        /// New reveal state.
        revealed: bool,
    },
    /// Round reset.
    VoteReset,
    /// Room settings changed.
    RoomSettingsUpdated {
        /// Fields that changed.
        settings: RoomSettingsPatch,
    },
    /// Active story changed.
    ActiveStoryChanged {
        /// New active story node, or null.
        story_node_id: Option<String>,
    },
    /// Game-over flag changed.
    GameStateUpdated {
        /// New game-over flag.
        is_game_over: bool,
    },
    /// Ephemeral emoji reaction.
    EmojiReaction {
        /// Reacting user.
        user_id: Uuid,
        /// Reaction kind.
        emoji: String,
        /// Horizontal origin of the animation.
        x: f64,
        /// Vertical origin of the animation.
        y: f64,
    },
    /// Ephemeral cursor position.
    PresenceUpdate {
        /// User moving the cursor.
        user_id: Uuid,
        /// New cursor position.
        cursor: CursorPosition,
    },
    /// Canvas node moved or edited.
    CanvasUpdate {
        /// Stable node key.
        node_id: String,
        /// New position, when the node moved.
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<NodePosition>,
        /// New payload, when the node was edited.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// Shared timer changed.
    TimerUpdate {
        /// New timer state.
        timer_state: TimerState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_frame_parses() {
        let user_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"join-room","room_id":"sprint-42","user_id":"{user_id}","user_name":"alex"}}"#
        );
        let frame: RelayInboundMessage = serde_json::from_str(&raw).unwrap();
        match frame {
            RelayInboundMessage::JoinRoom {
                room_id,
                user_id: parsed,
                user_name,
            } => {
                assert_eq!(room_id, "sprint-42");
                assert_eq!(parsed, user_id);
                assert_eq!(user_name, "alex");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_types_do_not_fail_parsing() {
        let frame: RelayInboundMessage =
            serde_json::from_str(r#"{"type":"laser-show","room_id":"sprint-42"}"#).unwrap();
        assert!(matches!(frame, RelayInboundMessage::Unknown));
        assert!(frame.room_id().is_none());
    }

    #[test]
    fn vote_cast_accepts_valueless_cards() {
        let user_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"vote-cast","room_id":"sprint-42","user_id":"{user_id}","card_label":"?"}}"#
        );
        let frame: RelayInboundMessage = serde_json::from_str(&raw).unwrap();
        match frame {
            RelayInboundMessage::VoteCast {
                card_label,
                card_value,
                ..
            } => {
                assert_eq!(card_label, "?");
                assert!(card_value.is_none());
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn outbound_frames_are_kebab_case_tagged() {
        let frame = RelayOutboundMessage::VoteRevealed { revealed: true };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "vote-revealed");
        assert_eq!(json["revealed"], true);

        let frame = RelayOutboundMessage::VoteReset;
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "vote-reset");
    }
}
