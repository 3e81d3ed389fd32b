//! Per-room relay channels.
//!
//! Each room with at least one open socket has a channel holding the writer
//! handles of its members. Broadcasting serializes the frame once and pushes
//! the text to every member's writer task.

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::dto::ws::RelayOutboundMessage;

/// Handle used to push frames to a connected client.
#[derive(Clone)]
pub struct ClientConnection {
    /// Identity announced on the socket's first frame.
    pub user_id: Uuid,
    /// Display name announced alongside the identity.
    pub user_name: String,
    /// Sender feeding the socket's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Registry of live relay channels keyed by room id.
#[derive(Default)]
pub struct RelayChannels {
    rooms: DashMap<String, IndexMap<Uuid, ClientConnection>>,
}

impl RelayChannels {
    /// Add a connection to a room's channel, replacing any previous socket of
    /// the same user.
    pub fn register(&self, room_id: &str, connection: ClientConnection) {
        self.rooms
            .entry(room_id.to_owned())
            .or_default()
            .insert(connection.user_id, connection);
    }

    /// Remove a user's connection, dropping the channel when it empties.
    /// Returns whether a connection was actually removed.
    pub fn deregister(&self, room_id: &str, user_id: Uuid) -> bool {
        let mut removed = false;
        let mut drop_channel = false;
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            removed = members.shift_remove(&user_id).is_some();
            drop_channel = members.is_empty();
        }
        if drop_channel {
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }
        removed
    }

    /// Number of open sockets in a room's channel.
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Send a frame to every member of a channel, optionally skipping one
    /// user. Closed writers are ignored; their sockets are being torn down.
    pub fn broadcast(
        &self,
        room_id: &str,
        exclude: Option<Uuid>,
        message: &RelayOutboundMessage,
    ) {
        let Some(members) = self.rooms.get(room_id) else {
            return;
        };

        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(room_id = %room_id, error = %err, "failed to serialize relay frame");
                return;
            }
        };

        let text = Utf8Bytes::from(payload);
        for connection in members.values() {
            if exclude.is_some_and(|skip| skip == connection.user_id) {
                continue;
            }
            let _ = connection.tx.send(Message::Text(text.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(
        channels: &RelayChannels,
        room_id: &str,
        name: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let user_id = Uuid::new_v4();
        channels.register(
            room_id,
            ClientConnection {
                user_id,
                user_name: name.into(),
                tx,
            },
        );
        (user_id, rx)
    }

    #[test]
    fn broadcast_skips_the_excluded_user() {
        let channels = RelayChannels::default();
        let (sender, mut sender_rx) = connect(&channels, "sprint-42", "alex");
        let (_, mut peer_rx) = connect(&channels, "sprint-42", "sam");

        channels.broadcast(
            "sprint-42",
            Some(sender),
            &RelayOutboundMessage::VoteReset,
        );

        assert!(sender_rx.try_recv().is_err());
        assert!(matches!(peer_rx.try_recv(), Ok(Message::Text(_))));
    }

    #[test]
    fn broadcast_without_exclusion_reaches_everyone() {
        let channels = RelayChannels::default();
        let (_, mut first_rx) = connect(&channels, "sprint-42", "alex");
        let (_, mut second_rx) = connect(&channels, "sprint-42", "sam");

        channels.broadcast("sprint-42", None, &RelayOutboundMessage::VoteReset);

        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_ok());
    }

    #[test]
    fn deregister_drops_empty_channels() {
        let channels = RelayChannels::default();
        let (user_id, _rx) = connect(&channels, "sprint-42", "alex");
        assert_eq!(channels.member_count("sprint-42"), 1);

        assert!(channels.deregister("sprint-42", user_id));
        assert_eq!(channels.member_count("sprint-42"), 0);
        assert!(channels.rooms.get("sprint-42").is_none());
        // A second teardown finds nothing to remove.
        assert!(!channels.deregister("sprint-42", user_id));
    }

    #[test]
    fn reconnecting_replaces_the_previous_socket() {
        let channels = RelayChannels::default();
        let (tx, mut old_rx) = mpsc::unbounded_channel();
        let user_id = Uuid::new_v4();
        channels.register(
            "sprint-42",
            ClientConnection {
                user_id,
                user_name: "alex".into(),
                tx,
            },
        );

        let (tx, mut new_rx) = mpsc::unbounded_channel();
        channels.register(
            "sprint-42",
            ClientConnection {
                user_id,
                user_name: "alex".into(),
                tx,
            },
        );

        assert_eq!(channels.member_count("sprint-42"), 1);
        channels.broadcast("sprint-42", None, &RelayOutboundMessage::VoteReset);
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());
    }
}
