//! WebSocket relay: one channel per room, optimistic broadcast, async persistence.
//!
//! Frames are echoed to channel members first and persisted in a background
//! task afterwards, so one slow storage call never stalls the realtime path.
//! Vote persistence failures are compensated with a `vote-error` frame that
//! tells clients to withdraw the optimistic echo.

use std::time::{Duration, SystemTime};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        room::{PickCardRequest, VoteView},
        ws::{RelayInboundMessage, RelayOutboundMessage},
    },
    error::ServiceError,
    services::{
        canvas_service, room_service, story_service, voting_service,
        voting_service::PickOutcome,
    },
    state::{ClientConnection, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of a client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound frames flowing even while we await inbound ones.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match serde_json::from_str::<RelayInboundMessage>(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse relay frame");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let RelayInboundMessage::JoinRoom {
        room_id,
        user_id,
        user_name,
    } = inbound
    else {
        warn!("first frame was not join-room");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    state.channels().register(
        &room_id,
        ClientConnection {
            user_id,
            user_name: user_name.clone(),
            tx: outbound_tx.clone(),
        },
    );
    state.channels().broadcast(
        &room_id,
        Some(user_id),
        &RelayOutboundMessage::UserConnected {
            user_id,
            user_name: user_name.clone(),
        },
    );

    info!(room_id = %room_id, user_id = %user_id, "client joined relay channel");

    // Join persistence is best effort; a failure is logged and never closes
    // the freshly opened channel.
    spawn_persist(&state, &room_id, "join-room", {
        let state = state.clone();
        let room_id = room_id.clone();
        async move { room_service::record_join(&state, &room_id, user_id, &user_name).await }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<RelayInboundMessage>(&text) {
                Ok(frame) => {
                    if frame
                        .room_id()
                        .is_some_and(|target| target != room_id)
                    {
                        warn!(
                            room_id = %room_id,
                            user_id = %user_id,
                            "ignoring frame addressed to another room"
                        );
                        continue;
                    }
                    dispatch(&state, &room_id, user_id, frame);
                }
                Err(err) => {
                    warn!(room_id = %room_id, user_id = %user_id, error = %err, "failed to parse relay frame");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(room_id = %room_id, user_id = %user_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(room_id = %room_id, user_id = %user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // A raw socket drop is not a durable departure; membership stays intact so
    // reconnecting clients are not mistaken for kicked ones. When a leave or
    // kick frame already removed the registration, peers were notified then.
    if state.channels().deregister(&room_id, user_id) {
        state.channels().broadcast(
            &room_id,
            None,
            &RelayOutboundMessage::UserDisconnected { user_id },
        );
        info!(room_id = %room_id, user_id = %user_id, "client left relay channel");
    }

    finalize(writer_task, outbound_tx).await;
}

/// Route a parsed frame: echo to the channel, then persist off the hot path.
fn dispatch(state: &SharedState, room_id: &str, sender_id: Uuid, frame: RelayInboundMessage) {
    match frame {
        RelayInboundMessage::JoinRoom { .. } => {
            warn!(room_id = %room_id, user_id = %sender_id, "ignoring duplicate join-room frame");
        }
        RelayInboundMessage::LeaveRoom { user_id, .. } => {
            handle_leave(state, room_id, sender_id, user_id);
        }
        RelayInboundMessage::VoteCast {
            user_id,
            card_label,
            card_value,
            ..
        } => {
            handle_vote(state, room_id, user_id, card_label, card_value);
        }
        RelayInboundMessage::VoteRevealed { revealed, .. } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::VoteRevealed { revealed },
            );
            spawn_persist(state, room_id, "vote-revealed", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move {
                    if revealed {
                        voting_service::show_cards(&state, &room_id).await
                    } else {
                        let store = state.require_room_store().await?;
                        store
                            .set_game_over(room_id, false, SystemTime::now())
                            .await?;
                        Ok(())
                    }
                }
            });
        }
        RelayInboundMessage::VoteReset { .. } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::VoteReset,
            );
            spawn_persist(state, room_id, "vote-reset", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move { voting_service::reset_game(&state, &room_id).await }
            });
        }
        RelayInboundMessage::RoomSettingsUpdated { settings, .. } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::RoomSettingsUpdated {
                    settings: settings.clone(),
                },
            );
            spawn_persist(state, room_id, "room-settings-updated", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move {
                    room_service::update_settings(&state, &room_id, settings).await?;
                    Ok(())
                }
            });
        }
        RelayInboundMessage::ActiveStoryChanged { story_node_id, .. } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::ActiveStoryChanged {
                    story_node_id: story_node_id.clone(),
                },
            );
            spawn_persist(state, room_id, "active-story-changed", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move { story_service::set_active_story(&state, &room_id, story_node_id).await }
            });
        }
        RelayInboundMessage::GameStateUpdated { is_game_over, .. } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::GameStateUpdated { is_game_over },
            );
            spawn_persist(state, room_id, "game-state-updated", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move {
                    let store = state.require_room_store().await?;
                    store
                        .set_game_over(room_id, is_game_over, SystemTime::now())
                        .await?;
                    Ok(())
                }
            });
        }
        // Ephemeral frames are relayed to peers and never persisted.
        RelayInboundMessage::EmojiReaction {
            user_id, emoji, x, y, ..
        } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::EmojiReaction {
                    user_id,
                    emoji,
                    x,
                    y,
                },
            );
        }
        RelayInboundMessage::PresenceUpdate {
            user_id, cursor, ..
        } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::PresenceUpdate { user_id, cursor },
            );
        }
        RelayInboundMessage::CanvasUpdate {
            node_id,
            position,
            data,
            ..
        } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::CanvasUpdate {
                    node_id: node_id.clone(),
                    position,
                    data: data.clone(),
                },
            );
            spawn_persist(state, room_id, "canvas-update", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move {
                    canvas_service::apply_update(&state, &room_id, &node_id, position, data).await
                }
            });
        }
        RelayInboundMessage::TimerUpdate { timer_state, .. } => {
            state.channels().broadcast(
                room_id,
                Some(sender_id),
                &RelayOutboundMessage::TimerUpdate {
                    timer_state: timer_state.clone(),
                },
            );
            spawn_persist(state, room_id, "timer-update", {
                let state = state.clone();
                let room_id = room_id.to_owned();
                async move { canvas_service::apply_timer_update(&state, &room_id, timer_state).await }
            });
        }
        RelayInboundMessage::Unknown => {
            debug!(room_id = %room_id, user_id = %sender_id, "ignoring unknown frame type");
        }
    }
}

/// Echo the vote to the whole channel, then persist it; on failure tell every
/// client to withdraw the optimistic card.
fn handle_vote(
    state: &SharedState,
    room_id: &str,
    user_id: Uuid,
    card_label: String,
    card_value: Option<f64>,
) {
    // Card fields stay hidden until reveal; peers only learn that a vote exists.
    state.channels().broadcast(
        room_id,
        None,
        &RelayOutboundMessage::VoteCast {
            vote: VoteView {
                user_id,
                has_voted: true,
                card_label: None,
                card_value: None,
                card_icon: None,
            },
        },
    );

    let state = state.clone();
    let room_id = room_id.to_owned();
    tokio::spawn(async move {
        let limit = state.config().persistence_timeout();
        let request = PickCardRequest {
            card_label,
            card_value,
            card_icon: None,
        };
        let outcome = match timeout(
            limit,
            voting_service::pick_card(&state, &room_id, user_id, request),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceError::Timeout),
        };

        settle_vote(&state, &room_id, user_id, outcome);
    });
}

/// Apply the persistence outcome of an optimistic vote echo: a reveal frame
/// when the pick completed the round, a compensating `vote-error` frame on
/// failure so clients withdraw the card.
fn settle_vote(
    state: &SharedState,
    room_id: &str,
    user_id: Uuid,
    outcome: Result<PickOutcome, ServiceError>,
) {
    match outcome {
        Ok(outcome) => {
            if outcome.auto_revealed {
                state.channels().broadcast(
                    room_id,
                    None,
                    &RelayOutboundMessage::VoteRevealed { revealed: true },
                );
            }
        }
        Err(err) => {
            warn!(room_id = %room_id, user_id = %user_id, error = %err, "vote persistence failed");
            state.channels().broadcast(
                room_id,
                None,
                &RelayOutboundMessage::VoteError {
                    user_id,
                    error: err.to_string(),
                },
            );
        }
    }
}

/// Durable departure. A frame naming the sender is a voluntary leave; naming
/// anyone else is a kick announced to the whole channel, the target included.
/// Either way the target's registration is dropped, so no further room
/// traffic reaches it.
fn handle_leave(state: &SharedState, room_id: &str, sender_id: Uuid, target_id: Uuid) {
    if target_id == sender_id {
        state.channels().broadcast(
            room_id,
            Some(sender_id),
            &RelayOutboundMessage::UserDisconnected { user_id: target_id },
        );
    } else {
        info!(room_id = %room_id, by = %sender_id, user_id = %target_id, "user kicked");
        // The target is still registered here and receives the kick frame.
        state.channels().broadcast(
            room_id,
            None,
            &RelayOutboundMessage::UserKicked { user_id: target_id },
        );
    }
    state.channels().deregister(room_id, target_id);

    spawn_persist(state, room_id, "leave-room", {
        let state = state.clone();
        async move {
            room_service::leave_user(&state, target_id).await?;
            Ok(())
        }
    });
}

/// Run a persistence future off the hot path, bounded by the configured
/// timeout. Failures are logged; the realtime echo already went out.
fn spawn_persist<F>(state: &SharedState, room_id: &str, action: &'static str, fut: F)
where
    F: std::future::Future<Output = Result<(), ServiceError>> + Send + 'static,
{
    let limit = state.config().persistence_timeout();
    let room_id = room_id.to_owned();
    tokio::spawn(async move {
        match timeout(limit, fut).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(room_id = %room_id, action, error = %err, "relay persistence failed");
            }
            Err(_) => {
                warn!(room_id = %room_id, action, "relay persistence timed out");
            }
        }
    });
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::VoteEntity, room_store::memory::MemoryRoomStore},
        state::AppState,
    };

    async fn state_with_memory_store() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::default()))
            .await;
        state
    }

    fn connect(
        state: &SharedState,
        room_id: &str,
        name: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let user_id = Uuid::new_v4();
        state.channels().register(
            room_id,
            ClientConnection {
                user_id,
                user_name: name.into(),
                tx,
            },
        );
        (user_id, rx)
    }

    fn received_types(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
            types.push(frame["type"].as_str().unwrap_or_default().to_owned());
        }
        types
    }

    #[tokio::test]
    async fn kick_announces_to_the_target_then_drops_its_registration() {
        let state = state_with_memory_store().await;
        let (kicker, mut kicker_rx) = connect(&state, "sprint-42", "alex");
        let (target, mut target_rx) = connect(&state, "sprint-42", "sam");

        handle_leave(&state, "sprint-42", kicker, target);

        assert!(received_types(&mut target_rx).contains(&"user-kicked".to_owned()));
        assert_eq!(state.channels().member_count("sprint-42"), 1);

        // Later room traffic no longer reaches the kicked user.
        state
            .channels()
            .broadcast("sprint-42", None, &RelayOutboundMessage::VoteReset);
        assert!(received_types(&mut target_rx).is_empty());
        assert!(received_types(&mut kicker_rx).contains(&"vote-reset".to_owned()));
    }

    #[tokio::test]
    async fn voluntary_leave_notifies_peers_and_deregisters() {
        let state = state_with_memory_store().await;
        let (leaver, mut leaver_rx) = connect(&state, "sprint-42", "alex");
        let (_peer, mut peer_rx) = connect(&state, "sprint-42", "sam");

        handle_leave(&state, "sprint-42", leaver, leaver);

        assert!(received_types(&mut peer_rx).contains(&"user-disconnected".to_owned()));
        assert!(received_types(&mut leaver_rx).is_empty());
        assert_eq!(state.channels().member_count("sprint-42"), 1);
        // The socket teardown finds nothing left to remove, so peers are not
        // told about the departure twice.
        assert!(!state.channels().deregister("sprint-42", leaver));
    }

    #[tokio::test]
    async fn failed_vote_persistence_broadcasts_a_compensation_frame() {
        let state = state_with_memory_store().await;
        let (voter, mut voter_rx) = connect(&state, "sprint-42", "alex");

        settle_vote(
            &state,
            "sprint-42",
            voter,
            Err(ServiceError::Timeout),
        );

        assert_eq!(received_types(&mut voter_rx), vec!["vote-error".to_owned()]);
    }

    #[tokio::test]
    async fn completed_round_outcome_broadcasts_the_reveal() {
        let state = state_with_memory_store().await;
        let (voter, mut voter_rx) = connect(&state, "sprint-42", "alex");

        settle_vote(
            &state,
            "sprint-42",
            voter,
            Ok(PickOutcome {
                vote: VoteEntity {
                    id: Uuid::new_v4(),
                    room_id: "sprint-42".into(),
                    user_id: voter,
                    card_label: "5".into(),
                    card_value: Some(5.0),
                    card_icon: None,
                },
                auto_revealed: true,
            }),
        );

        assert_eq!(
            received_types(&mut voter_rx),
            vec!["vote-revealed".to_owned()]
        );
    }
}
