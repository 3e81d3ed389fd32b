//! Vote casting, reveal, and round reset.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::VoteEntity,
    dto::room::PickCardRequest,
    error::ServiceError,
    services::room_service::{activity, require_room},
    state::SharedState,
};

/// Outcome of a card pick.
#[derive(Debug)]
pub struct PickOutcome {
    /// The recorded vote.
    pub vote: VoteEntity,
    /// Set when the pick completed the round and auto-reveal fired.
    pub auto_revealed: bool,
}

/// Record (or replace) a user's vote for the current round.
///
/// The card must belong to the room's configured deck and the voter must not
/// be a spectator. When the room has auto-complete enabled and this pick was
/// the last missing vote, the round is revealed in the same call.
pub async fn pick_card(
    state: &SharedState,
    room_id: &str,
    user_id: Uuid,
    request: PickCardRequest,
) -> Result<PickOutcome, ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    let user = store
        .find_user(user_id)
        .await?
        .filter(|user| user.room_id == room.id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("user `{user_id}` not found in room `{room_id}`"))
        })?;
    if user.is_spectator {
        return Err(ServiceError::InvalidState(
            "spectators cannot vote".into(),
        ));
    }

    let deck = state.config().deck(room.voting_system);
    let card = deck
        .iter()
        .find(|card| card.label == request.card_label)
        .ok_or_else(|| {
            ServiceError::InvalidInput(format!(
                "card `{}` is not part of the room's deck",
                request.card_label
            ))
        })?;

    let vote = VoteEntity {
        id: Uuid::new_v4(),
        room_id: room.id.clone(),
        user_id,
        card_label: card.label.clone(),
        card_value: card.value,
        card_icon: card.icon.clone(),
    };

    store.upsert_vote(vote.clone()).await?;
    let now = SystemTime::now();
    store.touch_room(room.id.clone(), now).await?;

    let mut auto_revealed = false;
    if room.auto_complete_voting && !room.is_game_over {
        let users = store.find_users_by_room(room.id.clone()).await?;
        let votes = store.find_votes_by_room(room.id.clone()).await?;
        let everyone_voted = users
            .iter()
            .filter(|user| !user.is_spectator)
            .all(|user| votes.iter().any(|vote| vote.user_id == user.id));
        if everyone_voted {
            store.set_game_over(room.id.clone(), true, now).await?;
            store
                .append_activity(activity(
                    &room.id,
                    None,
                    None,
                    "cards_revealed",
                    "All votes are in, cards revealed automatically".into(),
                ))
                .await?;
            auto_revealed = true;
        }
    }

    Ok(PickOutcome {
        vote,
        auto_revealed,
    })
}

/// Withdraw a user's vote, reporting whether one existed.
pub async fn remove_card(
    state: &SharedState,
    room_id: &str,
    user_id: Uuid,
) -> Result<bool, ServiceError> {
    let store = state.require_room_store().await?;
    require_room(state, room_id).await?;

    let removed = store.delete_vote(room_id.to_owned(), user_id).await?;
    if removed {
        store
            .touch_room(room_id.to_owned(), SystemTime::now())
            .await?;
    }
    Ok(removed)
}

/// Reveal the current round. Idempotent.
pub async fn show_cards(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    if room.is_game_over {
        return Ok(());
    }

    store
        .set_game_over(room.id.clone(), true, SystemTime::now())
        .await?;
    store
        .append_activity(activity(
            &room.id,
            None,
            None,
            "cards_revealed",
            "Cards were revealed".into(),
        ))
        .await?;

    info!(room_id = %room.id, "cards revealed");
    Ok(())
}

/// Start a fresh round: drop every vote and clear the reveal flag.
pub async fn reset_game(state: &SharedState, room_id: &str) -> Result<(), ServiceError> {
    let store = state.require_room_store().await?;
    let room = require_room(state, room_id).await?;

    store.delete_votes_by_room(room.id.clone()).await?;
    store
        .set_game_over(room.id.clone(), false, SystemTime::now())
        .await?;
    store
        .append_activity(activity(
            &room.id,
            None,
            None,
            "game_reset",
            "A new round was started".into(),
        ))
        .await?;

    info!(room_id = %room.id, "round reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{RoomType, VotingSystem},
            room_store::memory::MemoryRoomStore,
        },
        dto::room::{CreateRoomRequest, JoinRoomRequest},
        services::room_service::{create_room, get_room, join_user},
        state::AppState,
    };

    async fn state_with_memory_store() -> SharedState {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::default()))
            .await;
        state
    }

    async fn seeded_room(state: &SharedState, auto_complete: bool) -> String {
        let view = create_room(
            state,
            CreateRoomRequest {
                name: "Sprint 42".into(),
                voting_system: VotingSystem::Fibonacci,
                voting_categorized: false,
                auto_complete_voting: auto_complete,
                room_type: RoomType::Classic,
                owner_id: None,
                password_hash: None,
            },
        )
        .await
        .unwrap();
        view.id
    }

    async fn seeded_user(state: &SharedState, room_id: &str, spectator: bool) -> Uuid {
        join_user(
            state,
            room_id,
            JoinRoomRequest {
                name: "alex".into(),
                is_spectator: spectator,
                password_hash: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    fn pick(label: &str) -> PickCardRequest {
        PickCardRequest {
            card_label: label.into(),
            card_value: None,
            card_icon: None,
        }
    }

    #[tokio::test]
    async fn repicking_replaces_the_previous_vote() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, false).await;
        let user_id = seeded_user(&state, &room_id, false).await;

        pick_card(&state, &room_id, user_id, pick("5")).await.unwrap();
        pick_card(&state, &room_id, user_id, pick("8")).await.unwrap();
        show_cards(&state, &room_id).await.unwrap();

        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert_eq!(snapshot.votes.len(), 1);
        assert_eq!(snapshot.votes[0].card_label.as_deref(), Some("8"));
        assert_eq!(snapshot.votes[0].card_value, Some(8.0));
    }

    #[tokio::test]
    async fn cards_outside_the_deck_are_rejected() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, false).await;
        let user_id = seeded_user(&state, &room_id, false).await;

        let result = pick_card(&state, &room_id, user_id, pick("42")).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn spectators_cannot_vote() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, false).await;
        let user_id = seeded_user(&state, &room_id, true).await;

        let result = pick_card(&state, &room_id, user_id, pick("5")).await;
        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn auto_complete_reveals_once_every_voter_voted() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, true).await;
        let first = seeded_user(&state, &room_id, false).await;
        let second = seeded_user(&state, &room_id, false).await;
        // Spectators do not count towards completion.
        seeded_user(&state, &room_id, true).await;

        let outcome = pick_card(&state, &room_id, first, pick("5")).await.unwrap();
        assert!(!outcome.auto_revealed);

        let outcome = pick_card(&state, &room_id, second, pick("8")).await.unwrap();
        assert!(outcome.auto_revealed);

        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert!(snapshot.room.is_game_over);
    }

    #[tokio::test]
    async fn reset_clears_votes_and_the_reveal_flag() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, false).await;
        let user_id = seeded_user(&state, &room_id, false).await;

        pick_card(&state, &room_id, user_id, pick("5")).await.unwrap();
        show_cards(&state, &room_id).await.unwrap();
        reset_game(&state, &room_id).await.unwrap();

        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert!(snapshot.votes.is_empty());
        assert!(!snapshot.room.is_game_over);
    }

    #[tokio::test]
    async fn full_round_reveals_both_cards_then_resets_clean() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, false).await;
        let first = seeded_user(&state, &room_id, false).await;
        let second = seeded_user(&state, &room_id, false).await;

        pick_card(&state, &room_id, first, pick("5")).await.unwrap();
        pick_card(&state, &room_id, second, pick("8")).await.unwrap();

        // Still hidden before reveal.
        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert!(snapshot.votes.iter().all(|vote| vote.card_label.is_none()));

        show_cards(&state, &room_id).await.unwrap();
        let snapshot = get_room(&state, &room_id).await.unwrap();
        let mut labels: Vec<_> = snapshot
            .votes
            .iter()
            .filter_map(|vote| vote.card_label.as_deref())
            .collect();
        labels.sort_unstable();
        assert_eq!(labels, ["5", "8"]);

        reset_game(&state, &room_id).await.unwrap();
        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert!(snapshot.votes.is_empty());
        assert!(!snapshot.room.is_game_over);
    }

    #[tokio::test]
    async fn show_cards_is_idempotent() {
        let state = state_with_memory_store().await;
        let room_id = seeded_room(&state, false).await;

        show_cards(&state, &room_id).await.unwrap();
        show_cards(&state, &room_id).await.unwrap();

        let snapshot = get_room(&state, &room_id).await.unwrap();
        assert!(snapshot.room.is_game_over);
    }
}
