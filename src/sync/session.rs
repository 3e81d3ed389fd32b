//! Client-side room session: optimistic event patches reconciled against
//! authoritative snapshots.
//!
//! Relay frames are applied to the local copy immediately; a debounced
//! snapshot fetch then overwrites the whole copy. Kick detection lives here:
//! a user who is absent from an authoritative snapshot after the join grace
//! period, without having left voluntarily, has been kicked.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::{
    dto::{
        room::{RoomSnapshot, VoteView},
        ws::RelayOutboundMessage,
    },
};

/// Time after joining during which an absent-from-snapshot result is treated
/// as replication lag rather than a kick.
pub const JOIN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle phase of a session. `Kicked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Waiting for the first authoritative snapshot.
    Joining,
    /// Live and reconciling.
    Joined,
    /// Removed from the room; no further reconciliation happens.
    Kicked,
}

/// What a reconciliation pass concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Snapshot adopted, session still a member.
    Synced,
    /// Session's user vanished from the room; reported exactly once.
    Kicked,
    /// Session's user left on purpose; not a kick.
    VoluntaryLeave,
    /// User absent but the evidence is not conclusive yet.
    Detached,
}

/// One user's synchronized view of a room.
pub struct RoomSession {
    user_id: Uuid,
    phase: SyncPhase,
    joined_at: Instant,
    initial_load_done: bool,
    voluntary_leave: bool,
    snapshot: Option<RoomSnapshot>,
}

impl RoomSession {
    /// Start a session for `user_id`, beginning its join grace period now.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            phase: SyncPhase::Joining,
            joined_at: Instant::now(),
            initial_load_done: false,
            voluntary_leave: false,
            snapshot: None,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Latest room copy, authoritative or optimistically patched.
    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        self.snapshot.as_ref()
    }

    /// Note that this user is about to leave on purpose, so the next
    /// reconciliation does not mistake the departure for a kick.
    pub fn mark_voluntary_leave(&mut self) {
        self.voluntary_leave = true;
    }

    /// Patch the local copy with a relay frame, ahead of the debounced fetch.
    pub fn apply_event(&mut self, event: &RelayOutboundMessage) {
        if self.phase == SyncPhase::Kicked {
            return;
        }

        if let RelayOutboundMessage::UserKicked { user_id } = event {
            if *user_id == self.user_id {
                self.phase = SyncPhase::Kicked;
                return;
            }
        }

        let Some(snapshot) = self.snapshot.as_mut() else {
            return;
        };

        match event {
            RelayOutboundMessage::VoteCast { vote } => {
                upsert_vote(&mut snapshot.votes, vote.clone());
            }
            RelayOutboundMessage::VoteError { user_id, .. } => {
                snapshot.votes.retain(|vote| vote.user_id != *user_id);
            }
            RelayOutboundMessage::VoteRevealed { revealed } => {
                snapshot.room.is_game_over = *revealed;
            }
            RelayOutboundMessage::VoteReset => {
                snapshot.votes.clear();
                snapshot.room.is_game_over = false;
            }
            RelayOutboundMessage::UserKicked { user_id } => {
                snapshot.users.retain(|user| user.id != *user_id);
                snapshot.votes.retain(|vote| vote.user_id != *user_id);
            }
            RelayOutboundMessage::UserUpdated { user } => {
                if let Some(existing) =
                    snapshot.users.iter_mut().find(|entry| entry.id == user.id)
                {
                    *existing = user.clone();
                }
            }
            RelayOutboundMessage::RoomSettingsUpdated { settings } => {
                if let Some(name) = &settings.name {
                    snapshot.room.name = name.clone();
                }
                if let Some(voting_system) = settings.voting_system {
                    snapshot.room.voting_system = voting_system;
                }
                if let Some(voting_categorized) = settings.voting_categorized {
                    snapshot.room.voting_categorized = voting_categorized;
                }
                if let Some(auto_complete_voting) = settings.auto_complete_voting {
                    snapshot.room.auto_complete_voting = auto_complete_voting;
                }
            }
            RelayOutboundMessage::ActiveStoryChanged { story_node_id } => {
                snapshot.room.active_story_node_id = story_node_id.clone();
            }
            RelayOutboundMessage::GameStateUpdated { is_game_over } => {
                snapshot.room.is_game_over = *is_game_over;
            }
            // Presence, reactions, canvas, and timer frames do not touch the
            // durable snapshot.
            RelayOutboundMessage::UserConnected { .. }
            | RelayOutboundMessage::UserDisconnected { .. }
            | RelayOutboundMessage::EmojiReaction { .. }
            | RelayOutboundMessage::PresenceUpdate { .. }
            | RelayOutboundMessage::CanvasUpdate { .. }
            | RelayOutboundMessage::TimerUpdate { .. } => {}
        }
    }

    /// Adopt an authoritative snapshot, deciding whether this user is still a
    /// member. The snapshot always overwrites the local copy; optimistic
    /// patches are disposable.
    pub fn reconcile(&mut self, snapshot: RoomSnapshot) -> ReconcileOutcome {
        self.reconcile_at(snapshot, Instant::now())
    }

    fn reconcile_at(&mut self, snapshot: RoomSnapshot, now: Instant) -> ReconcileOutcome {
        if self.phase == SyncPhase::Kicked {
            return ReconcileOutcome::Kicked;
        }

        let present = snapshot
            .users
            .iter()
            .any(|user| user.id == self.user_id);
        let was_loaded = self.initial_load_done;

        self.snapshot = Some(snapshot);
        self.initial_load_done = true;

        if present {
            self.phase = SyncPhase::Joined;
            return ReconcileOutcome::Synced;
        }

        if self.voluntary_leave {
            self.voluntary_leave = false;
            return ReconcileOutcome::VoluntaryLeave;
        }

        let grace_over = now.duration_since(self.joined_at) >= JOIN_GRACE;
        let room_populated = self
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| !snapshot.users.is_empty());

        if was_loaded && grace_over && room_populated {
            self.phase = SyncPhase::Kicked;
            ReconcileOutcome::Kicked
        } else {
            ReconcileOutcome::Detached
        }
    }
}

fn upsert_vote(votes: &mut Vec<VoteView>, vote: VoteView) {
    match votes.iter_mut().find(|entry| entry.user_id == vote.user_id) {
        Some(existing) => *existing = vote,
        None => votes.push(vote),
    }
}
