//! Client-side synchronization building blocks.
//!
//! These types model how a client keeps its copy of a room consistent with
//! the backend: relay frames patch the copy optimistically, a debounced fetch
//! of the authoritative snapshot reconciles it, and the shared timer is
//! extrapolated locally between frames.

/// Debounced snapshot refetching.
pub mod refetch;
/// Session lifecycle and snapshot reconciliation.
pub mod session;
/// Local rendering of the shared timer.
pub mod timer;

pub use refetch::{DEFAULT_DEBOUNCE, RefetchScheduler};
pub use session::{JOIN_GRACE, ReconcileOutcome, RoomSession, SyncPhase};
pub use timer::{DISPLAY_TICK, TimerDisplay};
