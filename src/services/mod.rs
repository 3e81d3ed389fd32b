/// Canvas node management, including the shared timer node.
pub mod canvas_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Emoji reactions with a per-user cooldown.
pub mod reaction_service;
/// WebSocket relay connection and frame handling.
pub mod relay_service;
/// Background deletion of abandoned rooms.
pub mod retention;
/// Room lifecycle and membership operations.
pub mod room_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// Active story selection and rotation.
pub mod story_service;
/// Vote casting, reveal, and round reset.
pub mod voting_service;
