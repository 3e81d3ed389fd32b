//! Persistence layer: entities, storage errors, and the room store backends.

pub mod models;
pub mod room_store;
pub mod storage;
