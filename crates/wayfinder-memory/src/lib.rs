//! `wayfinder-memory` – the persisted spatial index.
//!
//! Gives the robot durable knowledge of the rooms it has mapped, utilising a
//! local SQLite substrate.
//!
//! # Modules
//!
//! - [`room_index`] – [`RoomIndex`][room_index::RoomIndex]: rooms, their
//!   member landmarks, named waypoints and symmetric adjacency, with
//!   point-in-room lookup and a JSON export/import of the whole graph.

pub mod room_index;

pub use room_index::{
    ConnectedRoom, NewRoom, NewWaypoint, Room, RoomDraft, RoomExport, RoomIndex, RoomIndexError,
    Waypoint,
};
