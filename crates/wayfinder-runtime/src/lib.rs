//! `wayfinder-runtime` – the services that turn a map into motion.
//!
//! # Modules
//!
//! - [`mapper`] – [`remap`][mapper::remap]: loads a map snapshot, clusters
//!   its landmarks into rooms and rewrites the room index.
//! - [`navigator`] – [`NavigationOrchestrator`][navigator::NavigationOrchestrator]:
//!   resolves a room request, plans a collision-free route on a fresh
//!   occupancy grid and steps the motion layer through it waypoint by
//!   waypoint, reacting to arrival feedback, cancellation and new requests
//!   while a route is active.
//! - [`location`] – [`LocationBridge`][location::LocationBridge]: maps free
//!   text to navigation and location intents and renders replies;
//!   [`LocationService`][location::LocationService] runs it on the bus.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP exporter.
//!
//! Services share one [`RoomIndex`] through [`SharedRoomIndex`]; the lock is
//! held only for the duration of a query.

use std::sync::Arc;

use wayfinder_memory::RoomIndex;

pub mod location;
pub mod mapper;
pub mod navigator;
pub mod telemetry;

pub use location::{LocationBridge, LocationService, NavigationIntent};
pub use mapper::{MapperConfig, MapperError, RemapSummary, remap};
pub use navigator::{NavigationOrchestrator, NavigationState, NavigatorConfig, plan_route};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

/// Room index shared between the bus services and the operator shell.
pub type SharedRoomIndex = Arc<tokio::sync::Mutex<RoomIndex>>;

/// Wrap an opened [`RoomIndex`] for sharing.
pub fn share(index: RoomIndex) -> SharedRoomIndex {
    Arc::new(tokio::sync::Mutex::new(index))
}
