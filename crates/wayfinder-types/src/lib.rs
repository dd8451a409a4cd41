//! `wayfinder-types` – shared data model for the mapping and navigation stack.
//!
//! Everything that crosses a crate boundary or travels over the event bus is
//! defined here: landmarks from the SLAM snapshot, pose estimates, motion
//! commands for the actuator layer, navigation outcome notifications and the
//! [`Event`] envelope itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A 3-D map point produced by the external visual-SLAM tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Number of keyframes that observed this point.
    pub observation_count: u32,
}

impl Landmark {
    pub fn new(id: u64, x: f32, y: f32, z: f32, observation_count: u32) -> Self {
        Self {
            id,
            x,
            y,
            z,
            observation_count,
        }
    }
}

/// Tracker confidence attached to every pose estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    Ok,
    Lost,
    NotInitialized,
}

/// Planar robot pose in the map frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    /// Heading in radians, counter-clockwise from +x.
    pub heading: f32,
    #[serde(default)]
    pub tracking_state: TrackingState,
}

impl Pose {
    pub fn new(x: f32, y: f32, heading: f32) -> Self {
        Self {
            x,
            y,
            heading,
            tracking_state: TrackingState::Ok,
        }
    }

    /// Euclidean distance from this pose to `(x, y)`.
    pub fn distance_to(&self, x: f32, y: f32) -> f32 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

/// Commands published on `robot_action` for the motion layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MotionCommand {
    /// Drive to a single waypoint of the active route.
    MoveTo {
        x: f32,
        y: f32,
        heading: f32,
        /// Zero-based position of this waypoint in the route.
        index: usize,
        total: usize,
    },
    /// Halt all motion immediately.
    Stop,
}

/// Reason codes carried by `navigation_failed`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavFailure {
    #[error("room not found")]
    RoomNotFound,
    #[error("no pose received yet")]
    NoPose,
    #[error("no collision-free path")]
    NoPath,
    #[error("room store error")]
    Storage,
}

impl NavFailure {
    /// Wire-level reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavFailure::RoomNotFound => "room_not_found",
            NavFailure::NoPose => "no_pose",
            NavFailure::NoPath => "no_path",
            NavFailure::Storage => "storage",
        }
    }
}

/// Payload of `navigation_failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationFailed {
    pub reason: NavFailure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Payload of `navigation_complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationComplete {
    pub success: bool,
    pub room: String,
    /// Number of waypoint commands that were issued.
    pub waypoints: usize,
}

/// Answer published on `slam_room_response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomResponse {
    /// Natural-language reply.
    pub text: String,
    /// The room the reply is about, when one was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"wayfinder-runtime::navigator"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Pose(Pose),
    NavigateToRoom {
        room: String,
    },
    CancelNavigation,
    /// Arrival feedback from the motion layer. `index` identifies the
    /// waypoint when the sender knows it.
    WaypointReached {
        #[serde(default)]
        index: Option<usize>,
    },
    RobotAction(MotionCommand),
    NavigationFailed(NavigationFailed),
    NavigationComplete(NavigationComplete),
    /// Free-text utterance for the location bridge.
    RoomQuery {
        text: String,
    },
    RoomResponse(RoomResponse),
}

/// Global error type spanning bus, storage, snapshot and configuration faults.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum WayfinderError {
    #[error("Event bus error: {0}")]
    Channel(String),

    #[error("Room store error: {0}")]
    Storage(String),

    #[error("Map snapshot error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
