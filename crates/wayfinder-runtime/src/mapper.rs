//! Map → rooms pipeline.
//!
//! [`remap`] loads the tracker's snapshot, drops weakly observed landmarks,
//! clusters the rest and replaces the room index contents with one room per
//! cluster (`room_1`, `room_2`, … in cluster order), each carrying a single
//! `"center"` waypoint. The snapshot is parsed before anything is written and
//! the index is rewritten in one transaction, so a missing or malformed map,
//! or a storage error midway, leaves the existing rooms untouched.

use std::path::Path;

use thiserror::Error;
use tracing::info;
use wayfinder_memory::{NewRoom, NewWaypoint, RoomDraft, RoomIndex, RoomIndexError};
use wayfinder_perception::{ClusterConfig, MapSnapshot, SnapshotError, cluster_landmarks};
use wayfinder_types::Landmark;

/// Name of the waypoint created at every clustered room's centre.
pub const CENTER_WAYPOINT: &str = "center";

#[derive(Error, Debug)]
pub enum MapperError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    RoomIndex(#[from] RoomIndexError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MapperConfig {
    pub cluster: ClusterConfig,
    /// Landmarks seen by fewer keyframes are ignored.
    pub min_observations: u32,
}

/// Outcome of a successful [`remap`].
#[derive(Debug, Clone)]
pub struct RemapSummary {
    pub keyframes: usize,
    pub landmarks_total: usize,
    /// The filtered landmark set that was clustered; also the obstacle set
    /// for subsequent planning.
    pub landmarks: Vec<Landmark>,
    /// Names of the rooms created, in id order.
    pub rooms: Vec<String>,
}

/// Load the snapshot at `map_path` and rebuild the room index from it.
pub fn remap(
    index: &RoomIndex,
    map_path: impl AsRef<Path>,
    config: &MapperConfig,
) -> Result<RemapSummary, MapperError> {
    let snapshot = MapSnapshot::load(map_path)?;
    let landmarks = snapshot.well_observed(config.min_observations);
    let rooms = rebuild_rooms(index, &landmarks, &config.cluster)?;
    info!(
        keyframes = snapshot.keyframe_count,
        total = snapshot.landmarks.len(),
        used = landmarks.len(),
        rooms = rooms.len(),
        "remap complete"
    );
    Ok(RemapSummary {
        keyframes: snapshot.keyframe_count,
        landmarks_total: snapshot.landmarks.len(),
        landmarks,
        rooms,
    })
}

/// Replace the index contents with one room per landmark cluster.
pub fn rebuild_rooms(
    index: &RoomIndex,
    landmarks: &[Landmark],
    cluster: &ClusterConfig,
) -> Result<Vec<String>, RoomIndexError> {
    let drafts: Vec<RoomDraft> = cluster_landmarks(landmarks, cluster)
        .into_iter()
        .enumerate()
        .map(|(n, c)| RoomDraft {
            room: NewRoom {
                name: format!("room_{}", n + 1),
                label: None,
                bounds: Some(c.bounds),
                center: Some(c.center),
            },
            waypoints: vec![NewWaypoint {
                name: CENTER_WAYPOINT.to_string(),
                x: c.center.x,
                y: c.center.y,
                heading: 0.0,
            }],
            landmarks: c.landmarks,
        })
        .collect();

    index.replace_all(&drafts)?;
    Ok(drafts.into_iter().map(|d| d.room.name).collect())
}
