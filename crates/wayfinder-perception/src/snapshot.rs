//! Map snapshot loader.
//!
//! The SLAM tracker exports its map as a JSON document holding some mapping
//! metadata and the landmark cloud. Trackers disagree on the exact shape, so
//! the loader accepts:
//!
//! * the landmark collection as a flat list **or** a map keyed by landmark id;
//! * positions as a `[x, y, z]` array or an `{ "x", "y", "z" }` object;
//! * a handful of key aliases (`map_points`, `pos`, `observations`, …).
//!
//! ```rust
//! use wayfinder_perception::snapshot::MapSnapshot;
//!
//! let json = r#"{
//!     "keyframes": 12,
//!     "landmarks": { "7": { "position": [1.0, 2.0, 0.5], "observations": 4 } }
//! }"#;
//! let snapshot = MapSnapshot::from_json_str(json).unwrap();
//! assert_eq!(snapshot.keyframe_count, 12);
//! assert_eq!(snapshot.landmarks[0].id, 7);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use wayfinder_types::Landmark;

/// Errors that can arise while loading a map snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to read map snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed map snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The landmark cloud plus the metadata that travelled with it.
#[derive(Debug, Clone, Default)]
pub struct MapSnapshot {
    pub keyframe_count: usize,
    /// Landmark count as declared by the tracker; may differ from
    /// `landmarks.len()` when the export was truncated.
    pub declared_landmark_count: Option<usize>,
    pub landmarks: Vec<Landmark>,
}

impl MapSnapshot {
    /// Read and parse the snapshot at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            keyframes = snapshot.keyframe_count,
            landmarks = snapshot.landmarks.len(),
            "map snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Parse a snapshot from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        let raw: RawSnapshot = serde_json::from_str(json)?;

        let landmarks: Vec<Landmark> = match raw.landmarks {
            RawLandmarks::List(list) => list
                .into_iter()
                .enumerate()
                .map(|(i, l)| l.into_landmark(i as u64))
                .collect(),
            RawLandmarks::Keyed(map) => map
                .into_iter()
                .enumerate()
                .map(|(i, (key, l))| {
                    let fallback = key.parse::<u64>().unwrap_or(i as u64);
                    l.into_landmark(fallback)
                })
                .collect(),
        };

        let declared = raw.landmark_count;
        if let Some(n) = declared
            && n != landmarks.len()
        {
            warn!(declared = n, found = landmarks.len(), "landmark count mismatch in snapshot");
        }

        Ok(Self {
            keyframe_count: raw.keyframes.as_ref().map(count_of).unwrap_or(0),
            declared_landmark_count: declared,
            landmarks,
        })
    }

    /// Landmarks seen by at least `min_observations` keyframes, with finite
    /// coordinates.
    pub fn well_observed(&self, min_observations: u32) -> Vec<Landmark> {
        self.landmarks
            .iter()
            .filter(|l| l.observation_count >= min_observations && crate::cluster::is_finite(l))
            .copied()
            .collect()
    }
}

/// Keyframe metadata is either a plain count or the keyframe records
/// themselves.
fn count_of(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
        serde_json::Value::Array(a) => a.len(),
        serde_json::Value::Object(o) => o.len(),
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default, alias = "num_keyframes", alias = "keyframe_count")]
    keyframes: Option<serde_json::Value>,
    #[serde(default, alias = "num_landmarks", alias = "num_map_points")]
    landmark_count: Option<usize>,
    #[serde(alias = "map_points", alias = "points")]
    landmarks: RawLandmarks,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLandmarks {
    List(Vec<RawLandmark>),
    Keyed(BTreeMap<String, RawLandmark>),
}

#[derive(Deserialize)]
struct RawLandmark {
    #[serde(default)]
    id: Option<u64>,
    #[serde(alias = "pos", alias = "world_pos")]
    position: RawPosition,
    #[serde(default, alias = "observations", alias = "num_observations")]
    observation_count: u32,
}

impl RawLandmark {
    fn into_landmark(self, fallback_id: u64) -> Landmark {
        let [x, y, z] = match self.position {
            RawPosition::Array(xyz) => xyz,
            RawPosition::Object { x, y, z } => [x, y, z],
        };
        Landmark::new(self.id.unwrap_or(fallback_id), x, y, z, self.observation_count)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPosition {
    Array([f32; 3]),
    Object { x: f32, y: f32, z: f32 },
}
