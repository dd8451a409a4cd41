//! Room Index – the persisted spatial store.
//!
//! Keeps every mapped room together with its member landmarks, its named
//! waypoints and its adjacency to other rooms, and answers the lookups the
//! navigator and the location bridge need (by name, by id, by position).
//!
//! # Storage layout
//!
//! Four SQLite tables are created if they do not already exist:
//!
//! | table              | contents                                                  |
//! |--------------------|-----------------------------------------------------------|
//! | `rooms`            | identity, label, centre, bounds, landmark count, timestamps |
//! | `room_landmarks`   | per-room member points `(room_id, landmark_id, x, y, z)`   |
//! | `waypoints`        | per-room named points with heading                          |
//! | `room_connections` | directed adjacency; always written as a symmetric pair      |
//!
//! No foreign keys are declared: [`RoomIndex::delete_room`] and
//! [`RoomIndex::clear_all_rooms`] cascade explicitly inside one transaction.
//!
//! # Example
//!
//! ```rust
//! use wayfinder_memory::room_index::{NewRoom, RoomIndex};
//! use wayfinder_types::Landmark;
//!
//! let index = RoomIndex::open_in_memory().unwrap();
//! let landmarks = [
//!     Landmark::new(1, 0.0, 0.0, 0.2, 3),
//!     Landmark::new(2, 4.0, 3.0, 1.1, 5),
//! ];
//! let id = index.add_room(&NewRoom::named("kitchen"), &landmarks).unwrap();
//!
//! let room = index.get_room_at_position(1.0, 1.0).unwrap().unwrap();
//! assert_eq!(room.room_id, id);
//! assert_eq!(room.landmark_count, 2);
//! ```

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use wayfinder_perception::geometry::{Bounds, Point3};
use wayfinder_types::Landmark;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from room index operations.
#[derive(Error, Debug)]
pub enum RoomIndexError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Room not found: {0}")]
    RoomNotFound(String),
    #[error("Room {0} has neither bounds nor landmarks")]
    EmptyRoom(String),
    #[error("A room named {0} already exists")]
    DuplicateName(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub room_id: i64,
    /// Unique machine name, e.g. `"room_1"`.
    pub name: String,
    /// Human-facing label, e.g. `"Kitchen"`. Set by labelling tools.
    pub label: Option<String>,
    pub center: Point3,
    /// Fixed at creation.
    pub bounds: Bounds,
    pub landmark_count: usize,
    /// RFC-3339 creation timestamp (UTC).
    pub created_at: String,
    /// RFC-3339 last-update timestamp (UTC).
    pub updated_at: String,
}

impl Room {
    /// Label when one is set, otherwise the machine name.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Input for [`RoomIndex::add_room`].
#[derive(Debug, Clone, Default)]
pub struct NewRoom {
    pub name: String,
    pub label: Option<String>,
    /// Explicit bounds; computed from the landmarks when `None`.
    pub bounds: Option<Bounds>,
    /// Explicit centre; the landmark mean (or the bounds centre) when `None`.
    pub center: Option<Point3>,
}

impl NewRoom {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

/// Input waypoint for a [`RoomDraft`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewWaypoint {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

/// A room with its members and waypoints, written as a unit by
/// [`RoomIndex::replace_all`].
#[derive(Debug, Clone)]
pub struct RoomDraft {
    pub room: NewRoom,
    pub landmarks: Vec<Landmark>,
    pub waypoints: Vec<NewWaypoint>,
}

/// A named, headed point inside a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub waypoint_id: i64,
    pub room_id: i64,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

/// A neighbour returned by [`RoomIndex::get_connected_rooms`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectedRoom {
    pub room: Room,
    pub connection_type: String,
}

/// Full denormalised dump produced by [`RoomIndex::export_to_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomExport {
    pub exported_at: String,
    pub rooms: Vec<ExportedRoom>,
}

/// One room of a [`RoomExport`] with its waypoints and outgoing connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedRoom {
    #[serde(flatten)]
    pub room: Room,
    pub waypoints: Vec<Waypoint>,
    pub connections: Vec<ExportedConnection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedConnection {
    pub to_room_id: i64,
    pub to_room: String,
    pub connection_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

const ROOM_COLUMNS: &str = "r.room_id, r.name, r.label, r.center_x, r.center_y, r.center_z, \
     r.min_x, r.min_y, r.min_z, r.max_x, r.max_y, r.max_z, \
     r.landmark_count, r.created_at, r.updated_at";

fn real(row: &Row<'_>, idx: usize) -> rusqlite::Result<f32> {
    Ok(row.get::<_, f64>(idx)? as f32)
}

fn row_to_room(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        room_id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
        center: Point3::new(real(row, 3)?, real(row, 4)?, real(row, 5)?),
        bounds: Bounds {
            min: Point3::new(real(row, 6)?, real(row, 7)?, real(row, 8)?),
            max: Point3::new(real(row, 9)?, real(row, 10)?, real(row, 11)?),
        },
        landmark_count: row.get::<_, i64>(12)?.max(0) as usize,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn row_to_waypoint(row: &Row<'_>) -> rusqlite::Result<Waypoint> {
    Ok(Waypoint {
        waypoint_id: row.get(0)?,
        room_id: row.get(1)?,
        name: row.get(2)?,
        x: real(row, 3)?,
        y: real(row, 4)?,
        heading: real(row, 5)?,
    })
}

struct RoomRecord<'a> {
    name: &'a str,
    label: Option<&'a str>,
    center: Point3,
    bounds: Bounds,
    landmark_count: usize,
}

fn insert_room(conn: &Connection, record: &RoomRecord<'_>) -> Result<i64, RoomIndexError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM rooms WHERE name = ?1)",
        params![record.name],
        |row| row.get(0),
    )?;
    if exists {
        return Err(RoomIndexError::DuplicateName(record.name.to_string()));
    }
    let now = Utc::now().to_rfc3339();
    let (c, b) = (record.center, record.bounds);
    conn.execute(
        "INSERT INTO rooms (name, label, center_x, center_y, center_z,
                            min_x, min_y, min_z, max_x, max_y, max_z,
                            landmark_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.name,
            record.label,
            f64::from(c.x),
            f64::from(c.y),
            f64::from(c.z),
            f64::from(b.min.x),
            f64::from(b.min.y),
            f64::from(b.min.z),
            f64::from(b.max.x),
            f64::from(b.max.y),
            f64::from(b.max.z),
            record.landmark_count as i64,
            now,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert `room` and its member landmarks; bounds and centre fall back to
/// the landmark extent and mean.
fn insert_room_with_landmarks(
    conn: &Connection,
    room: &NewRoom,
    landmarks: &[Landmark],
) -> Result<i64, RoomIndexError> {
    let points = || landmarks.iter().map(Point3::from);
    let bounds = match room.bounds {
        Some(b) => b,
        None => Bounds::from_points(points())
            .ok_or_else(|| RoomIndexError::EmptyRoom(room.name.clone()))?,
    };
    let center = room
        .center
        .or_else(|| Point3::mean(points()))
        .unwrap_or_else(|| bounds.centre());

    let room_id = insert_room(
        conn,
        &RoomRecord {
            name: &room.name,
            label: room.label.as_deref(),
            center,
            bounds,
            landmark_count: landmarks.len(),
        },
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO room_landmarks
             (room_id, landmark_id, x, y, z, observation_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for l in landmarks {
        stmt.execute(params![
            room_id,
            l.id as i64,
            f64::from(l.x),
            f64::from(l.y),
            f64::from(l.z),
            l.observation_count,
        ])?;
    }
    Ok(room_id)
}

fn insert_waypoint(
    conn: &Connection,
    room_id: i64,
    name: &str,
    x: f32,
    y: f32,
    heading: f32,
) -> Result<i64, RoomIndexError> {
    conn.execute(
        "INSERT INTO waypoints (room_id, name, x, y, heading) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![room_id, name, f64::from(x), f64::from(y), f64::from(heading)],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_connection_pair(
    conn: &Connection,
    a: i64,
    b: i64,
    connection_type: &str,
) -> Result<(), RoomIndexError> {
    let mut stmt = conn.prepare(
        "INSERT OR REPLACE INTO room_connections (from_room_id, to_room_id, connection_type)
         VALUES (?1, ?2, ?3)",
    )?;
    stmt.execute(params![a, b, connection_type])?;
    stmt.execute(params![b, a, connection_type])?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// RoomIndex
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed room store.
///
/// All operations are synchronous and immediately consistent. Multi-row
/// writes run inside a single transaction. Concurrent writers must serialise
/// externally (the runtime shares one instance behind a mutex).
pub struct RoomIndex {
    conn: Connection,
}

impl RoomIndex {
    /// Open (or create) a persistent room store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RoomIndexError> {
        let conn = Connection::open(path)?;
        let index = Self { conn };
        index.init_schema()?;
        Ok(index)
    }

    /// Open a temporary in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self, RoomIndexError> {
        let conn = Connection::open_in_memory()?;
        let index = Self { conn };
        index.init_schema()?;
        Ok(index)
    }

    fn init_schema(&self) -> Result<(), RoomIndexError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rooms (
                room_id        INTEGER PRIMARY KEY AUTOINCREMENT,
                name           TEXT NOT NULL UNIQUE,
                label          TEXT,
                center_x       REAL NOT NULL,
                center_y       REAL NOT NULL,
                center_z       REAL NOT NULL,
                min_x          REAL NOT NULL,
                min_y          REAL NOT NULL,
                min_z          REAL NOT NULL,
                max_x          REAL NOT NULL,
                max_y          REAL NOT NULL,
                max_z          REAL NOT NULL,
                landmark_count INTEGER NOT NULL DEFAULT 0,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS room_landmarks (
                room_id           INTEGER NOT NULL,
                landmark_id       INTEGER NOT NULL,
                x                 REAL NOT NULL,
                y                 REAL NOT NULL,
                z                 REAL NOT NULL,
                observation_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (room_id, landmark_id)
            );
            CREATE TABLE IF NOT EXISTS waypoints (
                waypoint_id INTEGER PRIMARY KEY AUTOINCREMENT,
                room_id     INTEGER NOT NULL,
                name        TEXT NOT NULL,
                x           REAL NOT NULL,
                y           REAL NOT NULL,
                heading     REAL NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS room_connections (
                from_room_id    INTEGER NOT NULL,
                to_room_id      INTEGER NOT NULL,
                connection_type TEXT NOT NULL,
                PRIMARY KEY (from_room_id, to_room_id)
            );
            CREATE INDEX IF NOT EXISTS idx_waypoints_room ON waypoints (room_id);",
        )?;
        Ok(())
    }

    // ── Rooms ────────────────────────────────────────────────────────────────

    /// Persist a room and its member landmarks; returns the new `room_id`.
    ///
    /// Bounds and centre are derived from `landmarks` unless `room` supplies
    /// them. Returns [`RoomIndexError::EmptyRoom`] when neither bounds nor
    /// landmarks are given and [`RoomIndexError::DuplicateName`] when the
    /// name is taken.
    pub fn add_room(&self, room: &NewRoom, landmarks: &[Landmark]) -> Result<i64, RoomIndexError> {
        let tx = self.conn.unchecked_transaction()?;
        let room_id = insert_room_with_landmarks(&tx, room, landmarks)?;
        tx.commit()?;

        info!(room_id, name = %room.name, landmarks = landmarks.len(), "room added");
        Ok(room_id)
    }

    /// Exact-name lookup.
    pub fn get_room_by_name(&self, name: &str) -> Result<Option<Room>, RoomIndexError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.name = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![name], row_to_room)
            .optional()?)
    }

    pub fn get_room_by_id(&self, room_id: i64) -> Result<Option<Room>, RoomIndexError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.room_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![room_id], row_to_room)
            .optional()?)
    }

    /// Every room, in creation order.
    pub fn get_all_rooms(&self) -> Result<Vec<Room>, RoomIndexError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms r ORDER BY r.room_id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rooms = stmt
            .query_map([], row_to_room)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    pub fn room_count(&self) -> Result<usize, RoomIndexError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))?;
        Ok(n.max(0) as usize)
    }

    /// The room whose floor footprint contains `(x, y)`.
    ///
    /// When footprints overlap the smallest one wins, then the lowest
    /// `room_id`. Returns `None` when no room contains the point.
    pub fn get_room_at_position(&self, x: f32, y: f32) -> Result<Option<Room>, RoomIndexError> {
        let sql = format!(
            "SELECT {ROOM_COLUMNS} FROM rooms r
             WHERE r.min_x <= ?1 AND r.max_x >= ?1 AND r.min_y <= ?2 AND r.max_y >= ?2
             ORDER BY (r.max_x - r.min_x) * (r.max_y - r.min_y) ASC, r.room_id ASC
             LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![f64::from(x), f64::from(y)], row_to_room)
            .optional()?)
    }

    /// Member landmarks recorded for `room_id`, ordered by landmark id.
    pub fn get_room_landmarks(&self, room_id: i64) -> Result<Vec<Landmark>, RoomIndexError> {
        let mut stmt = self.conn.prepare(
            "SELECT landmark_id, x, y, z, observation_count FROM room_landmarks
             WHERE room_id = ?1 ORDER BY landmark_id ASC",
        )?;
        let landmarks = stmt
            .query_map(params![room_id], |row| {
                Ok(Landmark::new(
                    row.get::<_, i64>(0)? as u64,
                    real(row, 1)?,
                    real(row, 2)?,
                    real(row, 3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(landmarks)
    }

    /// Replace the human-facing label of a room.
    pub fn update_room_label(&self, room_id: i64, label: &str) -> Result<(), RoomIndexError> {
        let changed = self.conn.execute(
            "UPDATE rooms SET label = ?1, updated_at = ?2 WHERE room_id = ?3",
            params![label, Utc::now().to_rfc3339(), room_id],
        )?;
        if changed == 0 {
            return Err(RoomIndexError::RoomNotFound(room_id.to_string()));
        }
        info!(room_id, label, "room relabelled");
        Ok(())
    }

    /// Remove one room together with its landmarks, waypoints and every
    /// connection that touches it.
    pub fn delete_room(&self, room_id: i64) -> Result<(), RoomIndexError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM room_landmarks WHERE room_id = ?1", params![room_id])?;
        tx.execute("DELETE FROM waypoints WHERE room_id = ?1", params![room_id])?;
        tx.execute(
            "DELETE FROM room_connections WHERE from_room_id = ?1 OR to_room_id = ?1",
            params![room_id],
        )?;
        let removed = tx.execute("DELETE FROM rooms WHERE room_id = ?1", params![room_id])?;
        if removed == 0 {
            return Err(RoomIndexError::RoomNotFound(room_id.to_string()));
        }
        tx.commit()?;
        info!(room_id, "room deleted");
        Ok(())
    }

    /// Wipe every room, landmark, waypoint and connection.
    pub fn clear_all_rooms(&self) -> Result<(), RoomIndexError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM room_landmarks;
             DELETE FROM waypoints;
             DELETE FROM room_connections;
             DELETE FROM rooms;",
        )?;
        tx.commit()?;
        info!("room index cleared");
        Ok(())
    }

    /// Replace the whole index with `rooms` in one transaction; returns the
    /// new ids in input order. On error the previous contents are kept.
    pub fn replace_all(&self, rooms: &[RoomDraft]) -> Result<Vec<i64>, RoomIndexError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM room_landmarks;
             DELETE FROM waypoints;
             DELETE FROM room_connections;
             DELETE FROM rooms;",
        )?;
        let mut ids = Vec::with_capacity(rooms.len());
        for draft in rooms {
            let room_id = insert_room_with_landmarks(&tx, &draft.room, &draft.landmarks)?;
            for wp in &draft.waypoints {
                insert_waypoint(&tx, room_id, &wp.name, wp.x, wp.y, wp.heading)?;
            }
            ids.push(room_id);
        }
        tx.commit()?;
        info!(rooms = ids.len(), "room index replaced");
        Ok(ids)
    }

    // ── Waypoints ────────────────────────────────────────────────────────────

    /// Add a named waypoint to an existing room; returns its id.
    pub fn add_waypoint(
        &self,
        room_id: i64,
        name: &str,
        x: f32,
        y: f32,
        heading: f32,
    ) -> Result<i64, RoomIndexError> {
        self.require_room(room_id)?;
        insert_waypoint(&self.conn, room_id, name, x, y, heading)
    }

    /// Waypoints of `room_id` in insertion order.
    pub fn get_room_waypoints(&self, room_id: i64) -> Result<Vec<Waypoint>, RoomIndexError> {
        let mut stmt = self.conn.prepare(
            "SELECT waypoint_id, room_id, name, x, y, heading FROM waypoints
             WHERE room_id = ?1 ORDER BY waypoint_id ASC",
        )?;
        let waypoints = stmt
            .query_map(params![room_id], row_to_waypoint)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(waypoints)
    }

    // ── Connections ──────────────────────────────────────────────────────────

    /// Record traversable adjacency between two rooms in both directions.
    pub fn add_room_connection(
        &self,
        a: i64,
        b: i64,
        connection_type: &str,
    ) -> Result<(), RoomIndexError> {
        self.require_room(a)?;
        self.require_room(b)?;
        let tx = self.conn.unchecked_transaction()?;
        insert_connection_pair(&tx, a, b, connection_type)?;
        tx.commit()?;
        Ok(())
    }

    /// Rooms reachable in one step from `room_id`, ordered by id.
    pub fn get_connected_rooms(&self, room_id: i64) -> Result<Vec<ConnectedRoom>, RoomIndexError> {
        let sql = format!(
            "SELECT {ROOM_COLUMNS}, c.connection_type
             FROM room_connections c JOIN rooms r ON r.room_id = c.to_room_id
             WHERE c.from_room_id = ?1
             ORDER BY r.room_id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rooms = stmt
            .query_map(params![room_id], |row| {
                Ok(ConnectedRoom {
                    room: row_to_room(row)?,
                    connection_type: row.get(15)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    fn require_room(&self, room_id: i64) -> Result<(), RoomIndexError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM rooms WHERE room_id = ?1)",
            params![room_id],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(RoomIndexError::RoomNotFound(room_id.to_string()))
        }
    }

    // ── Export / import ──────────────────────────────────────────────────────

    /// Build the denormalised export document.
    pub fn export(&self) -> Result<RoomExport, RoomIndexError> {
        let mut rooms = Vec::new();
        for room in self.get_all_rooms()? {
            let waypoints = self.get_room_waypoints(room.room_id)?;
            let connections = self
                .get_connected_rooms(room.room_id)?
                .into_iter()
                .map(|c| ExportedConnection {
                    to_room_id: c.room.room_id,
                    to_room: c.room.name,
                    connection_type: c.connection_type,
                })
                .collect();
            rooms.push(ExportedRoom {
                room,
                waypoints,
                connections,
            });
        }
        Ok(RoomExport {
            exported_at: Utc::now().to_rfc3339(),
            rooms,
        })
    }

    /// Serialise every room with its waypoints and connections as pretty JSON.
    pub fn export_to_json(&self) -> Result<String, RoomIndexError> {
        Ok(serde_json::to_string_pretty(&self.export()?)?)
    }

    pub fn export_to_file(&self, path: impl AsRef<Path>) -> Result<(), RoomIndexError> {
        std::fs::write(path, self.export_to_json()?)?;
        Ok(())
    }

    /// Recreate the rooms, waypoints and connections of an export document.
    ///
    /// Rooms receive fresh ids; connections are remapped accordingly. The
    /// import is atomic: a name clash with an existing room rolls back
    /// everything. Returns the number of rooms imported.
    pub fn import_from_json(&self, json: &str) -> Result<usize, RoomIndexError> {
        let doc: RoomExport = serde_json::from_str(json)?;

        let tx = self.conn.unchecked_transaction()?;
        let mut id_map: HashMap<i64, i64> = HashMap::with_capacity(doc.rooms.len());
        for entry in &doc.rooms {
            let room = &entry.room;
            let new_id = insert_room(
                &tx,
                &RoomRecord {
                    name: &room.name,
                    label: room.label.as_deref(),
                    center: room.center,
                    bounds: room.bounds,
                    landmark_count: room.landmark_count,
                },
            )?;
            id_map.insert(room.room_id, new_id);
            for wp in &entry.waypoints {
                insert_waypoint(&tx, new_id, &wp.name, wp.x, wp.y, wp.heading)?;
            }
        }
        for entry in &doc.rooms {
            let Some(&from) = id_map.get(&entry.room.room_id) else {
                continue;
            };
            for conn in &entry.connections {
                match id_map.get(&conn.to_room_id) {
                    Some(&to) => insert_connection_pair(&tx, from, to, &conn.connection_type)?,
                    None => warn!(
                        from = %entry.room.name,
                        to = %conn.to_room,
                        "dropping connection to a room missing from the export"
                    ),
                }
            }
        }
        tx.commit()?;

        info!(rooms = doc.rooms.len(), "room index imported");
        Ok(doc.rooms.len())
    }

    pub fn import_from_file(&self, path: impl AsRef<Path>) -> Result<usize, RoomIndexError> {
        let raw = std::fs::read_to_string(path)?;
        self.import_from_json(&raw)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn square(first_id: u64, x0: f32, y0: f32, side: f32) -> Vec<Landmark> {
        vec![
            Landmark::new(first_id, x0, y0, 0.1, 2),
            Landmark::new(first_id + 1, x0 + side, y0, 0.4, 2),
            Landmark::new(first_id + 2, x0, y0 + side, 0.8, 2),
            Landmark::new(first_id + 3, x0 + side, y0 + side, 1.2, 2),
        ]
    }

    fn bounds(x0: f32, y0: f32, x1: f32, y1: f32) -> Bounds {
        Bounds::new(Point3::new(x0, y0, 0.0), Point3::new(x1, y1, 2.5))
    }

    #[test]
    fn add_room_computes_bounds_and_centre_from_landmarks() {
        let index = RoomIndex::open_in_memory().unwrap();
        let id = index
            .add_room(&NewRoom::named("room_1"), &square(0, 1.0, 2.0, 2.0))
            .unwrap();
        let room = index.get_room_by_id(id).unwrap().unwrap();
        assert_eq!(room.name, "room_1");
        assert_eq!(room.label, None);
        assert_eq!(room.bounds.min, Point3::new(1.0, 2.0, 0.1));
        assert_eq!(room.bounds.max, Point3::new(3.0, 4.0, 1.2));
        assert!((room.center.x - 2.0).abs() < 1e-6);
        assert!((room.center.y - 3.0).abs() < 1e-6);
        assert_eq!(room.landmark_count, 4);
        assert_eq!(index.get_room_landmarks(id).unwrap().len(), 4);
    }

    #[test]
    fn add_room_with_explicit_bounds_and_no_landmarks() {
        let index = RoomIndex::open_in_memory().unwrap();
        let room = NewRoom::named("hall")
            .with_label("Hallway")
            .with_bounds(bounds(0.0, 0.0, 2.0, 6.0));
        let id = index.add_room(&room, &[]).unwrap();
        let stored = index.get_room_by_name("hall").unwrap().unwrap();
        assert_eq!(stored.room_id, id);
        assert_eq!(stored.display_name(), "Hallway");
        assert_eq!(stored.center, Point3::new(1.0, 3.0, 1.25));
        assert_eq!(stored.landmark_count, 0);
    }

    #[test]
    fn add_room_without_extent_is_rejected() {
        let index = RoomIndex::open_in_memory().unwrap();
        let err = index.add_room(&NewRoom::named("void"), &[]).unwrap_err();
        assert!(matches!(err, RoomIndexError::EmptyRoom(name) if name == "void"));
        assert_eq!(index.room_count().unwrap(), 0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let index = RoomIndex::open_in_memory().unwrap();
        index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let err = index
            .add_room(&NewRoom::named("a"), &square(10, 5.0, 5.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, RoomIndexError::DuplicateName(_)));
        assert_eq!(index.room_count().unwrap(), 1);
        // The failed insert left no stray landmarks behind.
        assert!(index.get_room_landmarks(2).unwrap().is_empty());
    }

    #[test]
    fn lookups_by_name_and_id_and_all() {
        let index = RoomIndex::open_in_memory().unwrap();
        let a = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let b = index.add_room(&NewRoom::named("b"), &square(10, 5.0, 0.0, 1.0)).unwrap();
        assert_eq!(index.get_room_by_name("b").unwrap().unwrap().room_id, b);
        assert!(index.get_room_by_name("B").unwrap().is_none());
        assert!(index.get_room_by_id(999).unwrap().is_none());
        let all: Vec<i64> = index.get_all_rooms().unwrap().iter().map(|r| r.room_id).collect();
        assert_eq!(all, vec![a, b]);
    }

    #[test]
    fn room_at_position_contains_query_point_or_none() {
        let index = RoomIndex::open_in_memory().unwrap();
        index
            .add_room(&NewRoom::named("a").with_bounds(bounds(0.0, 0.0, 4.0, 4.0)), &[])
            .unwrap();
        index
            .add_room(&NewRoom::named("b").with_bounds(bounds(10.0, 0.0, 12.0, 3.0)), &[])
            .unwrap();

        let hit = index.get_room_at_position(11.0, 1.5).unwrap().unwrap();
        assert_eq!(hit.name, "b");
        assert!(hit.bounds.contains_xy(11.0, 1.5));
        // Boundary is inclusive.
        assert_eq!(index.get_room_at_position(4.0, 4.0).unwrap().unwrap().name, "a");
        assert!(index.get_room_at_position(7.0, 1.0).unwrap().is_none());
    }

    #[test]
    fn overlapping_rooms_prefer_smallest_footprint() {
        let index = RoomIndex::open_in_memory().unwrap();
        index
            .add_room(&NewRoom::named("house").with_bounds(bounds(0.0, 0.0, 10.0, 10.0)), &[])
            .unwrap();
        index
            .add_room(&NewRoom::named("closet").with_bounds(bounds(2.0, 2.0, 3.0, 3.0)), &[])
            .unwrap();
        assert_eq!(index.get_room_at_position(2.5, 2.5).unwrap().unwrap().name, "closet");
        assert_eq!(index.get_room_at_position(8.0, 8.0).unwrap().unwrap().name, "house");
    }

    #[test]
    fn equal_overlaps_prefer_lowest_id() {
        let index = RoomIndex::open_in_memory().unwrap();
        let first = index
            .add_room(&NewRoom::named("first").with_bounds(bounds(0.0, 0.0, 2.0, 2.0)), &[])
            .unwrap();
        index
            .add_room(&NewRoom::named("second").with_bounds(bounds(1.0, 1.0, 3.0, 3.0)), &[])
            .unwrap();
        assert_eq!(index.get_room_at_position(1.5, 1.5).unwrap().unwrap().room_id, first);
    }

    #[test]
    fn waypoints_belong_to_rooms() {
        let index = RoomIndex::open_in_memory().unwrap();
        let id = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 2.0)).unwrap();
        index.add_waypoint(id, "center", 1.0, 1.0, 0.0).unwrap();
        index.add_waypoint(id, "door", 2.0, 1.0, 1.57).unwrap();
        let wps = index.get_room_waypoints(id).unwrap();
        assert_eq!(wps.len(), 2);
        assert_eq!(wps[0].name, "center");
        assert!((wps[1].heading - 1.57).abs() < 1e-6);

        let err = index.add_waypoint(42, "nowhere", 0.0, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, RoomIndexError::RoomNotFound(_)));
    }

    #[test]
    fn connections_are_symmetric() {
        let index = RoomIndex::open_in_memory().unwrap();
        let a = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let b = index.add_room(&NewRoom::named("b"), &square(10, 3.0, 0.0, 1.0)).unwrap();
        index.add_room_connection(a, b, "doorway").unwrap();

        let from_a = index.get_connected_rooms(a).unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].room.name, "b");
        assert_eq!(from_a[0].connection_type, "doorway");
        assert_eq!(index.get_connected_rooms(b).unwrap()[0].room.room_id, a);

        assert!(matches!(
            index.add_room_connection(a, 77, "doorway"),
            Err(RoomIndexError::RoomNotFound(_))
        ));
    }

    #[test]
    fn update_label_changes_only_label() {
        let index = RoomIndex::open_in_memory().unwrap();
        let id = index.add_room(&NewRoom::named("room_1"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let before = index.get_room_by_id(id).unwrap().unwrap();
        index.update_room_label(id, "Kitchen").unwrap();
        let after = index.get_room_by_id(id).unwrap().unwrap();
        assert_eq!(after.label.as_deref(), Some("Kitchen"));
        assert_eq!(after.bounds, before.bounds);
        assert!(matches!(
            index.update_room_label(99, "x"),
            Err(RoomIndexError::RoomNotFound(_))
        ));
    }

    #[test]
    fn delete_room_cascades() {
        let index = RoomIndex::open_in_memory().unwrap();
        let a = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let b = index.add_room(&NewRoom::named("b"), &square(10, 3.0, 0.0, 1.0)).unwrap();
        index.add_waypoint(a, "center", 0.5, 0.5, 0.0).unwrap();
        index.add_room_connection(a, b, "doorway").unwrap();

        index.delete_room(a).unwrap();
        assert!(index.get_room_by_id(a).unwrap().is_none());
        assert!(index.get_room_waypoints(a).unwrap().is_empty());
        assert!(index.get_room_landmarks(a).unwrap().is_empty());
        assert!(index.get_connected_rooms(b).unwrap().is_empty());
        assert!(matches!(index.delete_room(a), Err(RoomIndexError::RoomNotFound(_))));
    }

    #[test]
    fn clear_all_rooms_cascades() {
        let index = RoomIndex::open_in_memory().unwrap();
        let a = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let b = index.add_room(&NewRoom::named("b"), &square(10, 3.0, 0.0, 1.0)).unwrap();
        index.add_waypoint(a, "center", 0.5, 0.5, 0.0).unwrap();
        index.add_room_connection(a, b, "doorway").unwrap();

        index.clear_all_rooms().unwrap();
        assert_eq!(index.room_count().unwrap(), 0);
        assert!(index.get_room_waypoints(a).unwrap().is_empty());
        assert!(index.get_room_landmarks(a).unwrap().is_empty());
        assert!(index.get_connected_rooms(a).unwrap().is_empty());
        // Names are free again.
        index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
    }

    fn draft(name: &str, landmarks: Vec<Landmark>) -> RoomDraft {
        RoomDraft {
            room: NewRoom::named(name),
            landmarks,
            waypoints: vec![NewWaypoint {
                name: "center".to_string(),
                x: 0.5,
                y: 0.5,
                heading: 0.0,
            }],
        }
    }

    #[test]
    fn replace_all_swaps_contents() {
        let index = RoomIndex::open_in_memory().unwrap();
        let old = index.add_room(&NewRoom::named("old"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        index.add_waypoint(old, "door", 0.0, 0.0, 0.0).unwrap();

        let ids = index
            .replace_all(&[draft("a", square(0, 0.0, 0.0, 1.0)), draft("b", square(10, 3.0, 0.0, 1.0))])
            .unwrap();
        assert_eq!(ids.len(), 2);
        let names: Vec<String> = index.get_all_rooms().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(index.get_room_waypoints(old).unwrap().is_empty());
        assert_eq!(index.get_room_waypoints(ids[1]).unwrap().len(), 1);
        assert_eq!(index.get_room_landmarks(ids[0]).unwrap().len(), 4);
    }

    #[test]
    fn failed_replace_all_keeps_previous_rooms() {
        let index = RoomIndex::open_in_memory().unwrap();
        let kept = index.add_room(&NewRoom::named("kept"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        index.add_waypoint(kept, "center", 0.5, 0.5, 0.0).unwrap();

        // The second draft has neither bounds nor landmarks.
        let err = index
            .replace_all(&[draft("a", square(0, 0.0, 0.0, 1.0)), draft("empty", Vec::new())])
            .unwrap_err();
        assert!(matches!(err, RoomIndexError::EmptyRoom(_)));

        let rooms = index.get_all_rooms().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name, "kept");
        assert_eq!(index.get_room_waypoints(kept).unwrap().len(), 1);
        assert_eq!(index.get_room_landmarks(kept).unwrap().len(), 4);
    }

    #[test]
    fn export_nests_waypoints_and_connections() {
        let index = RoomIndex::open_in_memory().unwrap();
        let a = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        let b = index.add_room(&NewRoom::named("b"), &square(10, 3.0, 0.0, 1.0)).unwrap();
        index.add_waypoint(a, "center", 0.5, 0.5, 0.0).unwrap();
        index.add_room_connection(a, b, "doorway").unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&index.export_to_json().unwrap()).unwrap();
        let rooms = json["rooms"].as_array().unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0]["name"], "a");
        assert_eq!(rooms[0]["waypoints"][0]["name"], "center");
        assert_eq!(rooms[0]["connections"][0]["to_room"], "b");
        assert_eq!(rooms[1]["connections"][0]["to_room"], "a");
        assert!(rooms[0]["bounds"]["min"]["x"].is_number());
    }

    #[test]
    fn export_then_import_reproduces_rooms() {
        let source = RoomIndex::open_in_memory().unwrap();
        let a = source
            .add_room(&NewRoom::named("a").with_label("Kitchen"), &square(0, 0.25, -1.5, 1.75))
            .unwrap();
        let b = source
            .add_room(&NewRoom::named("b").with_bounds(bounds(5.0, 5.0, 7.5, 9.0)), &[])
            .unwrap();
        source.add_waypoint(a, "center", 1.0, -0.5, 0.0).unwrap();
        source.add_waypoint(a, "sink", 0.3, -1.0, 3.1).unwrap();
        source.add_waypoint(b, "center", 6.0, 7.0, 0.0).unwrap();
        source.add_room_connection(a, b, "doorway").unwrap();
        let json = source.export_to_json().unwrap();

        let target = RoomIndex::open_in_memory().unwrap();
        assert_eq!(target.import_from_json(&json).unwrap(), 2);

        let original = source.get_all_rooms().unwrap();
        let imported = target.get_all_rooms().unwrap();
        assert_eq!(original.len(), imported.len());
        for (o, i) in original.iter().zip(&imported) {
            assert_eq!(o.name, i.name);
            assert_eq!(o.label, i.label);
            assert_eq!(o.bounds, i.bounds);
            assert_eq!(o.landmark_count, i.landmark_count);
            assert_eq!(
                source.get_room_waypoints(o.room_id).unwrap().len(),
                target.get_room_waypoints(i.room_id).unwrap().len()
            );
        }
        let kitchen = target.get_room_by_name("a").unwrap().unwrap();
        assert_eq!(target.get_connected_rooms(kitchen.room_id).unwrap()[0].room.name, "b");
    }

    #[test]
    fn import_is_atomic_on_name_clash() {
        let source = RoomIndex::open_in_memory().unwrap();
        source.add_room(&NewRoom::named("x"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        source.add_room(&NewRoom::named("y"), &square(10, 3.0, 0.0, 1.0)).unwrap();
        let json = source.export_to_json().unwrap();

        let target = RoomIndex::open_in_memory().unwrap();
        target
            .add_room(&NewRoom::named("y").with_bounds(bounds(0.0, 0.0, 1.0, 1.0)), &[])
            .unwrap();
        let err = target.import_from_json(&json).unwrap_err();
        assert!(matches!(err, RoomIndexError::DuplicateName(name) if name == "y"));
        assert_eq!(target.room_count().unwrap(), 1);
        assert!(target.get_room_by_name("x").unwrap().is_none());
    }

    #[test]
    fn malformed_import_is_a_json_error() {
        let index = RoomIndex::open_in_memory().unwrap();
        assert!(matches!(index.import_from_json("{"), Err(RoomIndexError::Json(_))));
    }

    #[test]
    fn rooms_persist_across_reopen() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("rooms.db");
        {
            let index = RoomIndex::open(&path).unwrap();
            let id = index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
            index.add_waypoint(id, "center", 0.5, 0.5, 0.0).unwrap();
        }
        let reopened = RoomIndex::open(&path).unwrap();
        let room = reopened.get_room_by_name("a").unwrap().unwrap();
        assert_eq!(reopened.get_room_waypoints(room.room_id).unwrap().len(), 1);
    }

    #[test]
    fn export_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("rooms.json");
        let index = RoomIndex::open_in_memory().unwrap();
        index.add_room(&NewRoom::named("a"), &square(0, 0.0, 0.0, 1.0)).unwrap();
        index.export_to_file(&path).unwrap();

        let other = RoomIndex::open_in_memory().unwrap();
        assert_eq!(other.import_from_file(&path).unwrap(), 1);
    }
}
