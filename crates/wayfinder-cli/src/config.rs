//! Configuration Vault – reads/writes `~/.wayfinder/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wayfinder_perception::{ClusterConfig, GridConfig};
use wayfinder_runtime::{MapperConfig, NavigatorConfig};
use wayfinder_types::WayfinderError;

/// Persisted operator configuration stored in `~/.wayfinder/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Map snapshot exported by the SLAM tracker.
    #[serde(default = "default_map_path")]
    pub map_path: String,

    /// SQLite room index.
    #[serde(default = "default_room_db_path")]
    pub room_db_path: String,

    /// Metres per planning-grid cell.
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: f32,

    /// Planning-grid edge length in cells.
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,

    #[serde(default = "default_robot_radius")]
    pub robot_radius: f32,

    #[serde(default = "default_arrival_threshold")]
    pub arrival_threshold: f32,

    #[serde(default = "default_cluster_cell_size")]
    pub cluster_cell_size: f32,

    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default = "default_min_observations")]
    pub min_observations: u32,

    /// Landmarks below this height are floor, not obstacles.
    #[serde(default = "default_ground_z_min")]
    pub ground_z_min: f32,

    /// Landmarks above this height are ceiling, not obstacles.
    #[serde(default = "default_ground_z_max")]
    pub ground_z_max: f32,

    #[serde(default = "default_waypoint_timeout_ms")]
    pub waypoint_timeout_ms: u64,

    #[serde(default = "default_simplify_angle_deg")]
    pub simplify_angle_deg: f32,

    #[serde(default = "default_max_recovery_radius")]
    pub max_recovery_radius: u32,
}

fn default_map_path() -> String {
    "map.json".to_string()
}
fn default_room_db_path() -> String {
    "rooms.db".to_string()
}
fn default_grid_resolution() -> f32 {
    0.05
}
fn default_grid_size() -> usize {
    400
}
fn default_robot_radius() -> f32 {
    0.2
}
fn default_arrival_threshold() -> f32 {
    0.15
}
fn default_cluster_cell_size() -> f32 {
    0.5
}
fn default_min_cluster_size() -> usize {
    50
}
fn default_min_observations() -> u32 {
    1
}
fn default_ground_z_min() -> f32 {
    0.05
}
fn default_ground_z_max() -> f32 {
    1.5
}
fn default_waypoint_timeout_ms() -> u64 {
    2000
}
fn default_simplify_angle_deg() -> f32 {
    10.0
}
fn default_max_recovery_radius() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            map_path: default_map_path(),
            room_db_path: default_room_db_path(),
            grid_resolution: default_grid_resolution(),
            grid_size: default_grid_size(),
            robot_radius: default_robot_radius(),
            arrival_threshold: default_arrival_threshold(),
            cluster_cell_size: default_cluster_cell_size(),
            min_cluster_size: default_min_cluster_size(),
            min_observations: default_min_observations(),
            ground_z_min: default_ground_z_min(),
            ground_z_max: default_ground_z_max(),
            waypoint_timeout_ms: default_waypoint_timeout_ms(),
            simplify_angle_deg: default_simplify_angle_deg(),
            max_recovery_radius: default_max_recovery_radius(),
        }
    }
}

impl Config {
    pub fn navigator(&self) -> NavigatorConfig {
        NavigatorConfig {
            grid: GridConfig {
                size: self.grid_size,
                resolution: self.grid_resolution,
                robot_radius: self.robot_radius,
                z_min: self.ground_z_min,
                z_max: self.ground_z_max,
            },
            arrival_threshold: self.arrival_threshold,
            waypoint_timeout: Duration::from_millis(self.waypoint_timeout_ms),
            max_recovery_radius: self.max_recovery_radius,
            simplify_angle: self.simplify_angle_deg.to_radians(),
        }
    }

    pub fn mapper(&self) -> MapperConfig {
        MapperConfig {
            cluster: ClusterConfig {
                cell_size: self.cluster_cell_size,
                min_cluster_size: self.min_cluster_size,
            },
            min_observations: self.min_observations,
        }
    }

    /// Reject values the planner cannot work with.
    pub fn validate(&self) -> Result<(), WayfinderError> {
        let invalid = |msg: &str| Err(WayfinderError::Config(msg.to_string()));
        if !(self.grid_resolution > 0.0) {
            return invalid("grid_resolution must be positive");
        }
        if self.grid_size == 0 {
            return invalid("grid_size must be positive");
        }
        if !(self.cluster_cell_size > 0.0) {
            return invalid("cluster_cell_size must be positive");
        }
        if self.robot_radius < 0.0 || self.arrival_threshold < 0.0 {
            return invalid("robot_radius and arrival_threshold must not be negative");
        }
        if self.ground_z_min > self.ground_z_max {
            return invalid("ground_z_min must not exceed ground_z_max");
        }
        Ok(())
    }
}

/// Return the path to `~/.wayfinder/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".wayfinder").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, WayfinderError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, WayfinderError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        WayfinderError::Config(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| WayfinderError::Config(format!("Failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

fn override_from_env<T: FromStr>(var: &str, slot: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.trim().parse::<T>()
    {
        *slot = parsed;
    }
}

/// Apply `WAYFINDER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WAYFINDER_MAP_PATH` | `map_path` |
/// | `WAYFINDER_ROOM_DB` | `room_db_path` |
/// | `WAYFINDER_GRID_RESOLUTION` | `grid_resolution` |
/// | `WAYFINDER_GRID_SIZE` | `grid_size` |
/// | `WAYFINDER_ROBOT_RADIUS` | `robot_radius` |
/// | `WAYFINDER_ARRIVAL_THRESHOLD` | `arrival_threshold` |
/// | `WAYFINDER_CLUSTER_CELL_SIZE` | `cluster_cell_size` |
/// | `WAYFINDER_MIN_CLUSTER_SIZE` | `min_cluster_size` |
/// | `WAYFINDER_MIN_OBSERVATIONS` | `min_observations` |
/// | `WAYFINDER_GROUND_Z_MIN` / `WAYFINDER_GROUND_Z_MAX` | `ground_z_min` / `ground_z_max` |
/// | `WAYFINDER_WAYPOINT_TIMEOUT_MS` | `waypoint_timeout_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WAYFINDER_MAP_PATH") {
        cfg.map_path = v;
    }
    if let Ok(v) = std::env::var("WAYFINDER_ROOM_DB") {
        cfg.room_db_path = v;
    }
    override_from_env("WAYFINDER_GRID_RESOLUTION", &mut cfg.grid_resolution);
    override_from_env("WAYFINDER_GRID_SIZE", &mut cfg.grid_size);
    override_from_env("WAYFINDER_ROBOT_RADIUS", &mut cfg.robot_radius);
    override_from_env("WAYFINDER_ARRIVAL_THRESHOLD", &mut cfg.arrival_threshold);
    override_from_env("WAYFINDER_CLUSTER_CELL_SIZE", &mut cfg.cluster_cell_size);
    override_from_env("WAYFINDER_MIN_CLUSTER_SIZE", &mut cfg.min_cluster_size);
    override_from_env("WAYFINDER_MIN_OBSERVATIONS", &mut cfg.min_observations);
    override_from_env("WAYFINDER_GROUND_Z_MIN", &mut cfg.ground_z_min);
    override_from_env("WAYFINDER_GROUND_Z_MAX", &mut cfg.ground_z_max);
    override_from_env("WAYFINDER_WAYPOINT_TIMEOUT_MS", &mut cfg.waypoint_timeout_ms);
}

/// Save the config to disk, creating `~/.wayfinder/` if necessary.
pub fn save(cfg: &Config) -> Result<(), WayfinderError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), WayfinderError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            WayfinderError::Config(format!("Failed to create config directory: {e}"))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| WayfinderError::Config(format!("Failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        WayfinderError::Config(format!("Failed to write config at {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.grid_size, 400);
        assert_eq!(loaded.max_recovery_radius, 5);
        assert!((loaded.simplify_angle_deg - 10.0).abs() < 1e-6);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "robot_radius = 0.3\nmin_cluster_size = 80\n").unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert!((cfg.robot_radius - 0.3).abs() < 1e-6);
        assert_eq!(cfg.min_cluster_size, 80);
        assert!((cfg.grid_resolution - 0.05).abs() < 1e-6);
        assert_eq!(cfg.room_db_path, "rooms.db");
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "grid_resolution = 0.0\n").unwrap();
        assert!(matches!(load_from(&path), Err(WayfinderError::Config(_))));

        std::fs::write(&path, "grid_size = \"big\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(WayfinderError::Config(_))));
    }

    #[test]
    fn config_path_points_to_wayfinder_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".wayfinder"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn derived_component_configs() {
        let cfg = Config::default();
        let nav = cfg.navigator();
        assert_eq!(nav.grid.size, 400);
        assert_eq!(nav.waypoint_timeout, Duration::from_millis(2000));
        assert!((nav.simplify_angle - 10f32.to_radians()).abs() < 1e-6);
        let mapper = cfg.mapper();
        assert_eq!(mapper.cluster.min_cluster_size, 50);
        assert_eq!(mapper.min_observations, 1);
    }

    #[test]
    fn apply_env_overrides_changes_map_path() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WAYFINDER_MAP_PATH", "/data/office.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.map_path, "/data/office.json");
        unsafe { std::env::remove_var("WAYFINDER_MAP_PATH") };
    }

    #[test]
    fn apply_env_overrides_changes_arrival_threshold() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WAYFINDER_ARRIVAL_THRESHOLD", "0.3") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.arrival_threshold - 0.3).abs() < 1e-6);
        unsafe { std::env::remove_var("WAYFINDER_ARRIVAL_THRESHOLD") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_number() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WAYFINDER_MIN_CLUSTER_SIZE", "lots") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.min_cluster_size, 50);
        unsafe { std::env::remove_var("WAYFINDER_MIN_CLUSTER_SIZE") };
    }

    #[test]
    fn apply_env_overrides_changes_waypoint_timeout() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("WAYFINDER_WAYPOINT_TIMEOUT_MS", " 750 ") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.waypoint_timeout_ms, 750);
        unsafe { std::env::remove_var("WAYFINDER_WAYPOINT_TIMEOUT_MS") };
    }
}
