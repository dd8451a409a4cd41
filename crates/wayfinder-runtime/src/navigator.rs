//! [`NavigationOrchestrator`] – room requests in, waypoint commands out.
//!
//! A request walks through
//!
//! ```text
//! idle → planning → executing → complete | failed | cancelled
//! ```
//!
//! 1. **Resolve** the room by its exact name in the room index
//!    (`room_not_found`). Free-text references are resolved upstream by the
//!    location service, which forwards the exact name.
//! 2. **Locate** the robot from the last tracked pose (`no_pose`).
//! 3. **Plan** on an occupancy grid built from the current landmark set:
//!    blocked endpoints are moved to the nearest free cell within
//!    `max_recovery_radius` rings, then A* connects them (`no_path`).
//! 4. **Simplify** the cell path into world waypoints, keeping only turns
//!    sharper than `simplify_angle`.
//! 5. **Execute** one `move_to` per waypoint on `robot_action`.
//!
//! Execution never blocks the event loop. The next waypoint is sent when the
//! motion layer reports `waypoint_reached`, when a pose update lands within
//! `arrival_threshold` of the current target, or when `waypoint_timeout`
//! elapses. Cancellation and pose updates are handled while a route runs.
//!
//! # Request serialisation
//!
//! Every request bumps a generation counter. A request arriving while a
//! route is executing supersedes it: the old route is halted with `stop`
//! before the new one is planned, and timers armed for an older generation
//! are ignored.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use wayfinder_memory::RoomIndex;
//! use wayfinder_middleware::EventBus;
//! use wayfinder_runtime::navigator::{NavigationOrchestrator, NavigatorConfig};
//!
//! # async fn demo() {
//! let bus = EventBus::default();
//! let index = wayfinder_runtime::share(RoomIndex::open_in_memory().unwrap());
//! let (_feed, landmarks) = watch::channel(Arc::new(Vec::new()));
//! let handle = NavigationOrchestrator::new(bus, index, landmarks, NavigatorConfig::default()).spawn();
//! # handle.abort();
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};
use wayfinder_middleware::{EventBus, Topic, TopicReceiver};
use wayfinder_perception::grid::GridCell;
use wayfinder_perception::path::{cells_to_world, segment_heading, simplify_path};
use wayfinder_perception::{GridConfig, OccupancyGrid, plan_path};
use wayfinder_types::{
    Event, EventPayload, Landmark, MotionCommand, NavFailure, NavigationComplete,
    NavigationFailed, Pose, TrackingState,
};

use crate::SharedRoomIndex;

const SOURCE: &str = "wayfinder-runtime::navigator";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`NavigationOrchestrator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigatorConfig {
    pub grid: GridConfig,
    /// Distance (metres) at which a pose counts as arrival at a waypoint.
    pub arrival_threshold: f32,
    /// Fallback delay before moving on when no arrival is reported.
    pub waypoint_timeout: Duration,
    /// Chebyshev ring budget for recovering a blocked start or goal cell.
    pub max_recovery_radius: u32,
    /// Minimum heading change (radians) for an interior point to survive
    /// simplification.
    pub simplify_angle: f32,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            arrival_threshold: 0.15,
            waypoint_timeout: Duration::from_millis(2000),
            max_recovery_radius: 5,
            simplify_angle: 10f32.to_radians(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Planning
// ─────────────────────────────────────────────────────────────────────────────

/// Plan a simplified world-frame route from `from` to `to` on `grid`.
///
/// Occupied or off-grid endpoints are first moved to the nearest free cell
/// within `config.max_recovery_radius`; failing that, or when A* finds no
/// connection, the result is [`NavFailure::NoPath`].
pub fn plan_route(
    grid: &OccupancyGrid,
    from: (f32, f32),
    to: (f32, f32),
    config: &NavigatorConfig,
) -> Result<Vec<(f32, f32)>, NavFailure> {
    let start = recover(grid, grid.world_to_grid(from.0, from.1), config.max_recovery_radius, "start")?;
    let goal = recover(grid, grid.world_to_grid(to.0, to.1), config.max_recovery_radius, "goal")?;
    let cells = plan_path(grid, start, goal).ok_or_else(|| {
        warn!(?start, ?goal, "A* found no path");
        NavFailure::NoPath
    })?;
    let points = cells_to_world(grid, &cells);
    let route = simplify_path(&points, config.simplify_angle);
    debug!(cells = cells.len(), waypoints = route.len(), "route simplified");
    Ok(route)
}

fn recover(
    grid: &OccupancyGrid,
    cell: GridCell,
    max_radius: u32,
    endpoint: &'static str,
) -> Result<GridCell, NavFailure> {
    if grid.is_free(cell) {
        return Ok(cell);
    }
    match grid.find_nearest_free(cell, max_radius) {
        Some(free) => {
            debug!(endpoint, from = ?cell, to = ?free, "blocked endpoint recovered");
            Ok(free)
        }
        None => {
            warn!(endpoint, ?cell, max_radius, "no free cell near endpoint");
            Err(NavFailure::NoPath)
        }
    }
}

/// Heading for each waypoint command: the direction of travel into it.
fn route_headings(from: Pose, waypoints: &[(f32, f32)]) -> Vec<f32> {
    let mut prev = (from.x, from.y);
    let mut heading = from.heading;
    waypoints
        .iter()
        .map(|&p| {
            if (p.0 - prev.0).hypot(p.1 - prev.1) > f32::EPSILON {
                heading = segment_heading(prev, p);
            }
            prev = p;
            heading
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of the most recent request.
///
/// `Complete`, `Failed` and `Cancelled` report how the last request ended;
/// the orchestrator is idle in all three and accepts the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Planning,
    Executing,
    Complete,
    Failed,
    Cancelled,
}

#[derive(Debug)]
struct ActiveRoute {
    generation: u64,
    room: String,
    waypoints: Vec<(f32, f32)>,
    headings: Vec<f32>,
    /// Index of the waypoint currently being driven to.
    next: usize,
    deadline: Instant,
}

/// Event-driven navigation state machine.
///
/// The `handle_*` methods are the whole behaviour; [`run`](Self::run) only
/// feeds them from the bus and the waypoint timer.
pub struct NavigationOrchestrator {
    bus: EventBus,
    index: SharedRoomIndex,
    landmarks: watch::Receiver<Arc<Vec<Landmark>>>,
    config: NavigatorConfig,
    pose: Option<Pose>,
    state: NavigationState,
    generation: u64,
    active: Option<ActiveRoute>,
}

impl NavigationOrchestrator {
    /// `landmarks` is the obstacle source; a remap swaps it by sending a new
    /// snapshot on the paired [`watch::Sender`]. An in-flight route keeps the
    /// waypoints it was planned with.
    pub fn new(
        bus: EventBus,
        index: SharedRoomIndex,
        landmarks: watch::Receiver<Arc<Vec<Landmark>>>,
        config: NavigatorConfig,
    ) -> Self {
        Self {
            bus,
            index,
            landmarks,
            config,
            pose: None,
            state: NavigationState::Idle,
            generation: 0,
            active: None,
        }
    }

    /// Current phase, or the outcome of the last request once it ended.
    pub fn state(&self) -> NavigationState {
        self.state
    }

    /// True unless a request is being planned or executed.
    pub fn is_idle(&self) -> bool {
        !matches!(self.state, NavigationState::Planning | NavigationState::Executing)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last tracked pose.
    pub fn pose(&self) -> Option<Pose> {
        self.pose
    }

    /// Index and position of the waypoint currently being driven to.
    pub fn current_target(&self) -> Option<(usize, (f32, f32))> {
        let route = self.active.as_ref()?;
        route.waypoints.get(route.next).map(|p| (route.next, *p))
    }

    // ── Handlers ─────────────────────────────────────────────────────────────

    /// Plan and start a route to `room`, superseding any active route.
    pub async fn handle_navigate(&mut self, room: &str) {
        self.halt_active("superseded by a new request");
        self.generation += 1;
        self.state = NavigationState::Planning;
        info!(generation = self.generation, room, "navigation requested");

        match self.plan(room).await {
            Ok((target, from, waypoints)) => self.begin(target, from, waypoints),
            Err(reason) => self.fail(reason, room),
        }
    }

    pub fn handle_pose(&mut self, pose: Pose) {
        if pose.tracking_state != TrackingState::Ok {
            debug!(tracking = ?pose.tracking_state, "ignoring untracked pose");
            return;
        }
        self.pose = Some(pose);
        let arrived = self
            .current_target()
            .is_some_and(|(_, (x, y))| pose.distance_to(x, y) <= self.config.arrival_threshold);
        if arrived {
            self.advance("pose");
        }
    }

    /// Arrival feedback from the motion layer. A report naming a waypoint
    /// other than the current one is stale and ignored.
    pub fn handle_waypoint_reached(&mut self, index: Option<usize>) {
        let Some((current, _)) = self.current_target() else {
            debug!("waypoint_reached with no active route");
            return;
        };
        if let Some(reported) = index
            && reported != current
        {
            debug!(reported, current, "stale waypoint_reached ignored");
            return;
        }
        self.advance("feedback");
    }

    pub fn handle_cancel(&mut self) {
        if !self.halt_active("cancel requested") {
            debug!("cancel with no active route");
            self.publish_action(MotionCommand::Stop);
        }
    }

    /// Waypoint timer for `generation` fired.
    pub fn handle_timeout(&mut self, generation: u64) {
        let due = self
            .active
            .as_ref()
            .is_some_and(|r| r.generation == generation && Instant::now() >= r.deadline);
        if due {
            self.advance("timeout");
        } else {
            debug!(generation, current = self.generation, "stale waypoint timer ignored");
        }
    }

    async fn handle_event(&mut self, payload: EventPayload) {
        match payload {
            EventPayload::NavigateToRoom { room } => self.handle_navigate(&room).await,
            EventPayload::Pose(pose) => self.handle_pose(pose),
            EventPayload::CancelNavigation => self.handle_cancel(),
            EventPayload::WaypointReached { index } => self.handle_waypoint_reached(index),
            other => debug!(?other, "navigator ignoring payload"),
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn plan(&self, room: &str) -> Result<(String, Pose, Vec<(f32, f32)>), NavFailure> {
        let target = {
            let index = self.index.lock().await;
            index
                .get_room_by_name(room)
                .map_err(|e| {
                    warn!(error = %e, room, "room lookup failed");
                    NavFailure::Storage
                })?
                .ok_or(NavFailure::RoomNotFound)?
        };
        let from = self.pose.ok_or(NavFailure::NoPose)?;

        let landmarks = self.landmarks.borrow().clone();
        let grid = OccupancyGrid::from_landmarks(&landmarks, &self.config.grid);
        let waypoints = plan_route(
            &grid,
            (from.x, from.y),
            (target.center.x, target.center.y),
            &self.config,
        )?;
        Ok((target.name, from, waypoints))
    }

    fn begin(&mut self, room: String, from: Pose, waypoints: Vec<(f32, f32)>) {
        info!(
            generation = self.generation,
            room = %room,
            waypoints = waypoints.len(),
            "route planned"
        );
        let headings = route_headings(from, &waypoints);
        self.state = NavigationState::Executing;
        self.active = Some(ActiveRoute {
            generation: self.generation,
            room,
            waypoints,
            headings,
            next: 0,
            deadline: Instant::now() + self.config.waypoint_timeout,
        });
        self.send_current_waypoint();
    }

    fn advance(&mut self, trigger: &'static str) {
        if let Some(route) = self.active.as_mut() {
            debug!(index = route.next, trigger, "waypoint reached");
            route.next += 1;
        }
        self.send_current_waypoint();
    }

    fn send_current_waypoint(&mut self) {
        let timeout = self.config.waypoint_timeout;
        let command = match self.active.as_mut() {
            None => return,
            Some(route) if route.next >= route.waypoints.len() => None,
            Some(route) => {
                route.deadline = Instant::now() + timeout;
                let (x, y) = route.waypoints[route.next];
                Some(MotionCommand::MoveTo {
                    x,
                    y,
                    heading: route.headings[route.next],
                    index: route.next,
                    total: route.waypoints.len(),
                })
            }
        };
        match command {
            Some(cmd) => {
                debug!(?cmd, "sending waypoint");
                self.publish_action(cmd);
            }
            None => self.finish(),
        }
    }

    fn finish(&mut self) {
        let Some(route) = self.active.take() else {
            return;
        };
        self.state = NavigationState::Complete;
        info!(room = %route.room, waypoints = route.waypoints.len(), "navigation complete");
        let _ = self.bus.publish_payload(
            Topic::NavigationComplete,
            SOURCE,
            EventPayload::NavigationComplete(NavigationComplete {
                success: true,
                room: route.room,
                waypoints: route.waypoints.len(),
            }),
        );
    }

    /// Stop the active route, if any. Returns whether one was running.
    fn halt_active(&mut self, why: &'static str) -> bool {
        let Some(route) = self.active.take() else {
            return false;
        };
        info!(
            generation = route.generation,
            room = %route.room,
            reached = route.next,
            reason = why,
            "route cancelled"
        );
        self.state = NavigationState::Cancelled;
        self.publish_action(MotionCommand::Stop);
        true
    }

    fn fail(&mut self, reason: NavFailure, room: &str) {
        self.state = NavigationState::Failed;
        warn!(room, reason = reason.as_str(), "navigation failed");
        let _ = self.bus.publish_payload(
            Topic::NavigationFailed,
            SOURCE,
            EventPayload::NavigationFailed(NavigationFailed {
                reason,
                room: Some(room.to_string()),
            }),
        );
    }

    fn publish_action(&self, cmd: MotionCommand) {
        // Best-effort: no motion layer listening is not an error here.
        let _ = self
            .bus
            .publish_payload(Topic::RobotAction, SOURCE, EventPayload::RobotAction(cmd));
    }

    // ── Event loop ───────────────────────────────────────────────────────────

    /// Subscribe to the input topics now and drive the orchestrator on a
    /// background task.
    pub fn spawn(self) -> JoinHandle<()> {
        let inbox = NavigatorInbox::subscribe(&self.bus);
        tokio::spawn(self.run(inbox))
    }

    /// Process bus events and waypoint timers until the bus closes.
    pub async fn run(mut self, mut inbox: NavigatorInbox) {
        info!("navigator running");
        loop {
            let timer = self.active.as_ref().map(|r| (r.generation, r.deadline));
            // Cancellation and pose updates are drained before new requests.
            let wake = tokio::select! {
                biased;
                msg = inbox.cancel.recv() => Wake::from_recv(Topic::CancelNavigation, msg),
                msg = inbox.pose.recv() => Wake::from_recv(Topic::SlamPose, msg),
                msg = inbox.reached.recv() => Wake::from_recv(Topic::WaypointReached, msg),
                msg = inbox.navigate.recv() => Wake::from_recv(Topic::NavigateToRoom, msg),
                _ = wait_for(timer) => Wake::Timer(timer.map_or(0, |(generation, _)| generation)),
            };
            match wake {
                Wake::Event(payload) => self.handle_event(payload).await,
                Wake::Timer(generation) => self.handle_timeout(generation),
                Wake::Skip => {}
                Wake::Closed => break,
            }
        }
        info!("navigator stopped");
    }
}

/// Receivers for every topic the orchestrator consumes.
pub struct NavigatorInbox {
    navigate: TopicReceiver,
    pose: TopicReceiver,
    cancel: TopicReceiver,
    reached: TopicReceiver,
}

impl NavigatorInbox {
    pub fn subscribe(bus: &EventBus) -> Self {
        Self {
            navigate: bus.subscribe_to(Topic::NavigateToRoom),
            pose: bus.subscribe_to(Topic::SlamPose),
            cancel: bus.subscribe_to(Topic::CancelNavigation),
            reached: bus.subscribe_to(Topic::WaypointReached),
        }
    }
}

enum Wake {
    Event(EventPayload),
    Timer(u64),
    Skip,
    Closed,
}

impl Wake {
    fn from_recv(topic: Topic, msg: Result<Event, RecvError>) -> Self {
        match msg {
            Ok(event) => Wake::Event(event.payload),
            Err(RecvError::Lagged(skipped)) => {
                warn!(%topic, skipped, "navigator lagged behind the bus");
                Wake::Skip
            }
            Err(RecvError::Closed) => Wake::Closed,
        }
    }
}

async fn wait_for(timer: Option<(u64, Instant)>) {
    match timer {
        Some((_, deadline)) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
