//! `wayfinder` – operator shell for the spatial mapping and navigation stack.
//!
//! On start-up it:
//!
//! 1. Loads `~/.wayfinder/config.toml`, writing defaults on first run.
//! 2. Opens the room index and, when it is empty and a map snapshot exists,
//!    clusters the map into rooms.
//! 3. Spawns the navigation orchestrator and the location service on a
//!    shared event bus, plus a monitor that prints their output.
//! 4. Drops the user into an **interactive REPL** (`/help` lists commands).
//! 5. Intercepts **Ctrl-C** to publish a `stop` motion command and exit.

mod config;
mod repl;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{info, warn};

use wayfinder_memory::RoomIndex;
use wayfinder_middleware::{EventBus, Topic, TopicReceiver};
use wayfinder_perception::MapSnapshot;
use wayfinder_runtime::{LocationService, NavigationOrchestrator, remap};
use wayfinder_types::{Event, EventPayload, Landmark, MotionCommand};

fn main() {
    let _telemetry = wayfinder_runtime::init_tracing("wayfinder");

    print_banner();

    let cfg = resolve_config();

    let index = match RoomIndex::open(&cfg.room_db_path) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("{}: {}", "Failed to open room index".red(), e);
            std::process::exit(1);
        }
    };
    let landmarks = initial_landmarks(&index, &cfg);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    let bus = EventBus::default();
    let index = wayfinder_runtime::share(index);
    let (feed, feed_rx) = watch::channel(Arc::new(landmarks));

    {
        let _ctx = runtime.enter();
        NavigationOrchestrator::new(bus.clone(), index.clone(), feed_rx, cfg.navigator()).spawn();
        LocationService::new(bus.clone(), index.clone()).spawn();
        tokio::spawn(monitor(
            bus.subscribe_to(Topic::NavigationComplete),
            bus.subscribe_to(Topic::NavigationFailed),
            bus.subscribe_to(Topic::RoomResponse),
            bus.subscribe_to(Topic::RobotAction),
        ));
    }

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let bus_ctrlc = bus.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        let _ = bus_ctrlc.publish_payload(
            Topic::RobotAction,
            "wayfinder-cli",
            EventPayload::RobotAction(MotionCommand::Stop),
        );
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    let session = repl::Session {
        bus,
        index,
        landmarks: feed,
        config: cfg,
    };
    repl::run(&session, shutdown);

    // Give the stop command a moment to reach the monitor before tearing down.
    std::thread::sleep(Duration::from_millis(50));
    runtime.shutdown_timeout(Duration::from_millis(500));
}

/// Load the config, creating it with defaults on first run.
fn resolve_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let defaults = config::Config::default();
            match config::save(&defaults) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            let mut cfg = defaults;
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// Obstacle landmarks for planning at start-up. An empty room index is
/// populated from the map when one is available.
fn initial_landmarks(index: &RoomIndex, cfg: &config::Config) -> Vec<Landmark> {
    if !Path::new(&cfg.map_path).exists() {
        println!(
            "  No map at {}; rooms come from {} or {}.",
            cfg.map_path.yellow(),
            "/remap <path>".bold(),
            "/import <path>".bold()
        );
        return Vec::new();
    }

    let empty = index.room_count().map(|n| n == 0).unwrap_or(false);
    if empty {
        match remap(index, &cfg.map_path, &cfg.mapper()) {
            Ok(summary) => {
                println!(
                    "  {} {} room(s) built from {}",
                    "✓".green().bold(),
                    summary.rooms.len(),
                    cfg.map_path.bold()
                );
                return summary.landmarks;
            }
            Err(e) => {
                println!("{}: {}", "Remap failed".red(), e);
                return Vec::new();
            }
        }
    }

    match MapSnapshot::load(&cfg.map_path) {
        Ok(snapshot) => {
            let landmarks = snapshot.well_observed(cfg.min_observations);
            info!(landmarks = landmarks.len(), "obstacle map loaded");
            landmarks
        }
        Err(e) => {
            println!("{}: {}", "Map load failed".red(), e);
            Vec::new()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output monitor
// ─────────────────────────────────────────────────────────────────────────────

async fn monitor(
    mut complete: TopicReceiver,
    mut failed: TopicReceiver,
    mut responses: TopicReceiver,
    mut actions: TopicReceiver,
) {
    loop {
        let msg: Result<Event, RecvError> = tokio::select! {
            msg = complete.recv() => msg,
            msg = failed.recv() => msg,
            msg = responses.recv() => msg,
            msg = actions.recv() => msg,
        };
        match msg {
            Ok(event) => print_event(&event.payload),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "monitor lagged behind the bus"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_event(payload: &EventPayload) {
    match payload {
        EventPayload::NavigationComplete(done) => println!(
            "\n  {} arrived at {} ({} waypoint(s))",
            "✓".green().bold(),
            done.room.bold(),
            done.waypoints
        ),
        EventPayload::NavigationFailed(failure) => println!(
            "\n  {} navigation failed: {}{}",
            "✗".red().bold(),
            failure.reason.as_str().yellow(),
            failure
                .room
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default()
        ),
        EventPayload::RoomResponse(response) => {
            println!("\n  {} {}", "»".cyan().bold(), response.text)
        }
        EventPayload::RobotAction(MotionCommand::MoveTo { x, y, heading, index, total }) => println!(
            "\n  {} waypoint {}/{} → ({:.2}, {:.2}) heading {:.2}",
            "→".blue().bold(),
            index + 1,
            total,
            x,
            y,
            heading
        ),
        EventPayload::RobotAction(MotionCommand::Stop) => {
            println!("\n  {} stop", "■".yellow().bold())
        }
        _ => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _      __          _____         __       "#.bold().cyan());
    println!("{}", r#"| | /| / /__ ___ __/ _(_)__  ___/ /__ ____"#.bold().cyan());
    println!("{}", r#"| |/ |/ / _ `/ // / _/ / _ \/ _  / -_) __/"#.bold().cyan());
    println!("{}", r#"|__/|__/\_,_/\_, /_//_/_//_/\_,_/\__/_/   "#.bold().cyan());
    println!("{}", r#"            /___/                          "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Wayfinder".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Room mapping and navigation");
    println!();
}
