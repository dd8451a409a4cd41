//! REPL – operator shell for the running navigation stack.
//!
//! Supported slash-commands:
//!   /help                       – show this list
//!   /remap [path]               – rebuild rooms from a map snapshot
//!   /rooms                      – list known rooms
//!   /label <room> <label>       – attach a human label to a room
//!   /connect <a> <b> [type]     – record adjacency between two rooms
//!   /export <path>              – write the room index as JSON
//!   /import <path>              – load rooms from a JSON export
//!   /goto <room>                – request navigation to a room by exact name
//!   /say <text>                 – send a free-text query to the location bridge
//!   /pose <x> <y> [heading]     – inject a tracked pose
//!   /reached [index]            – report waypoint arrival
//!   /cancel                     – cancel the active route
//!   /quit | /exit               – stop the robot and exit
//!
//! Bare text without a leading slash is treated as `/say`.

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::warn;

use wayfinder_memory::RoomIndex;
use wayfinder_middleware::{EventBus, Topic};
use wayfinder_runtime::{LocationBridge, SharedRoomIndex, remap};
use wayfinder_types::{EventPayload, Landmark, MotionCommand, Pose};

use crate::config::Config;

const SOURCE: &str = "wayfinder-cli";

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Remap(Option<String>),
    Rooms,
    Label { room: String, label: String },
    Connect { a: String, b: String, kind: String },
    Export(String),
    Import(String),
    Goto(String),
    Say(String),
    Pose { x: f32, y: f32, heading: f32 },
    Reached(Option<usize>),
    Cancel,
    Quit,
}

/// Parse one input line. Errors carry a usage hint for the operator.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let words: Vec<&str> = args.split_whitespace().collect();

    match name {
        "help" => Ok(Command::Help),
        "remap" => Ok(Command::Remap((!args.is_empty()).then(|| args.to_string()))),
        "rooms" => Ok(Command::Rooms),
        "label" => match words.as_slice() {
            [room, label @ ..] if !label.is_empty() => Ok(Command::Label {
                room: room.to_string(),
                label: label.join(" "),
            }),
            _ => Err("usage: /label <room> <label>".into()),
        },
        "connect" => match words.as_slice() {
            [a, b] => Ok(Command::Connect {
                a: a.to_string(),
                b: b.to_string(),
                kind: "door".to_string(),
            }),
            [a, b, kind] => Ok(Command::Connect {
                a: a.to_string(),
                b: b.to_string(),
                kind: kind.to_string(),
            }),
            _ => Err("usage: /connect <room_a> <room_b> [type]".into()),
        },
        "export" if !args.is_empty() => Ok(Command::Export(args.to_string())),
        "export" => Err("usage: /export <path>".into()),
        "import" if !args.is_empty() => Ok(Command::Import(args.to_string())),
        "import" => Err("usage: /import <path>".into()),
        "goto" if !args.is_empty() => Ok(Command::Goto(args.to_string())),
        "goto" => Err("usage: /goto <room>".into()),
        "say" if !args.is_empty() => Ok(Command::Say(args.to_string())),
        "say" => Err("usage: /say <text>".into()),
        "pose" => {
            let parse = |s: &str| s.parse::<f32>().map_err(|_| format!("not a number: {s}"));
            match words.as_slice() {
                [x, y] => Ok(Command::Pose { x: parse(*x)?, y: parse(*y)?, heading: 0.0 }),
                [x, y, h] => Ok(Command::Pose { x: parse(*x)?, y: parse(*y)?, heading: parse(*h)? }),
                _ => Err("usage: /pose <x> <y> [heading]".into()),
            }
        }
        "reached" => match words.as_slice() {
            [] => Ok(Command::Reached(None)),
            [i] => i
                .parse::<usize>()
                .map(|i| Command::Reached(Some(i)))
                .map_err(|_| format!("not a waypoint index: {i}")),
            _ => Err("usage: /reached [index]".into()),
        },
        "cancel" => Ok(Command::Cancel),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command '/{other}'")),
    }
}

/// Handles shared between the REPL and the background services.
pub struct Session {
    pub bus: EventBus,
    pub index: SharedRoomIndex,
    /// Obstacle landmarks used by the navigator; replaced on every remap.
    pub landmarks: watch::Sender<Arc<Vec<Landmark>>>,
    pub config: Config,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
/// Must run outside the Tokio runtime: room index access uses
/// `blocking_lock`.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}: {}", "Failed to open line editor".red(), e);
            return;
        }
    };
    let prompt = format!("{} ", "wayfinder>".bold().cyan());

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => {
                session.stop();
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        match parse_command(line) {
            Ok(Command::Quit) => {
                session.stop();
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(cmd) => session.execute(cmd),
            Err(msg) => println!(
                "{} {}. Type {} for available commands.",
                "✗".red(),
                msg.yellow(),
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

impl Session {
    fn execute(&self, cmd: Command) {
        match cmd {
            Command::Help => cmd_help(),
            Command::Remap(path) => self.cmd_remap(path),
            Command::Rooms => self.cmd_rooms(),
            Command::Label { room, label } => self.cmd_label(&room, &label),
            Command::Connect { a, b, kind } => self.cmd_connect(&a, &b, &kind),
            Command::Export(path) => self.cmd_export(&path),
            Command::Import(path) => self.cmd_import(&path),
            Command::Goto(room) => {
                self.publish(Topic::NavigateToRoom, EventPayload::NavigateToRoom { room })
            }
            Command::Say(text) => self.publish(Topic::RoomQuery, EventPayload::RoomQuery { text }),
            Command::Pose { x, y, heading } => {
                self.publish(Topic::SlamPose, EventPayload::Pose(Pose::new(x, y, heading)))
            }
            Command::Reached(index) => {
                self.publish(Topic::WaypointReached, EventPayload::WaypointReached { index })
            }
            Command::Cancel => self.publish(Topic::CancelNavigation, EventPayload::CancelNavigation),
            Command::Quit => {}
        }
    }

    /// Publish a halt command directly to the motion layer.
    pub fn stop(&self) {
        let _ = self.bus.publish_payload(
            Topic::RobotAction,
            SOURCE,
            EventPayload::RobotAction(MotionCommand::Stop),
        );
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        if let Err(e) = self.bus.publish_payload(topic, SOURCE, payload) {
            warn!(%topic, error = %e, "publish dropped");
            println!("{} {}", "✗".red(), e);
        }
    }

    fn cmd_remap(&self, path: Option<String>) {
        let path = path.unwrap_or_else(|| self.config.map_path.clone());
        let index = self.index.blocking_lock();
        match remap(&index, &path, &self.config.mapper()) {
            Ok(summary) => {
                println!(
                    "  {} {} keyframes, {}/{} landmarks used, {} room(s)",
                    "✓".green().bold(),
                    summary.keyframes,
                    summary.landmarks.len(),
                    summary.landmarks_total,
                    summary.rooms.len()
                );
                for name in &summary.rooms {
                    println!("    • {}", name.bold());
                }
                self.landmarks.send_replace(Arc::new(summary.landmarks));
            }
            Err(e) => println!("{} remap of {} failed: {}", "✗".red(), path.yellow(), e),
        }
    }

    fn cmd_rooms(&self) {
        let index = self.index.blocking_lock();
        match index.get_all_rooms() {
            Ok(rooms) if rooms.is_empty() => println!("  No rooms yet. Try {}.", "/remap".bold()),
            Ok(rooms) => {
                for room in rooms {
                    let label = room
                        .label
                        .as_deref()
                        .map(|l| format!(" \"{l}\""))
                        .unwrap_or_default();
                    println!(
                        "  [{}] {}{}  centre ({:.2}, {:.2})  {} landmarks",
                        room.room_id,
                        room.name.bold(),
                        label.cyan(),
                        room.center.x,
                        room.center.y,
                        room.landmark_count
                    );
                }
            }
            Err(e) => println!("{}: {}", "Room index error".red(), e),
        }
    }

    fn cmd_label(&self, room: &str, label: &str) {
        let index = self.index.blocking_lock();
        let result = find_room(&index, room)
            .and_then(|r| index.update_room_label(r.room_id, label).map(|()| r.name));
        match result {
            Ok(name) => println!("  {} {} is now \"{}\"", "✓".green().bold(), name, label),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }

    fn cmd_connect(&self, a: &str, b: &str, kind: &str) {
        let index = self.index.blocking_lock();
        let result = find_room(&index, a).and_then(|ra| {
            let rb = find_room(&index, b)?;
            index.add_room_connection(ra.room_id, rb.room_id, kind)?;
            Ok((ra.name, rb.name))
        });
        match result {
            Ok((a, b)) => println!("  {} {} <-> {} ({})", "✓".green().bold(), a, b, kind),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }

    fn cmd_export(&self, path: &str) {
        let index = self.index.blocking_lock();
        match index.export_to_file(path) {
            Ok(()) => println!("  {} rooms written to {}", "✓".green().bold(), path.bold()),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }

    fn cmd_import(&self, path: &str) {
        let index = self.index.blocking_lock();
        match index.import_from_file(path) {
            Ok(n) => println!("  {} imported {} room(s)", "✓".green().bold(), n),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }
}

fn find_room(
    index: &RoomIndex,
    query: &str,
) -> Result<wayfinder_memory::Room, wayfinder_memory::RoomIndexError> {
    LocationBridge::new(index)
        .get_room_by_name(query)?
        .ok_or_else(|| wayfinder_memory::RoomIndexError::RoomNotFound(query.to_string()))
}

fn cmd_help() {
    println!();
    println!("{}", "Wayfinder Commands".bold().underline());
    println!("  {}       – rebuild rooms from the map", "/remap [path]".bold().cyan());
    println!("  {}              – list known rooms", "/rooms".bold().cyan());
    println!("  {} – name a room", "/label <room> <label>".bold().cyan());
    println!("  {}  – connect two rooms", "/connect <a> <b> [type]".bold().cyan());
    println!("  {} – save / load rooms as JSON", "/export|/import <path>".bold().cyan());
    println!("  {}        – navigate to a room", "/goto <room>".bold().cyan());
    println!("  {}         – ask where we are, or where to go", "/say <text>".bold().cyan());
    println!("  {}  – inject a pose", "/pose <x> <y> [heading]".bold().cyan());
    println!("  {}    – report waypoint arrival", "/reached [index]".bold().cyan());
    println!("  {}             – cancel the active route", "/cancel".bold().cyan());
    println!("  {}        – stop the robot and exit", "/quit  /exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_text_is_a_query() {
        assert_eq!(
            parse_command("where am I?"),
            Ok(Command::Say("where am I?".into()))
        );
    }

    #[test]
    fn parses_navigation_commands() {
        assert_eq!(parse_command("/goto the kitchen"), Ok(Command::Goto("the kitchen".into())));
        assert_eq!(parse_command("/cancel"), Ok(Command::Cancel));
        assert_eq!(parse_command("/reached"), Ok(Command::Reached(None)));
        assert_eq!(parse_command("/reached 2"), Ok(Command::Reached(Some(2))));
        assert!(parse_command("/reached two").is_err());
        assert!(parse_command("/goto").is_err());
    }

    #[test]
    fn parses_pose_with_optional_heading() {
        assert_eq!(
            parse_command("/pose 1.5 -2"),
            Ok(Command::Pose { x: 1.5, y: -2.0, heading: 0.0 })
        );
        assert_eq!(
            parse_command("/pose 0 0 1.57"),
            Ok(Command::Pose { x: 0.0, y: 0.0, heading: 1.57 })
        );
        assert!(parse_command("/pose 1").is_err());
        assert!(parse_command("/pose a b").is_err());
    }

    #[test]
    fn parses_room_management_commands() {
        assert_eq!(parse_command("/remap"), Ok(Command::Remap(None)));
        assert_eq!(
            parse_command("/remap /tmp/map.json"),
            Ok(Command::Remap(Some("/tmp/map.json".into())))
        );
        assert_eq!(
            parse_command("/label room_1 living room"),
            Ok(Command::Label { room: "room_1".into(), label: "living room".into() })
        );
        assert!(parse_command("/label room_1").is_err());
        assert_eq!(
            parse_command("/connect room_1 room_2"),
            Ok(Command::Connect { a: "room_1".into(), b: "room_2".into(), kind: "door".into() })
        );
        assert_eq!(
            parse_command("/connect room_1 room_2 hallway"),
            Ok(Command::Connect { a: "room_1".into(), b: "room_2".into(), kind: "hallway".into() })
        );
        assert_eq!(parse_command("/export out.json"), Ok(Command::Export("out.json".into())));
        assert!(parse_command("/import").is_err());
    }

    #[test]
    fn quit_aliases_and_unknown_commands() {
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(parse_command("  /exit  "), Ok(Command::Quit));
        assert!(parse_command("/dance").unwrap_err().contains("/dance"));
    }

    #[test]
    fn label_resolves_rooms_fuzzily() {
        let index = RoomIndex::open_in_memory().unwrap();
        index
            .add_room(
                &wayfinder_memory::NewRoom::named("room_1"),
                &[Landmark::new(1, 0.0, 0.0, 0.5, 1)],
            )
            .unwrap();
        assert_eq!(find_room(&index, "ROOM_1").unwrap().name, "room_1");
        assert!(matches!(
            find_room(&index, "garage"),
            Err(wayfinder_memory::RoomIndexError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn goto_publishes_navigation_request() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::NavigateToRoom);
        let (feed, _) = watch::channel(Arc::new(Vec::new()));
        let session = Session {
            bus: bus.clone(),
            index: wayfinder_runtime::share(RoomIndex::open_in_memory().unwrap()),
            landmarks: feed,
            config: Config::default(),
        };
        session.execute(Command::Goto("kitchen".into()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.payload,
            EventPayload::NavigateToRoom { ref room } if room == "kitchen"
        ));
    }
}
