//! Natural-language bridge between utterances and the room index.
//!
//! [`LocationBridge`] is a thin, synchronous view over a [`RoomIndex`]:
//!
//! | Operation | Behaviour |
//! |-----------|-----------|
//! | [`get_room_by_name`](LocationBridge::get_room_by_name) | exact name, then first case-insensitive substring hit on label or name |
//! | [`parse_navigation_command`](LocationBridge::parse_navigation_command) | trigger-phrase prefix → [`NavigationIntent`] |
//! | [`generate_navigation_response`](LocationBridge::generate_navigation_response) | fixed reply template per intent |
//! | [`get_location_context`](LocationBridge::get_location_context) | "where am I" sentence for a pose |
//!
//! [`LocationService`] runs the bridge on the bus: utterances arrive on
//! `slam_room_query`, replies leave on `slam_room_response`, and resolved
//! navigation intents are forwarded to `navigate_to_room`.
//!
//! ```rust
//! use wayfinder_memory::{NewRoom, RoomIndex};
//! use wayfinder_runtime::location::{LocationBridge, NavigationIntent};
//! use wayfinder_types::Landmark;
//!
//! let index = RoomIndex::open_in_memory().unwrap();
//! let lm = [Landmark::new(1, 0.0, 0.0, 0.5, 2), Landmark::new(2, 3.0, 3.0, 0.5, 2)];
//! index.add_room(&NewRoom::named("room_1").with_label("Kitchen"), &lm).unwrap();
//!
//! let bridge = LocationBridge::new(&index);
//! let intent = bridge.parse_navigation_command("Take me to the kitchen").unwrap();
//! assert!(matches!(intent, Some(NavigationIntent::GoToRoom { room }) if room.name == "room_1"));
//! ```

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wayfinder_memory::{Room, RoomIndex, RoomIndexError};
use wayfinder_middleware::{EventBus, Topic, TopicReceiver};
use wayfinder_types::{EventPayload, Pose, RoomResponse, TrackingState};

use crate::SharedRoomIndex;

const SOURCE: &str = "wayfinder-runtime::location";

/// Prefixes that turn the rest of the utterance into a room query.
const NAVIGATION_TRIGGERS: &[&str] = &[
    "take me to",
    "bring me to",
    "lead me to",
    "navigate to",
    "go to",
    "head to",
    "move to",
    "drive to",
    "walk to",
];

const LOCATION_QUERIES: &[&str] = &[
    "where am i",
    "what room am i in",
    "which room am i in",
    "where are we",
];

const LIST_QUERIES: &[&str] = &[
    "what rooms",
    "which rooms",
    "list rooms",
    "list the rooms",
    "show rooms",
];

/// What an utterance asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationIntent {
    GoToRoom { room: Room },
    /// A navigation phrase whose target matched no room.
    UnknownRoom { query: String },
    WhereAmI,
    ListRooms,
}

fn normalise(text: &str) -> String {
    let lowered = text.to_lowercase();
    let joined = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    joined
        .trim_end_matches(['?', '.', '!', ','])
        .trim_end()
        .to_string()
}

fn join_names(rooms: &[Room]) -> String {
    rooms
        .iter()
        .map(Room::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// LocationBridge
// ─────────────────────────────────────────────────────────────────────────────

pub struct LocationBridge<'a> {
    index: &'a RoomIndex,
}

impl<'a> LocationBridge<'a> {
    pub fn new(index: &'a RoomIndex) -> Self {
        Self { index }
    }

    /// Resolve a spoken room reference.
    ///
    /// Tries the exact machine name first, then the first room (in id order)
    /// whose label or name contains `query`, ignoring case. Ambiguous
    /// queries resolve to the lowest id.
    pub fn get_room_by_name(&self, query: &str) -> Result<Option<Room>, RoomIndexError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        if let Some(room) = self.index.get_room_by_name(query)? {
            return Ok(Some(room));
        }
        let needle = query.to_lowercase();
        Ok(self.index.get_all_rooms()?.into_iter().find(|r| {
            r.label
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&needle))
                || r.name.to_lowercase().contains(&needle)
        }))
    }

    /// Classify an utterance. `None` when it matches no known phrasing.
    pub fn parse_navigation_command(
        &self,
        text: &str,
    ) -> Result<Option<NavigationIntent>, RoomIndexError> {
        let text = normalise(text);
        if LOCATION_QUERIES.iter().any(|q| text.contains(q)) {
            return Ok(Some(NavigationIntent::WhereAmI));
        }
        if LIST_QUERIES.iter().any(|q| text.contains(q)) {
            return Ok(Some(NavigationIntent::ListRooms));
        }

        let text = text.strip_prefix("please ").unwrap_or(&text);
        for trigger in NAVIGATION_TRIGGERS {
            let Some(rest) = text.strip_prefix(trigger) else {
                continue;
            };
            if !(rest.is_empty() || rest.starts_with(' ')) {
                continue;
            }
            let rest = rest.trim_start();
            let target = rest
                .strip_prefix("the")
                .filter(|r| r.is_empty() || r.starts_with(' '))
                .unwrap_or(rest)
                .trim();
            if target.is_empty() {
                return Ok(None);
            }
            let intent = match self.get_room_by_name(target)? {
                Some(room) => NavigationIntent::GoToRoom { room },
                None => NavigationIntent::UnknownRoom {
                    query: target.to_string(),
                },
            };
            return Ok(Some(intent));
        }
        Ok(None)
    }

    /// Reply text for `intent`.
    pub fn generate_navigation_response(
        &self,
        intent: &NavigationIntent,
        pose: Option<&Pose>,
    ) -> Result<String, RoomIndexError> {
        Ok(match intent {
            NavigationIntent::GoToRoom { room } => {
                format!("Okay, heading to {}.", room.display_name())
            }
            NavigationIntent::UnknownRoom { query } => {
                format!("Sorry, I don't know a room called \"{query}\".")
            }
            NavigationIntent::WhereAmI => self.get_location_context(pose)?,
            NavigationIntent::ListRooms => {
                let rooms = self.index.get_all_rooms()?;
                match rooms.len() {
                    0 => "I don't know any rooms yet.".to_string(),
                    1 => format!("I know 1 room: {}.", join_names(&rooms)),
                    n => format!("I know {n} rooms: {}.", join_names(&rooms)),
                }
            }
        })
    }

    /// Describe where `pose` is relative to the known rooms.
    pub fn get_location_context(&self, pose: Option<&Pose>) -> Result<String, RoomIndexError> {
        let Some(pose) = pose else {
            return Ok("I don't know where I am yet.".to_string());
        };
        if pose.tracking_state != TrackingState::Ok {
            return Ok("I've lost track of where I am.".to_string());
        }
        let Some(room) = self.index.get_room_at_position(pose.x, pose.y)? else {
            return Ok(format!(
                "We're at ({:.1}, {:.1}), outside any known room.",
                pose.x, pose.y
            ));
        };

        let mut text = format!(
            "We're in {}, at ({:.1}, {:.1}).",
            room.display_name(),
            pose.x,
            pose.y
        );
        let neighbours: Vec<Room> = self
            .index
            .get_connected_rooms(room.room_id)?
            .into_iter()
            .map(|c| c.room)
            .collect();
        if !neighbours.is_empty() {
            text.push_str(&format!(" From here you can reach {}.", join_names(&neighbours)));
        }
        Ok(text)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LocationService
// ─────────────────────────────────────────────────────────────────────────────

/// Bus front-end for [`LocationBridge`].
pub struct LocationService {
    bus: EventBus,
    index: SharedRoomIndex,
    pose: Option<Pose>,
}

impl LocationService {
    pub fn new(bus: EventBus, index: SharedRoomIndex) -> Self {
        Self {
            bus,
            index,
            pose: None,
        }
    }

    pub fn handle_pose(&mut self, pose: Pose) {
        self.pose = Some(pose);
    }

    /// Answer `text` on `slam_room_response`; a resolved navigation intent is
    /// also forwarded to `navigate_to_room`.
    pub async fn handle_query(&mut self, text: &str) -> RoomResponse {
        let (response, forward) = {
            let index = self.index.lock().await;
            self.answer(&index, text)
        };

        info!(query = text, reply = %response.text, "room query answered");
        let _ = self.bus.publish_payload(
            Topic::RoomResponse,
            SOURCE,
            EventPayload::RoomResponse(response.clone()),
        );
        if let Some(room) = forward {
            let _ = self.bus.publish_payload(
                Topic::NavigateToRoom,
                SOURCE,
                EventPayload::NavigateToRoom { room },
            );
        }
        response
    }

    fn answer(&self, index: &RoomIndex, text: &str) -> (RoomResponse, Option<String>) {
        let bridge = LocationBridge::new(index);
        let result = bridge.parse_navigation_command(text).and_then(|intent| {
            let Some(intent) = intent else {
                return Ok((
                    RoomResponse {
                        text: "Sorry, I didn't understand that.".to_string(),
                        room: None,
                    },
                    None,
                ));
            };
            let reply = bridge.generate_navigation_response(&intent, self.pose.as_ref())?;
            Ok(match intent {
                NavigationIntent::GoToRoom { room } => (
                    RoomResponse {
                        text: reply,
                        room: Some(room.name.clone()),
                    },
                    Some(room.name),
                ),
                NavigationIntent::WhereAmI => {
                    let here = match self.pose {
                        Some(p) if p.tracking_state == TrackingState::Ok => {
                            index.get_room_at_position(p.x, p.y)?.map(|r| r.name)
                        }
                        _ => None,
                    };
                    (RoomResponse { text: reply, room: here }, None)
                }
                _ => (RoomResponse { text: reply, room: None }, None),
            })
        });

        result.unwrap_or_else(|e| {
            warn!(error = %e, "room query failed");
            (
                RoomResponse {
                    text: "Sorry, I can't reach my room map right now.".to_string(),
                    room: None,
                },
                None,
            )
        })
    }

    /// Subscribe now and serve queries on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        let queries = self.bus.subscribe_to(Topic::RoomQuery);
        let poses = self.bus.subscribe_to(Topic::SlamPose);
        tokio::spawn(self.run(queries, poses))
    }

    pub async fn run(mut self, mut queries: TopicReceiver, mut poses: TopicReceiver) {
        info!("location service running");
        loop {
            let msg = tokio::select! {
                biased;
                msg = poses.recv() => msg,
                msg = queries.recv() => msg,
            };
            match msg {
                Ok(event) => match event.payload {
                    EventPayload::Pose(pose) => self.handle_pose(pose),
                    EventPayload::RoomQuery { text } => {
                        self.handle_query(&text).await;
                    }
                    other => debug!(?other, "location service ignoring payload"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "location service lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("location service stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wayfinder_memory::NewRoom;
    use wayfinder_perception::{Bounds, Point3};

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Bounds {
        Bounds::new(Point3::new(x0, y0, 0.0), Point3::new(x1, y1, 2.5))
    }

    fn house() -> RoomIndex {
        let index = RoomIndex::open_in_memory().unwrap();
        let kitchen = index
            .add_room(
                &NewRoom::named("room_1").with_label("Kitchen").with_bounds(rect(0.0, 0.0, 4.0, 4.0)),
                &[],
            )
            .unwrap();
        let living = index
            .add_room(
                &NewRoom::named("room_2")
                    .with_label("Living Room")
                    .with_bounds(rect(4.0, 0.0, 10.0, 5.0)),
                &[],
            )
            .unwrap();
        index
            .add_room(&NewRoom::named("hall").with_bounds(rect(-3.0, 0.0, 0.0, 2.0)), &[])
            .unwrap();
        index.add_room_connection(kitchen, living, "doorway").unwrap();
        index
    }

    fn goto_name(intent: Option<NavigationIntent>) -> String {
        match intent {
            Some(NavigationIntent::GoToRoom { room }) => room.name,
            other => panic!("expected GoToRoom, got {other:?}"),
        }
    }

    #[test]
    fn lookup_exact_then_fuzzy() {
        let index = house();
        let bridge = LocationBridge::new(&index);
        assert_eq!(bridge.get_room_by_name("hall").unwrap().unwrap().name, "hall");
        assert_eq!(bridge.get_room_by_name("KITCHEN").unwrap().unwrap().name, "room_1");
        assert_eq!(bridge.get_room_by_name("living").unwrap().unwrap().name, "room_2");
        // First hit in id order.
        assert_eq!(bridge.get_room_by_name("room").unwrap().unwrap().name, "room_1");
        assert!(bridge.get_room_by_name("garage").unwrap().is_none());
        assert!(bridge.get_room_by_name("  ").unwrap().is_none());
    }

    #[test]
    fn navigation_phrases_resolve_rooms() {
        let index = house();
        let bridge = LocationBridge::new(&index);
        let parse = |t: &str| bridge.parse_navigation_command(t).unwrap();
        assert_eq!(goto_name(parse("Take me to the kitchen")), "room_1");
        assert_eq!(goto_name(parse("please go to living room.")), "room_2");
        assert_eq!(goto_name(parse("navigate   to HALL!")), "hall");
        assert_eq!(
            parse("drive to the garage"),
            Some(NavigationIntent::UnknownRoom {
                query: "garage".to_string()
            })
        );
    }

    #[test]
    fn queries_and_noise_are_classified() {
        let index = house();
        let bridge = LocationBridge::new(&index);
        let parse = |t: &str| bridge.parse_navigation_command(t).unwrap();
        assert_eq!(parse("Where am I?"), Some(NavigationIntent::WhereAmI));
        assert_eq!(parse("which room am i in"), Some(NavigationIntent::WhereAmI));
        assert_eq!(parse("What rooms do you know?"), Some(NavigationIntent::ListRooms));
        assert_eq!(parse("hello there"), None);
        assert_eq!(parse("go tokyo"), None);
        assert_eq!(parse("go to the"), None);
    }

    #[test]
    fn responses_use_fixed_templates() {
        let index = house();
        let bridge = LocationBridge::new(&index);
        let kitchen = index.get_room_by_name("room_1").unwrap().unwrap();
        assert_eq!(
            bridge
                .generate_navigation_response(&NavigationIntent::GoToRoom { room: kitchen }, None)
                .unwrap(),
            "Okay, heading to Kitchen."
        );
        assert_eq!(
            bridge
                .generate_navigation_response(&NavigationIntent::ListRooms, None)
                .unwrap(),
            "I know 3 rooms: Kitchen, Living Room, hall."
        );
        assert_eq!(
            bridge
                .generate_navigation_response(
                    &NavigationIntent::UnknownRoom {
                        query: "attic".to_string()
                    },
                    None
                )
                .unwrap(),
            "Sorry, I don't know a room called \"attic\"."
        );
    }

    #[test]
    fn location_context_describes_pose() {
        let index = house();
        let bridge = LocationBridge::new(&index);
        assert_eq!(
            bridge.get_location_context(None).unwrap(),
            "I don't know where I am yet."
        );
        assert_eq!(
            bridge.get_location_context(Some(&Pose::new(1.0, 2.0, 0.0))).unwrap(),
            "We're in Kitchen, at (1.0, 2.0). From here you can reach Living Room."
        );
        assert_eq!(
            bridge.get_location_context(Some(&Pose::new(-1.0, 1.0, 0.0))).unwrap(),
            "We're in hall, at (-1.0, 1.0)."
        );
        assert_eq!(
            bridge.get_location_context(Some(&Pose::new(20.0, 20.0, 0.0))).unwrap(),
            "We're at (20.0, 20.0), outside any known room."
        );
        let mut lost = Pose::new(1.0, 1.0, 0.0);
        lost.tracking_state = TrackingState::Lost;
        assert_eq!(
            bridge.get_location_context(Some(&lost)).unwrap(),
            "I've lost track of where I am."
        );
    }

    #[tokio::test]
    async fn service_forwards_navigation_intents() {
        let bus = EventBus::default();
        let mut responses = bus.subscribe_to(Topic::RoomResponse);
        let mut requests = bus.subscribe_to(Topic::NavigateToRoom);
        let mut service = LocationService::new(bus.clone(), crate::share(house()));

        let reply = service.handle_query("take me to the living room").await;
        assert_eq!(reply.room.as_deref(), Some("room_2"));
        assert!(matches!(
            responses.try_recv().unwrap().payload,
            EventPayload::RoomResponse(RoomResponse { room: Some(ref r), .. }) if r == "room_2"
        ));
        assert!(matches!(
            requests.try_recv().unwrap().payload,
            EventPayload::NavigateToRoom { ref room } if room == "room_2"
        ));

        let reply = service.handle_query("where am i").await;
        assert_eq!(reply.text, "I don't know where I am yet.");
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn lost_pose_reports_no_room() {
        let bus = EventBus::default();
        let mut service = LocationService::new(bus, crate::share(house()));

        let mut lost = Pose::new(5.0, 1.0, 0.0);
        lost.tracking_state = TrackingState::Lost;
        service.handle_pose(lost);
        let reply = service.handle_query("where am i").await;
        assert_eq!(reply.text, "I've lost track of where I am.");
        assert_eq!(reply.room, None);

        service.handle_pose(Pose::new(5.0, 1.0, 0.0));
        let reply = service.handle_query("where am i").await;
        assert_eq!(reply.room.as_deref(), Some("room_2"));
    }

    #[tokio::test]
    async fn service_answers_over_the_bus() {
        let bus = EventBus::default();
        let mut responses = bus.subscribe_to(Topic::RoomResponse);
        let handle = LocationService::new(bus.clone(), crate::share(house())).spawn();

        bus.publish_payload(Topic::SlamPose, "test", EventPayload::Pose(Pose::new(5.0, 1.0, 0.0)))
            .unwrap();
        bus.publish_payload(
            Topic::RoomQuery,
            "test",
            EventPayload::RoomQuery {
                text: "what room am I in?".to_string(),
            },
        )
        .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), responses.recv())
            .await
            .expect("no response")
            .unwrap();
        match event.payload {
            EventPayload::RoomResponse(r) => {
                assert_eq!(r.room.as_deref(), Some("room_2"));
                assert!(r.text.starts_with("We're in Living Room"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        handle.abort();
    }
}
