//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Each [`Topic`] maps to one wire topic name of the messaging layer:
//!
//! | Topic | Wire name | Direction (navigation stack) |
//! |---|---|---|
//! | [`Topic::SlamPose`] | `slam_pose` | in |
//! | [`Topic::NavigateToRoom`] | `navigate_to_room` | in |
//! | [`Topic::CancelNavigation`] | `slam_cancel_navigation` | in |
//! | [`Topic::WaypointReached`] | `waypoint_reached` | in |
//! | [`Topic::RoomQuery`] | `slam_room_query` | in |
//! | [`Topic::RobotAction`] | `robot_action` | out |
//! | [`Topic::NavigationFailed`] | `navigation_failed` | out |
//! | [`Topic::NavigationComplete`] | `navigation_complete` | out |
//! | [`Topic::RoomResponse`] | `slam_room_response` | out |

use wayfinder_types::{Event, EventPayload, WayfinderError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    SlamPose,
    NavigateToRoom,
    CancelNavigation,
    WaypointReached,
    RoomQuery,
    RobotAction,
    NavigationFailed,
    NavigationComplete,
    RoomResponse,
}

impl Topic {
    /// Every topic, in lane order.
    pub const ALL: [Topic; 9] = [
        Topic::SlamPose,
        Topic::NavigateToRoom,
        Topic::CancelNavigation,
        Topic::WaypointReached,
        Topic::RoomQuery,
        Topic::RobotAction,
        Topic::NavigationFailed,
        Topic::NavigationComplete,
        Topic::RoomResponse,
    ];

    /// The exact wire name used by the external messaging layer.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::SlamPose => "slam_pose",
            Topic::NavigateToRoom => "navigate_to_room",
            Topic::CancelNavigation => "slam_cancel_navigation",
            Topic::WaypointReached => "waypoint_reached",
            Topic::RoomQuery => "slam_room_query",
            Topic::RobotAction => "robot_action",
            Topic::NavigationFailed => "navigation_failed",
            Topic::NavigationComplete => "navigation_complete",
            Topic::RoomResponse => "slam_room_response",
        }
    }

    /// Look up a topic by its wire name.
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }

    fn lane(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    lanes: [broadcast::Sender<Event>; Topic::ALL.len()],
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: std::array::from_fn(|_| broadcast::channel(capacity).0),
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`WayfinderError::Channel`] when nobody is listening on the topic.
    /// Publishers that treat delivery as best-effort simply ignore the error.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, WayfinderError> {
        trace!(topic = %topic, source = %event.source, "publish");
        self.lanes[topic.lane()]
            .send(event)
            .map_err(|_| WayfinderError::Channel(format!("No subscribers for topic {topic}")))
    }

    /// Wrap `payload` in a fresh [`Event`] and publish it to `topic`.
    pub fn publish_payload(
        &self,
        topic: Topic,
        source: &str,
        payload: EventPayload,
    ) -> Result<usize, WayfinderError> {
        self.publish_to(topic, Event::new(source, payload))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.lanes[topic.lane()].subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lanes[topic.lane()].receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for an already buffered event.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_types::Pose;

    fn pose_event(source: &str) -> Event {
        Event::new(source, EventPayload::Pose(Pose::new(1.0, 2.0, 0.0)))
    }

    #[test]
    fn topic_names_match_wire_names() {
        assert_eq!(Topic::SlamPose.name(), "slam_pose");
        assert_eq!(Topic::CancelNavigation.name(), "slam_cancel_navigation");
        assert_eq!(Topic::RoomResponse.name(), "slam_room_response");
        for topic in Topic::ALL {
            assert_eq!(Topic::from_name(topic.name()), Some(topic));
        }
        assert_eq!(Topic::from_name("cmd_vel"), None);
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::RobotAction, pose_event("test"));
        assert!(matches!(result, Err(WayfinderError::Channel(_))));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut first = bus.subscribe_to(Topic::SlamPose);
        let mut second = bus.subscribe_to(Topic::SlamPose);

        let event = pose_event("tracker");
        assert_eq!(bus.publish_to(Topic::SlamPose, event.clone())?, 2);

        assert_eq!(first.recv().await?.id, event.id);
        assert_eq!(second.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut failures = bus.subscribe_to(Topic::NavigationFailed);
        let _actions = bus.subscribe_to(Topic::RobotAction);

        bus.publish_to(Topic::RobotAction, pose_event("navigator"))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), failures.recv()).await;
        assert!(result.is_err(), "navigation_failed must not see robot_action traffic");
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_reports_lag() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::SlamPose);
        for _ in 0..1_000 {
            let _ = bus.publish_to(Topic::SlamPose, pose_event("flood"));
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::RoomQuery), 0);
        let rx = bus.subscribe_to(Topic::RoomQuery);
        assert_eq!(rx.topic(), Topic::RoomQuery);
        assert_eq!(bus.subscriber_count(Topic::RoomQuery), 1);
    }
}
