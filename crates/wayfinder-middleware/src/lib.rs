//! `wayfinder-middleware` – the messaging boundary.
//!
//! Routes events between the SLAM tracker, the navigation services and the
//! motion layer without caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – headless, topic-based publish/subscribe event bus built on
//!   Tokio broadcast channels, with one lane per wire topic.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
