//! # pulse-core
//!
//! Domain layer containing live-event types, value objects, and read-model entities.
//! This crate has zero dependencies on infrastructure (sockets, HTTP, etc.).

pub mod entities;
pub mod error;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{ActiveAlert, FeedItem};
pub use error::DomainError;
pub use events::{AlertBody, AlertPatch, FeedbackBody, LiveEvent, LivePayload, Origin};
pub use value_objects::{AlertStatus, ChannelKind, EventId, Sentiment, SourceId, SourceIdParseError};
