//! Value objects - small immutable domain types

mod alert_status;
mod channel_kind;
mod event_id;
mod sentiment;
mod source_id;

pub use alert_status::AlertStatus;
pub use channel_kind::ChannelKind;
pub use event_id::EventId;
pub use sentiment::Sentiment;
pub use source_id::{SourceId, SourceIdParseError};
