//! Live events - the unit of real-time data

mod live_event;

pub use live_event::{AlertBody, AlertPatch, FeedbackBody, LiveEvent, LivePayload, Origin};
