//! Wire protocol
//!
//! JSON messages exchanged over the live channel. Outbound control messages are
//! `ClientMessage`; inbound broadcasts, acks, and liveness signals are
//! `ServerMessage`. Both are tagged by a kebab-case `type` field.

mod client_message;
mod server_message;

pub use client_message::{ClientMessage, SubmitFeedback, UpdateAlert};
pub use server_message::{AlertUpdated, NewAlert, NewFeedback, ServerMessage};
