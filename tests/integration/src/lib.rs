//! Integration test utilities for the sync layer
//!
//! This crate provides an in-process fake transport, a recording REST fake,
//! and fixture builders for end-to-end tests against the sync client.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
