//! Test doubles for pipelines and retry policies.
//!
//! This module provides:
//! - ScriptedHttpClient, a transport that replays queued outcomes
//! - RecordingPolicy, a policy that logs when requests pass through it

mod mocks;

pub use mocks::{RecordingPolicy, ScriptedHttpClient, SharedLog};
