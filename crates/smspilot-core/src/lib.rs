//! SMSPilot Core - frontend-independent logic
//!
//! Classifies inbound SMS commands, drives the editor through a fallback
//! chain of channels and turns the outcome into one reply. Shared by the
//! webhook server and the MCP tool server.

pub mod ai;
pub mod channel;
pub mod classifier;
pub mod command;
pub mod config;
pub mod context;
pub mod db;
pub mod dispatch;
pub mod formatter;
pub mod pipeline;
pub mod protocol;
pub mod redact;
pub mod sms;
pub mod tools;

pub use command::{Command, Intent, IntentKind};
pub use pipeline::{Pipeline, PipelineOutcome};
