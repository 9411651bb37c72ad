//! Process and socket detection for monitoring-agent setup
//!
//! [`compat`] gives one accessor surface over process introspection
//! libraries that expose either the modern or the legacy API shape.
//! [`detection`] builds the agent-setup helpers on top of it: process and
//! listening-socket searches, service status probing and plugin
//! configuration builders.

pub mod compat;
pub mod config;
pub mod detection;
pub mod error;

pub use compat::{ApiShape, Capabilities, Compat, Process, ProcessApi, ProcessLibrary};
pub use config::DetectionConfig;
pub use detection::{Detector, PluginConfig, Plugins};
pub use error::{Error, Result};
