//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the recitation core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one. It fixes the logging
//! conventions, the shape of [`config::CoreConfig`] and the typed events
//! that flow between the playback engine, the sequencer and the host UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
