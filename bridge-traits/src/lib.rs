//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host must implement.
//!
//! ## Overview
//!
//! This crate is the contract between the recitation core and the platform it
//! runs on. The core needs three capabilities it cannot provide itself:
//!
//! - [`HttpClient`](http::HttpClient) - content API calls and CDN existence checks
//! - [`AudioOutput`](playback::AudioOutput) - a media element that can open,
//!   play, pause, stop and release audio, and report `ended`/`error`
//! - [`LoggerSink`](logging::LoggerSink) - forwarding structured logs to the host
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Provides |
//! |----------|---------------------|----------|
//! | Desktop  | `bridge-desktop`    | `HttpClient` |
//! | Web      | host application    | `HttpClient`, `AudioOutput` |
//!
//! `AudioOutput` has no default; the host always injects one.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it with enough context (URL, status)
//! for logs to be useful.

pub mod error;
pub mod http;
pub mod logging;
pub mod playback;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use playback::{
    AudioOutput, AudioSource, MediaEvent, MediaEventReceiver, MediaEventSender, MediaHandle,
    MediaSupport, OpenedMedia, Preload,
};
