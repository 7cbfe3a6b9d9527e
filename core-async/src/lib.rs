//! Runtime facade for the recitation core.
//!
//! Core crates depend on this crate instead of naming Tokio directly. It
//! re-exports the handful of primitives the playback pipeline relies on:
//!
//! - `task`: spawning background work such as media-event watchers
//! - `time`: `sleep` and `timeout`, which bound every check and load
//! - `sync`: channels and async locks
//! - `CancellationToken`: the cancellation half of a play request
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{timeout, Duration};
//!
//! async fn bounded() -> bool {
//!     timeout(Duration::from_millis(50), async { 42 }).await.is_ok()
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
pub use tokio::select;
pub use tokio_util::sync::CancellationToken;
