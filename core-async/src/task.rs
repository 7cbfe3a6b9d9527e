//! Task spawning.
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let handle = task::spawn(async { 42 });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

pub use tokio::task::{yield_now, AbortHandle, JoinError, JoinHandle};

/// Spawn a future onto the current runtime.
///
/// The returned handle can be awaited for the output or used to abort the
/// task. Dropping the handle detaches the task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Spawn `future` if a runtime is available, otherwise drop it.
///
/// Used from `Drop` implementations that need to fire off async cleanup and
/// may run after the runtime has shut down.
pub fn spawn_detached<F>(future: F) -> bool
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
            true
        }
        Err(_) => false,
    }
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
