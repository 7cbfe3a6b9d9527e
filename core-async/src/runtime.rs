//! Runtime entry points.
//!
//! `block_on` drives a future to completion on a fresh current-thread runtime.
//! The `#[core_async::test]` and `#[core_async::main]` macros expand to it.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Run `future` to completion on a new current-thread runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be constructed, which only happens when the
/// process has exhausted OS resources.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Returns `true` when called from inside a running runtime.
pub fn in_runtime() -> bool {
    Handle::try_current().is_ok()
}
