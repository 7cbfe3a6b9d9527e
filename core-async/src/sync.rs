//! Synchronization primitives.
//!
//! Async-aware channels and locks from `tokio::sync`. Short critical sections
//! that never span an `.await` should use `parking_lot` instead.

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
