//! Workspace placeholder crate.
//!
//! Exposes the feature flags that map onto the individual workspace crates so a
//! host application can depend on `tilawah-workspace` alone and get the
//! recitation service with desktop bridges wired in.

#[cfg(feature = "desktop-shims")]
pub use core_service::{RecitationService, ServiceBuilder};
