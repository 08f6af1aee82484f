//! Workspace umbrella crate.
//!
//! Re-exports the service façade behind the `desktop-shims` feature so host
//! applications can depend on `catalog-sync-workspace` without wiring each
//! crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CatalogSyncService, CoreError};
