//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `ContentStorage` using `tokio::fs` below a segmented directory tree
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalContentStorage, ReqwestHttpClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::with_timeout(Duration::from_secs(30))?;
//!     let storage = LocalContentStorage::with_root("/var/lib/catalog-sync/media");
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod http;
mod storage;

pub use http::ReqwestHttpClient;
pub use storage::LocalContentStorage;
