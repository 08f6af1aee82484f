//! # Host Bridge Traits
//!
//! Abstraction traits for the external collaborators of the catalog
//! synchronizer.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and the concrete
//! infrastructure it runs on. Each trait represents a capability the core
//! requires but does not implement itself: the HTTP transport used to reach the
//! shop, the content store that keeps media binaries, and the clock.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Streamed downloads from the shop
//! - [`ContentStorage`](storage::ContentStorage) - Persist downloaded media binaries
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! | Host     | Implementation Crate |
//! |----------|----------------------|
//! | Desktop  | `bridge-desktop`     |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert backend-specific errors into it and keep the
//! context (URL, path) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single instance can be shared
//! by every worker of the message consumer.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{DownloadResponse, HttpClient, HttpRequest};
pub use storage::{ContentStorage, StorageOptions};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
