//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the catalog synchronizer:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the library and sync crates
//! depend on. It establishes the logging conventions, the configuration
//! surface and the event broadcasting used throughout the system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
