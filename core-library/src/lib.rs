//! # Content Library
//!
//! Owns the content database and the repositories the synchronizers write
//! through.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema, migrations and seeded reference data
//! - Media with a single file and an append-only list of file versions
//! - Categories with per-locale translations
//! - Bridges from shop ids to the local entities that mirror them
//! - Dimension-scoped content records
//! - The [`UnitOfWork`] that stages writes and commits them atomically

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod unit_of_work;

pub use error::{LibraryError, Result};
pub use unit_of_work::{Checkpoint, CommitSummary, PendingUpload, PendingWrite, UnitOfWork};
