//! # Catalog Synchronization Module
//!
//! Mirrors entities of the shop into the content library.
//!
//! ## Overview
//!
//! The shop announces changes as messages. This module:
//! - Decodes message envelopes into typed payloads
//! - Downloads images and appends file versions when their size changed
//! - Mirrors taxon trees into categories with translations
//! - Commits each message (or batch) atomically through a unit of work
//! - Reports results on the event bus
//!
//! ## Components
//!
//! - **Messages** (`messages`, `payload`): Envelopes per message kind with typed payloads
//! - **Image Media Adapter** (`image_media`): Remote image to versioned media
//! - **Taxon Category Adapter** (`taxon_category`): Taxon tree to category tree
//! - **Message Consumer** (`consumer`): Locking, dispatch, commit and events
//! - **Keyed Lock** (`keyed_lock`): Serializes work per external entity

pub mod consumer;
pub mod error;
pub mod image_media;
pub mod keyed_lock;
pub mod messages;
pub mod payload;
pub mod taxon_category;

pub use consumer::{ConsumerStats, MessageConsumer, SyncOutcome};
pub use error::{Result, SyncError};
pub use image_media::{
    ImageAdapter, ImageAdapterSettings, ImageMediaAdapter, ImageRepositories, ImageSyncResult,
};
pub use keyed_lock::{KeyedGuard, KeyedLock};
pub use messages::{
    EntityKind, RemoveImageMessage, RemoveTaxonMessage, SyncMessage, SynchronizeImageMessage,
    SynchronizeTaxonMessage,
};
pub use payload::{ImagePayload, TaxonPayload, TaxonTranslationPayload};
pub use taxon_category::{TaxonAdapter, TaxonCategoryAdapter, TaxonSyncResult};
