//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - Repositories used during synchronization read through a [`UnitOfWork`]
//!   so staged entities are visible before commit; writes are staged on it
//!   rather than executed directly
//!
//! ## Available Repositories
//!
//! - `ImageMediaBridgeRepository` - External image id to media
//! - `TaxonCategoryBridgeRepository` - External taxon id to category
//! - `MediaRepository` - Media with file, versions and metadata
//! - `CategoryRepository` - Categories with translations
//! - `MediaTypeRepository`, `CollectionRepository`, `SystemCollectionManager` -
//!   Seeded reference data
//! - `DimensionRepository`, `ContentRepository` - Dimension-scoped content
//!
//! [`UnitOfWork`]: crate::unit_of_work::UnitOfWork

pub mod bridge;
pub mod category;
pub mod content;
pub mod lookup;
pub mod media;

pub use bridge::{
    ImageMediaBridgeRepository, SqliteImageMediaBridgeRepository,
    SqliteTaxonCategoryBridgeRepository, TaxonCategoryBridgeRepository,
};
pub use category::{CategoryRepository, SqliteCategoryRepository};
pub use content::{
    ContentRepository, DimensionRepository, SqliteContentRepository, SqliteDimensionRepository,
};
pub use lookup::{
    CollectionRepository, MediaTypeRepository, SqliteCollectionRepository,
    SqliteMediaTypeRepository, SqliteSystemCollectionManager, SystemCollectionManager,
};
pub use media::{MediaRepository, SqliteMediaRepository};
