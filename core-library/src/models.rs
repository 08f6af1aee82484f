//! Domain models for the content library
//!
//! Rows are plain structs mapped with `sqlx::FromRow`. Locally owned entities
//! use UUID string ids so that staged entities can reference each other
//! before the unit of work is committed.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Seeded media type that synchronized images are filed under
pub const IMAGE_MEDIA_TYPE_ID: i64 = 2;

/// Media types seeded on installation, `(id, name, description)`
pub const SEEDED_MEDIA_TYPES: &[(i64, &str, &str)] = &[
    (1, "document", "Default document type"),
    (IMAGE_MEDIA_TYPE_ID, "image", "Default image type"),
    (3, "video", "Default video type"),
    (4, "audio", "Default audio type"),
];

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// ID Types
// =============================================================================

/// Identifier assigned by the shop
///
/// Stable across synchronizations; the correlation key of every bridge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ExternalId(pub i64);

impl ExternalId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for ExternalId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Reference Data
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MediaType {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Media collection; system collections are addressed by key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub id: String,
    pub collection_key: Option<String>,
    pub title: String,
    pub is_system: bool,
    pub created_at: i64,
}

impl Collection {
    pub fn system(key: impl Into<String>, title: impl Into<String>, now: i64) -> Self {
        Self {
            id: new_id(),
            collection_key: Some(key.into()),
            title: title.into(),
            is_system: true,
            created_at: now,
        }
    }
}

// =============================================================================
// Media
// =============================================================================

/// A media entity (the versioned resource)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub id: String,
    pub media_type_id: Option<i64>,
    pub collection_id: Option<String>,
    pub created_at: i64,
    pub changed_at: i64,
}

impl Media {
    pub fn new(now: i64) -> Self {
        Self {
            id: new_id(),
            media_type_id: None,
            collection_id: None,
            created_at: now,
            changed_at: now,
        }
    }
}

/// The single file of a media; `version` points at the latest file version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct File {
    pub id: String,
    pub media_id: String,
    pub version: i64,
    pub created_at: i64,
    pub changed_at: i64,
}

impl File {
    pub fn new(media_id: impl Into<String>, now: i64) -> Self {
        Self {
            id: new_id(),
            media_id: media_id.into(),
            version: 0,
            created_at: now,
            changed_at: now,
        }
    }
}

/// Immutable snapshot of a file's binary state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileVersion {
    pub id: String,
    pub file_id: String,
    /// 1-based, contiguous per file
    pub version: i64,
    pub name: String,
    /// Size in bytes
    pub size: i64,
    pub mime_type: String,
    /// Opaque reference returned by the content storage
    ///
    /// `None` while the version is staged and its upload is still pending.
    pub storage_options: Option<String>,
    pub created_at: i64,
}

impl FileVersion {
    pub fn new(
        file_id: impl Into<String>,
        version: i64,
        name: impl Into<String>,
        size: i64,
        mime_type: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: new_id(),
            file_id: file_id.into(),
            version,
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            storage_options: None,
            created_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.version < 1 {
            return Err(format!("File version must start at 1, got {}", self.version));
        }

        if self.name.trim().is_empty() {
            return Err("File version name cannot be empty".to_string());
        }

        if self.size < 0 {
            return Err("File version size cannot be negative".to_string());
        }

        if self.mime_type.trim().is_empty() {
            return Err("File version MIME type cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Localized metadata of a file version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileVersionMeta {
    pub id: String,
    pub file_version_id: String,
    pub locale: String,
    pub title: String,
    pub description: Option<String>,
    pub is_default: bool,
}

impl FileVersionMeta {
    pub fn new(
        file_version_id: impl Into<String>,
        locale: impl Into<String>,
        title: impl Into<String>,
        is_default: bool,
    ) -> Self {
        Self {
            id: new_id(),
            file_version_id: file_version_id.into(),
            locale: locale.into(),
            title: title.into(),
            description: None,
            is_default,
        }
    }
}

/// Maps an external image id to the media that mirrors it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ImageMediaBridge {
    pub id: ExternalId,
    pub media_id: String,
}

/// A media with everything it owns, loaded in one piece
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAggregate {
    pub media: Media,
    pub file: Option<File>,
    /// Ordered by version number
    pub versions: Vec<FileVersion>,
    pub metas: Vec<FileVersionMeta>,
}

impl MediaAggregate {
    pub fn new(media: Media) -> Self {
        Self {
            media,
            file: None,
            versions: Vec::new(),
            metas: Vec::new(),
        }
    }

    pub fn latest_version(&self) -> Option<&FileVersion> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    pub fn next_version_number(&self) -> i64 {
        self.latest_version().map_or(1, |v| v.version + 1)
    }

    pub fn metas_for<'a, 'b>(
        &'a self,
        file_version_id: &'b str,
    ) -> impl Iterator<Item = &'a FileVersionMeta> + 'b
    where
        'a: 'b,
    {
        self.metas
            .iter()
            .filter(move |m| m.file_version_id == file_version_id)
    }

    pub fn meta_for_locale(&self, file_version_id: &str, locale: &str) -> Option<&FileVersionMeta> {
        self.metas_for(file_version_id).find(|m| m.locale == locale)
    }

    pub fn default_meta(&self, file_version_id: &str) -> Option<&FileVersionMeta> {
        self.metas_for(file_version_id).find(|m| m.is_default)
    }

    pub(crate) fn push_version(&mut self, version: FileVersion) {
        self.versions.retain(|v| v.id != version.id);
        self.versions.push(version);
        self.versions.sort_by_key(|v| v.version);
    }

    pub(crate) fn push_meta(&mut self, meta: FileVersionMeta) {
        self.metas
            .retain(|m| !(m.file_version_id == meta.file_version_id && m.locale == meta.locale));
        self.metas.push(meta);
    }
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: String,
    pub category_key: Option<String>,
    pub parent_id: Option<String>,
    pub default_locale: Option<String>,
    pub created_at: i64,
    pub changed_at: i64,
}

impl Category {
    pub fn new(now: i64) -> Self {
        Self {
            id: new_id(),
            category_key: None,
            parent_id: None,
            default_locale: None,
            created_at: now,
            changed_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CategoryTranslation {
    pub category_id: String,
    pub locale: String,
    pub name: String,
    pub description: Option<String>,
}

impl CategoryTranslation {
    pub fn validate(&self) -> Result<(), String> {
        if self.locale.trim().is_empty() {
            return Err("Category translation locale cannot be empty".to_string());
        }

        if self.name.trim().is_empty() {
            return Err(format!(
                "Category translation name for locale '{}' cannot be empty",
                self.locale
            ));
        }

        Ok(())
    }
}

/// A category with all its translations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryAggregate {
    pub category: Category,
    pub translations: Vec<CategoryTranslation>,
}

impl CategoryAggregate {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            translations: Vec::new(),
        }
    }

    pub fn translation(&self, locale: &str) -> Option<&CategoryTranslation> {
        self.translations.iter().find(|t| t.locale == locale)
    }

    pub(crate) fn put_translation(&mut self, translation: CategoryTranslation) {
        self.translations.retain(|t| t.locale != translation.locale);
        self.translations.push(translation);
    }
}

/// Maps an external taxon id to the category that mirrors it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TaxonCategoryBridge {
    pub id: ExternalId,
    pub category_id: String,
}

// =============================================================================
// Dimension-scoped Content
// =============================================================================

/// Publication stage of a dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Draft,
    Live,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Draft => f.write_str("draft"),
            Stage::Live => f.write_str("live"),
        }
    }
}

/// Attributes identifying a dimension; no locale means "all locales"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DimensionAttributes {
    pub locale: Option<String>,
    pub stage: Stage,
}

impl DimensionAttributes {
    pub fn new(locale: Option<&str>, stage: Stage) -> Self {
        Self {
            locale: locale.map(str::to_string),
            stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Dimension {
    pub id: String,
    pub locale: Option<String>,
    pub stage: Stage,
}

impl Dimension {
    pub fn new(attributes: &DimensionAttributes) -> Self {
        Self {
            id: new_id(),
            locale: attributes.locale.clone(),
            stage: attributes.stage,
        }
    }

    pub fn attributes(&self) -> DimensionAttributes {
        DimensionAttributes {
            locale: self.locale.clone(),
            stage: self.stage,
        }
    }
}

/// Content of a resource within one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Content {
    pub id: String,
    pub resource_key: String,
    pub resource_id: String,
    pub dimension_id: String,
    pub content_type: Option<String>,
    /// JSON document
    pub data: String,
    pub created_at: i64,
    pub changed_at: i64,
}

impl Content {
    pub fn new(
        resource_key: impl Into<String>,
        resource_id: impl Into<String>,
        dimension_id: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: new_id(),
            resource_key: resource_key.into(),
            resource_id: resource_id.into(),
            dimension_id: dimension_id.into(),
            content_type: None,
            data: "{}".to_string(),
            created_at: now,
            changed_at: now,
        }
    }

    pub fn data_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.data)
    }

    pub fn set_data(&mut self, value: &serde_json::Value) {
        self.data = value.to_string();
    }
}
