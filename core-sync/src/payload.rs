//! Typed message payloads
//!
//! Required fields are part of the type, so a message missing one fails to
//! deserialize. Fields this crate does not use are kept in `extra`.

use crate::error::{Result, SyncError};
use core_library::models::ExternalId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Image announced by the shop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub id: ExternalId,
    /// Path below `<base_url>/media/image/`
    pub path: String,
    /// Locale the image metadata is recorded under
    pub locale: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ImagePayload {
    pub fn new(id: i64, path: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            id: ExternalId(id),
            path: path.into(),
            locale: locale.into(),
            extra: Map::new(),
        }
    }

    /// Last segment of the path, used as the stored file name
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("image")
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(SyncError::InvalidPayload(format!(
                "Image {} has an empty path",
                self.id
            )));
        }

        if self.path.split('/').any(|segment| segment == "..") {
            return Err(SyncError::InvalidPayload(format!(
                "Image {} path must not leave the media directory: {}",
                self.id, self.path
            )));
        }

        if self.locale.trim().is_empty() {
            return Err(SyncError::InvalidPayload(format!(
                "Image {} has an empty locale",
                self.id
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonTranslationPayload {
    pub locale: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A taxon and, recursively, its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonPayload {
    pub id: ExternalId,
    pub code: String,
    #[serde(default)]
    pub translations: Vec<TaxonTranslationPayload>,
    #[serde(default)]
    pub children: Vec<TaxonPayload>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaxonPayload {
    pub fn new(id: i64, code: impl Into<String>) -> Self {
        Self {
            id: ExternalId(id),
            code: code.into(),
            translations: Vec::new(),
            children: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_translation(mut self, locale: &str, name: &str) -> Self {
        self.translations.push(TaxonTranslationPayload {
            locale: locale.to_string(),
            name: name.to_string(),
            description: None,
            extra: Map::new(),
        });
        self
    }

    pub fn with_child(mut self, child: TaxonPayload) -> Self {
        self.children.push(child);
        self
    }

    /// Validate the whole tree
    pub fn validate(&self) -> Result<()> {
        let mut stack = vec![self];
        while let Some(taxon) = stack.pop() {
            if taxon.code.trim().is_empty() {
                return Err(SyncError::InvalidPayload(format!(
                    "Taxon {} has an empty code",
                    taxon.id
                )));
            }

            for translation in &taxon.translations {
                if translation.locale.trim().is_empty() || translation.name.trim().is_empty() {
                    return Err(SyncError::InvalidPayload(format!(
                        "Taxon {} has a translation without locale or name",
                        taxon.id
                    )));
                }
            }

            stack.extend(taxon.children.iter());
        }

        Ok(())
    }
}
