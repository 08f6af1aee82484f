//! # Message Envelopes
//!
//! Inbound units of work, independent of the transport that delivers them.
//! Each kind is its own immutable type; [`SyncMessage`] is the tagged union
//! the consumer receives.
//!
//! ```json
//! {"type": "synchronize_taxon", "id": 7, "payload": {...}, "ignoreChildren": true}
//! ```

use crate::error::{Result, SyncError};
use crate::payload::{ImagePayload, TaxonPayload};
use core_library::models::ExternalId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Entity family a message addresses; part of the per-id lock key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Image,
    Taxon,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Image => f.write_str("image"),
            EntityKind::Taxon => f.write_str("taxon"),
        }
    }
}

/// Envelope as delivered; the payload may leave out the id it shares with
/// the envelope
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynchronizeEnvelope {
    id: ExternalId,
    payload: Value,
    #[serde(default)]
    ignore_children: bool,
}

impl SynchronizeEnvelope {
    fn payload<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        let mut payload = self.payload.clone();
        if let Value::Object(fields) = &mut payload {
            fields
                .entry("id")
                .or_insert_with(|| Value::from(self.id.value()));
        }
        serde_json::from_value(payload)
    }
}

fn check_payload_id(kind: &str, envelope: ExternalId, payload: ExternalId) -> Result<()> {
    if envelope != payload {
        return Err(SyncError::InvalidPayload(format!(
            "{} message {} carries a payload for id {}",
            kind, envelope, payload
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SynchronizeEnvelope")]
pub struct SynchronizeImageMessage {
    id: ExternalId,
    payload: ImagePayload,
}

impl SynchronizeImageMessage {
    pub fn new(payload: ImagePayload) -> Self {
        Self {
            id: payload.id,
            payload,
        }
    }

    pub fn id(&self) -> ExternalId {
        self.id
    }

    pub fn payload(&self) -> &ImagePayload {
        &self.payload
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveImageMessage {
    id: ExternalId,
}

impl RemoveImageMessage {
    pub fn new(id: ExternalId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> ExternalId {
        self.id
    }
}

impl TryFrom<SynchronizeEnvelope> for SynchronizeImageMessage {
    type Error = serde_json::Error;

    fn try_from(envelope: SynchronizeEnvelope) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: envelope.id,
            payload: envelope.payload()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SynchronizeEnvelope")]
pub struct SynchronizeTaxonMessage {
    id: ExternalId,
    payload: TaxonPayload,
    /// Only the root taxon is synchronized when set
    ignore_children: bool,
}

impl TryFrom<SynchronizeEnvelope> for SynchronizeTaxonMessage {
    type Error = serde_json::Error;

    fn try_from(envelope: SynchronizeEnvelope) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: envelope.id,
            payload: envelope.payload()?,
            ignore_children: envelope.ignore_children,
        })
    }
}

impl SynchronizeTaxonMessage {
    pub fn new(payload: TaxonPayload, ignore_children: bool) -> Self {
        Self {
            id: payload.id,
            payload,
            ignore_children,
        }
    }

    pub fn id(&self) -> ExternalId {
        self.id
    }

    pub fn payload(&self) -> &TaxonPayload {
        &self.payload
    }

    pub fn ignore_children(&self) -> bool {
        self.ignore_children
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveTaxonMessage {
    id: ExternalId,
}

impl RemoveTaxonMessage {
    pub fn new(id: ExternalId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> ExternalId {
        self.id
    }
}

/// Any inbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    SynchronizeImage(SynchronizeImageMessage),
    RemoveImage(RemoveImageMessage),
    SynchronizeTaxon(SynchronizeTaxonMessage),
    RemoveTaxon(RemoveTaxonMessage),
}

impl SyncMessage {
    /// Wire name of the message type
    pub fn kind_name(&self) -> &'static str {
        match self {
            SyncMessage::SynchronizeImage(_) => "synchronize_image",
            SyncMessage::RemoveImage(_) => "remove_image",
            SyncMessage::SynchronizeTaxon(_) => "synchronize_taxon",
            SyncMessage::RemoveTaxon(_) => "remove_taxon",
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            SyncMessage::SynchronizeImage(_) | SyncMessage::RemoveImage(_) => EntityKind::Image,
            SyncMessage::SynchronizeTaxon(_) | SyncMessage::RemoveTaxon(_) => EntityKind::Taxon,
        }
    }

    pub fn id(&self) -> ExternalId {
        match self {
            SyncMessage::SynchronizeImage(m) => m.id(),
            SyncMessage::RemoveImage(m) => m.id(),
            SyncMessage::SynchronizeTaxon(m) => m.id(),
            SyncMessage::RemoveTaxon(m) => m.id(),
        }
    }

    /// Key that serializes work on the same external entity
    pub fn lock_key(&self) -> (EntityKind, ExternalId) {
        (self.entity_kind(), self.id())
    }

    /// Check the payload, and that it addresses the same id as the envelope
    pub fn validate(&self) -> Result<()> {
        match self {
            SyncMessage::SynchronizeImage(m) => {
                check_payload_id(self.kind_name(), m.id(), m.payload().id)?;
                m.payload().validate()
            }
            SyncMessage::SynchronizeTaxon(m) => {
                check_payload_id(self.kind_name(), m.id(), m.payload().id)?;
                m.payload().validate()
            }
            SyncMessage::RemoveImage(_) | SyncMessage::RemoveTaxon(_) => Ok(()),
        }
    }
}

impl From<SynchronizeImageMessage> for SyncMessage {
    fn from(message: SynchronizeImageMessage) -> Self {
        SyncMessage::SynchronizeImage(message)
    }
}

impl From<RemoveImageMessage> for SyncMessage {
    fn from(message: RemoveImageMessage) -> Self {
        SyncMessage::RemoveImage(message)
    }
}

impl From<SynchronizeTaxonMessage> for SyncMessage {
    fn from(message: SynchronizeTaxonMessage) -> Self {
        SyncMessage::SynchronizeTaxon(message)
    }
}

impl From<RemoveTaxonMessage> for SyncMessage {
    fn from(message: RemoveTaxonMessage) -> Self {
        SyncMessage::RemoveTaxon(message)
    }
}
