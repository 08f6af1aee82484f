//! # Message Consumer
//!
//! Dispatches inbound messages to the adapters and commits their units of
//! work.
//!
//! ## Workflow
//!
//! For every message (or batch):
//! 1. Take the per-entity lock(s)
//! 2. Stage through the adapter on a fresh [`UnitOfWork`]
//! 3. Commit: uploads first, then one database transaction
//! 4. Emit events on the [`EventBus`]
//!
//! A failed message leaves nothing behind and is reported with
//! [`SyncEvent::MessageFailed`]; redelivery is left to the bus.

use crate::error::{Result, SyncError};
use crate::image_media::{ImageAdapter, ImageSyncResult};
use crate::keyed_lock::KeyedLock;
use crate::messages::{EntityKind, SyncMessage};
use crate::taxon_category::TaxonAdapter;
use bridge_traits::storage::ContentStorage;
use core_library::models::ExternalId;
use core_library::UnitOfWork;
use core_runtime::events::{CoreEvent, EventBus, MediaEvent, SyncEvent, TaxonEvent};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Result of handling one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// First synchronization; media created with version 1
    Created { media_id: String },
    /// New version appended, or metadata for a new locale added to `version`
    Updated { version: i64 },
    /// Remote resource unchanged
    Unchanged,
    /// Local entity deleted
    Removed,
    /// Removal of an id that was never synchronized
    NotFound,
    /// Taxon tree mirrored
    Categories { touched: usize },
}

/// Totals of a consumer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub handled: u64,
    pub failed: u64,
}

/// Adapter result plus the event announcing it after commit
struct Dispatched {
    outcome: SyncOutcome,
    event: Option<CoreEvent>,
}

pub struct MessageConsumer {
    pool: SqlitePool,
    storage: Arc<dyn ContentStorage>,
    images: Arc<dyn ImageAdapter>,
    taxons: Arc<dyn TaxonAdapter>,
    event_bus: Arc<EventBus>,
    locks: KeyedLock<(EntityKind, ExternalId)>,
    max_concurrent_messages: usize,
}

impl MessageConsumer {
    pub fn new(
        pool: SqlitePool,
        storage: Arc<dyn ContentStorage>,
        images: Arc<dyn ImageAdapter>,
        taxons: Arc<dyn TaxonAdapter>,
        event_bus: Arc<EventBus>,
        max_concurrent_messages: usize,
    ) -> Self {
        Self {
            pool,
            storage,
            images,
            taxons,
            event_bus,
            locks: KeyedLock::new(),
            max_concurrent_messages: max_concurrent_messages.max(1),
        }
    }

    /// Handle one message in its own unit of work
    #[instrument(skip(self, message), fields(kind = message.kind_name(), id = %message.id()))]
    pub async fn handle(&self, message: SyncMessage) -> Result<SyncOutcome> {
        let _guard = self.locks.lock(message.lock_key()).await;
        let mut uow = UnitOfWork::new();

        let dispatched = match self.dispatch(&mut uow, &message).await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                uow.rollback();
                self.report_failure(&message, &e);
                return Err(e);
            }
        };

        if let Err(e) = uow.commit(&self.pool, self.storage.as_ref()).await {
            let e = SyncError::from(e);
            self.report_failure(&message, &e);
            return Err(e);
        }

        self.report_success(&message, dispatched.event);
        Ok(dispatched.outcome)
    }

    /// Handle several messages in one unit of work
    ///
    /// Either every message is committed or none is. Messages are applied in
    /// the given order, so later messages see what earlier ones staged.
    #[instrument(skip(self, messages), fields(messages = messages.len()))]
    pub async fn handle_batch(&self, messages: Vec<SyncMessage>) -> Result<Vec<SyncOutcome>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let _guards = self
            .locks
            .lock_many(messages.iter().map(SyncMessage::lock_key))
            .await;
        let mut uow = UnitOfWork::new();
        let mut dispatched = Vec::with_capacity(messages.len());

        for message in &messages {
            match self.dispatch(&mut uow, message).await {
                Ok(result) => dispatched.push(result),
                Err(e) => {
                    uow.rollback();
                    self.report_failure(message, &e);
                    return Err(e);
                }
            }
        }

        if let Err(e) = uow.commit(&self.pool, self.storage.as_ref()).await {
            let e = SyncError::from(e);
            warn!(error = %e, messages = messages.len(), "Batch commit failed");
            for message in &messages {
                self.report_failure(message, &e);
            }
            return Err(e);
        }

        let mut outcomes = Vec::with_capacity(dispatched.len());
        for (message, result) in messages.iter().zip(dispatched) {
            self.report_success(message, result.event);
            outcomes.push(result.outcome);
        }
        self.emit(CoreEvent::Sync(SyncEvent::BatchCommitted {
            messages: outcomes.len(),
        }));

        Ok(outcomes)
    }

    /// Consume messages until `cancel` fires or the channel closes
    ///
    /// Up to `max_concurrent_messages` messages are in flight at once.
    /// In-flight messages are finished before returning.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<SyncMessage>,
        cancel: CancellationToken,
    ) -> ConsumerStats {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_messages));
        let mut tasks: JoinSet<bool> = JoinSet::new();
        let mut stats = ConsumerStats::default();

        info!(
            max_concurrent_messages = self.max_concurrent_messages,
            "Message consumer started"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let consumer = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                consumer.handle(message).await.is_ok()
            });

            while let Some(joined) = tasks.try_join_next() {
                tally(&mut stats, joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            tally(&mut stats, joined);
        }

        info!(
            handled = stats.handled,
            failed = stats.failed,
            "Message consumer stopped"
        );
        self.emit(CoreEvent::Sync(SyncEvent::ConsumerStopped {
            handled: stats.handled,
            failed: stats.failed,
        }));

        stats
    }

    async fn dispatch(&self, uow: &mut UnitOfWork, message: &SyncMessage) -> Result<Dispatched> {
        message.validate()?;
        let external_id = message.id().value();

        let dispatched = match message {
            SyncMessage::SynchronizeImage(m) => {
                let result = self.images.synchronize(uow, m.payload()).await?;
                image_dispatched(external_id, result)
            }
            SyncMessage::RemoveImage(m) => {
                if self.images.remove(uow, m.id()).await? {
                    Dispatched {
                        outcome: SyncOutcome::Removed,
                        event: Some(CoreEvent::Media(MediaEvent::Removed { external_id })),
                    }
                } else {
                    Dispatched {
                        outcome: SyncOutcome::NotFound,
                        event: None,
                    }
                }
            }
            SyncMessage::SynchronizeTaxon(m) => {
                let result = self.taxons.synchronize(uow, m).await?;
                Dispatched {
                    outcome: SyncOutcome::Categories {
                        touched: result.categories,
                    },
                    event: Some(CoreEvent::Taxon(TaxonEvent::Synchronized {
                        external_id,
                        categories: result.categories,
                    })),
                }
            }
            SyncMessage::RemoveTaxon(m) => {
                if self.taxons.remove(uow, m.id()).await? {
                    Dispatched {
                        outcome: SyncOutcome::Removed,
                        event: Some(CoreEvent::Taxon(TaxonEvent::Removed { external_id })),
                    }
                } else {
                    Dispatched {
                        outcome: SyncOutcome::NotFound,
                        event: None,
                    }
                }
            }
        };

        Ok(dispatched)
    }

    fn report_success(&self, message: &SyncMessage, event: Option<CoreEvent>) {
        debug!(kind = message.kind_name(), id = %message.id(), "Message handled");

        if let Some(event) = event {
            self.emit(event);
        }
        self.emit(CoreEvent::Sync(SyncEvent::MessageHandled {
            kind: message.kind_name().to_string(),
            id: message.id().value(),
        }));
    }

    fn report_failure(&self, message: &SyncMessage, err: &SyncError) {
        let retryable = err.is_retryable();

        if retryable {
            warn!(kind = message.kind_name(), id = %message.id(), error = %err, "Message failed, retryable");
        } else {
            error!(kind = message.kind_name(), id = %message.id(), error = %err, "Message failed");
        }

        self.emit(CoreEvent::Sync(SyncEvent::MessageFailed {
            kind: message.kind_name().to_string(),
            id: message.id().value(),
            error: err.to_string(),
            retryable,
        }));
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is not an error for the consumer
        let _ = self.event_bus.emit(event);
    }
}

fn image_dispatched(external_id: i64, result: ImageSyncResult) -> Dispatched {
    match result {
        ImageSyncResult::VersionAdded {
            media_id,
            created: true,
            ..
        } => Dispatched {
            event: Some(CoreEvent::Media(MediaEvent::Created {
                external_id,
                media_id: media_id.clone(),
            })),
            outcome: SyncOutcome::Created { media_id },
        },
        ImageSyncResult::VersionAdded {
            media_id,
            version,
            size,
            created: false,
        } => Dispatched {
            outcome: SyncOutcome::Updated { version },
            event: Some(CoreEvent::Media(MediaEvent::VersionAdded {
                external_id,
                media_id,
                version,
                size,
            })),
        },
        ImageSyncResult::MetadataAdded { version, .. } => Dispatched {
            outcome: SyncOutcome::Updated { version },
            event: None,
        },
        ImageSyncResult::Unchanged { .. } => Dispatched {
            outcome: SyncOutcome::Unchanged,
            event: Some(CoreEvent::Media(MediaEvent::Unchanged { external_id })),
        },
    }
}

fn tally(stats: &mut ConsumerStats, joined: std::result::Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => stats.handled += 1,
        Ok(false) => stats.failed += 1,
        Err(e) => {
            error!(error = %e, "Message task panicked");
            stats.failed += 1;
        }
    }
}
