use crate::domain::{LiveUpsertPolicy, SessionUpdate, UpsertOutcome};
use common::domain::{AuxReadingRepository, DomainResult};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Drains one shard of session updates into persistence.
///
/// Failures are logged per update and never stop the worker.
pub struct PersistenceWorker {
    shard: usize,
    receiver: mpsc::Receiver<SessionUpdate>,
    upsert_policy: Arc<LiveUpsertPolicy>,
    aux_repository: Arc<dyn AuxReadingRepository>,
}

impl PersistenceWorker {
    pub fn new(
        shard: usize,
        receiver: mpsc::Receiver<SessionUpdate>,
        upsert_policy: Arc<LiveUpsertPolicy>,
        aux_repository: Arc<dyn AuxReadingRepository>,
    ) -> Self {
        Self {
            shard,
            receiver,
            upsert_policy,
            aux_repository,
        }
    }

    /// Process updates until the queue closes or `ctx` is cancelled.
    ///
    /// On cancellation the queue is closed and whatever was already queued
    /// is still persisted.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(shard = self.shard, "persistence worker started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.receiver.close();
                    while let Some(update) = self.receiver.recv().await {
                        self.handle(update).await;
                    }
                    break;
                }
                update = self.receiver.recv() => match update {
                    Some(update) => self.handle(update).await,
                    None => break,
                },
            }
        }

        info!(shard = self.shard, "persistence worker stopped");
        Ok(())
    }

    async fn handle(&self, update: SessionUpdate) {
        let device_id = update.device_identity().clone();
        let kind = update.kind();

        if let Err(e) = self.persist(update).await {
            error!(
                shard = self.shard,
                device_id = %device_id,
                update = kind,
                error = %e,
                "failed to persist session update"
            );
        }
    }

    async fn persist(&self, update: SessionUpdate) -> DomainResult<()> {
        match update {
            SessionUpdate::EventProgress(fields) | SessionUpdate::EventSealed(fields) => {
                let outcome = self.upsert_policy.apply(fields).await?;
                if let UpsertOutcome::Sealed(id) = outcome {
                    info!(shard = self.shard, event_id = %id, "torque event sealed");
                }
            }
            SessionUpdate::AuxiliaryReading(reading) => {
                debug!(
                    device_id = %reading.device_identity,
                    value = reading.scaled_value,
                    "storing auxiliary reading"
                );
                self.aux_repository.store_reading(reading).await?;
            }
        }
        Ok(())
    }
}
