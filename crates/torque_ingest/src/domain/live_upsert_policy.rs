use common::domain::{DomainResult, EventId, TorqueEvent, TorqueEventFields, TorqueEventRepository};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What the policy did with one snapshot of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(EventId),
    Updated(EventId),
    /// The record was written and its streaming flag cleared
    Sealed(EventId),
    /// The matching record is already sealed and was left alone
    Skipped(EventId),
}

/// Reconciles in-memory event snapshots with persisted records.
///
/// A snapshot either continues the device's streaming record for the same
/// wake cycle or starts a new one. Sealed records are never mutated.
pub struct LiveUpsertPolicy {
    repository: Arc<dyn TorqueEventRepository>,
}

impl LiveUpsertPolicy {
    pub fn new(repository: Arc<dyn TorqueEventRepository>) -> Self {
        Self { repository }
    }

    /// Write `fields` through the repository.
    ///
    /// A snapshot with `is_streaming == false` seals the record: its data is
    /// written first and the streaming flag is cleared by the final write.
    #[instrument(
        skip(self, fields),
        fields(
            device_id = %fields.device_identity,
            heartbeat_crc = ?fields.heartbeat_record_payload_crc,
            sealing = !fields.is_streaming,
        )
    )]
    pub async fn apply(&self, fields: TorqueEventFields) -> DomainResult<UpsertOutcome> {
        let sealing = !fields.is_streaming;

        match self.find_existing(&fields).await? {
            Some(event) if !event.is_streaming() => {
                warn!(
                    event_id = %event.id,
                    "policy violation: refusing to mutate a sealed torque event"
                );
                Ok(UpsertOutcome::Skipped(event.id))
            }
            Some(event) => {
                self.repository.update_event(event.id, fields).await?;
                debug!(event_id = %event.id, "updated streaming torque event");
                Ok(if sealing {
                    UpsertOutcome::Sealed(event.id)
                } else {
                    UpsertOutcome::Updated(event.id)
                })
            }
            None if sealing => {
                let streaming = TorqueEventFields {
                    is_streaming: true,
                    ..fields.clone()
                };
                let id = self.repository.create_event(streaming).await?;
                self.repository.update_event(id, fields).await?;
                debug!(event_id = %id, "created and sealed torque event");
                Ok(UpsertOutcome::Sealed(id))
            }
            None => {
                let id = self.repository.create_event(fields).await?;
                debug!(event_id = %id, "created streaming torque event");
                Ok(UpsertOutcome::Created(id))
            }
        }
    }

    /// Record for the same device and wake cycle.
    ///
    /// Data packets can arrive before the cycle's heartbeat, in which case
    /// the record was created without a heartbeat checksum; that record is
    /// adopted once the heartbeat shows up.
    async fn find_existing(&self, fields: &TorqueEventFields) -> DomainResult<Option<TorqueEvent>> {
        let heartbeat_crc = fields.heartbeat_record_payload_crc;
        let found = self
            .repository
            .find_active_streaming_event(&fields.device_identity, heartbeat_crc)
            .await?;

        match (found, heartbeat_crc) {
            (Some(event), _) => Ok(Some(event)),
            (None, Some(_)) => {
                self.repository
                    .find_active_streaming_event(&fields.device_identity, None)
                    .await
            }
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DeviceIdentity, DomainError, MockTorqueEventRepository};
    use mockall::predicate::eq;

    fn fields(is_streaming: bool, heartbeat_crc: Option<u16>) -> TorqueEventFields {
        let mut fields = TorqueEventFields::new(DeviceIdentity::new("dev-1"));
        fields.is_streaming = is_streaming;
        fields.heartbeat_record_payload_crc = heartbeat_crc;
        fields
    }

    fn stored(id: u64, is_streaming: bool) -> TorqueEvent {
        TorqueEvent {
            id: EventId(id),
            fields: fields(is_streaming, Some(7)),
        }
    }

    #[tokio::test]
    async fn test_creates_when_no_record_exists() {
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .withf(|device, crc| device.as_str() == "dev-1" && crc.is_none())
            .times(1)
            .returning(|_, _| Ok(None));
        repo.expect_create_event()
            .withf(|f| f.is_streaming)
            .times(1)
            .returning(|_| Ok(EventId(1)));
        repo.expect_update_event().times(0);

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let outcome = policy.apply(fields(true, None)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created(EventId(1)));
    }

    #[tokio::test]
    async fn test_updates_streaming_record_in_place() {
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .times(1)
            .returning(|_, _| Ok(Some(stored(5, true))));
        repo.expect_create_event().times(0);
        repo.expect_update_event()
            .with(eq(EventId(5)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let outcome = policy.apply(fields(true, Some(7))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated(EventId(5)));
    }

    #[tokio::test]
    async fn test_sealed_record_is_skipped() {
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .times(1)
            .returning(|_, _| Ok(Some(stored(9, false))));
        repo.expect_create_event().times(0);
        repo.expect_update_event().times(0);

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let outcome = policy.apply(fields(true, Some(7))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Skipped(EventId(9)));
    }

    #[tokio::test]
    async fn test_summary_seals_existing_record() {
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .returning(|_, _| Ok(Some(stored(3, true))));
        repo.expect_update_event()
            .withf(|id, f| *id == EventId(3) && !f.is_streaming)
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let outcome = policy.apply(fields(false, Some(7))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Sealed(EventId(3)));
    }

    #[tokio::test]
    async fn test_summary_without_record_creates_then_seals() {
        let mut seq = mockall::Sequence::new();
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .returning(|_, _| Ok(None));
        repo.expect_create_event()
            .withf(|f| f.is_streaming)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(EventId(11)));
        repo.expect_update_event()
            .withf(|id, f| *id == EventId(11) && !f.is_streaming)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let outcome = policy.apply(fields(false, Some(7))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Sealed(EventId(11)));
    }

    #[tokio::test]
    async fn test_adopts_record_created_before_heartbeat() {
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .withf(|_, crc| *crc == Some(7))
            .times(1)
            .returning(|_, _| Ok(None));
        repo.expect_find_active_streaming_event()
            .withf(|_, crc| crc.is_none())
            .times(1)
            .returning(|_, _| Ok(Some(stored(2, true))));
        repo.expect_update_event()
            .withf(|id, f| *id == EventId(2) && f.heartbeat_record_payload_crc == Some(7))
            .times(1)
            .returning(|_, _| Ok(()));

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let outcome = policy.apply(fields(true, Some(7))).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated(EventId(2)));
    }

    #[tokio::test]
    async fn test_repository_error_propagates() {
        let mut repo = MockTorqueEventRepository::new();
        repo.expect_find_active_streaming_event()
            .returning(|_, _| Err(DomainError::RepositoryError(anyhow::anyhow!("offline"))));

        let policy = LiveUpsertPolicy::new(Arc::new(repo));
        let result = policy.apply(fields(true, None)).await;
        assert!(matches!(result, Err(DomainError::RepositoryError(_))));
    }
}
