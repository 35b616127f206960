use crate::domain::{
    InboundPacket, IngestResult, Packet, SessionRegistry, SessionUpdatePublisher,
};
use crate::mqtt::parse_topic;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument, Span};

/// Domain service for one inbound transport message.
///
/// Flow:
/// 1. Parse the topic into device identity and port
/// 2. Decode the payload for that port
/// 3. Apply the packet to the device's session under its lock
/// 4. Publish the resulting session update, still under the lock so a
///    device's updates leave in arrival order
///
/// Persistence happens downstream of the publisher, off the device lock.
pub struct IngestService {
    registry: Arc<SessionRegistry>,
    publisher: Arc<dyn SessionUpdatePublisher>,
}

impl IngestService {
    pub fn new(registry: Arc<SessionRegistry>, publisher: Arc<dyn SessionUpdatePublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[instrument(
        skip(self, payload),
        fields(payload_size = payload.len(), device_id = tracing::field::Empty, port = tracing::field::Empty)
    )]
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> IngestResult<()> {
        let parsed = parse_topic(topic)?;
        Span::current().record("device_id", parsed.device_identity.as_str());
        Span::current().record("port", parsed.port.number());

        let packet = Packet::decode(parsed.port, payload, Utc::now())?;
        debug!(
            packet = parsed.port.name(),
            checksum_matches = ?packet.checksum_matches(),
            "decoded packet"
        );

        let session = self.registry.session(&parsed.device_identity).await;
        let mut session = session.lock().await;
        let update = session.apply(InboundPacket {
            device_identity: parsed.device_identity,
            packet,
        })?;

        debug!(update = update.kind(), "publishing session update");
        self.publisher.publish(update).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{data_payload, summary_payload, HeartbeatBuilder};
    use crate::domain::{IngestError, MockSessionUpdatePublisher, PacketError, SessionUpdate};
    use common::domain::DomainError;

    fn service(publisher: MockSessionUpdatePublisher) -> IngestService {
        IngestService::new(Arc::new(SessionRegistry::new()), Arc::new(publisher))
    }

    #[tokio::test]
    async fn test_data_packet_publishes_progress() {
        let mut publisher = MockSessionUpdatePublisher::new();
        publisher
            .expect_publish()
            .withf(|update| {
                matches!(update, SessionUpdate::EventProgress(f)
                    if f.device_identity.as_str() == "dev-1" && f.torque_data == vec![4, 5])
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = service(publisher);
        service
            .handle_message("sensors/dev-1/port/13", &data_payload(1, &[4, 5]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_cycle_publishes_sealed_event() {
        let mut publisher = MockSessionUpdatePublisher::new();
        let mut seq = mockall::Sequence::new();
        publisher
            .expect_publish()
            .withf(|update| matches!(update, SessionUpdate::EventProgress(_)))
            .times(4)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        publisher
            .expect_publish()
            .withf(|update| {
                matches!(update, SessionUpdate::EventSealed(f)
                    if !f.is_streaming && f.record_numbers == vec![1, 2, 3])
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let service = service(publisher);
        service
            .handle_message("sensors/dev-1/port/12", &HeartbeatBuilder::new().build())
            .await
            .unwrap();
        for sequence in [2u16, 1, 3] {
            service
                .handle_message("sensors/dev-1/port/13", &data_payload(sequence, &[1]))
                .await
                .unwrap();
        }
        service
            .handle_message("sensors/dev-1/port/14", &summary_payload(2, 10, 20))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_malformed_packet_is_rejected_without_session() {
        let mut publisher = MockSessionUpdatePublisher::new();
        publisher.expect_publish().times(0);

        let service = service(publisher);
        let result = service
            .handle_message("sensors/dev-1/port/12", &[0u8; 10])
            .await;

        assert!(matches!(
            result,
            Err(IngestError::Packet(PacketError::MalformedPacket { .. }))
        ));
        assert!(service.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_topic_is_rejected() {
        let mut publisher = MockSessionUpdatePublisher::new();
        publisher.expect_publish().times(0);

        let service = service(publisher);
        let result = service.handle_message("sensors/dev-1/13", &[0u8; 4]).await;
        assert!(matches!(
            result,
            Err(IngestError::Packet(PacketError::InvalidTopic(_)))
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_is_reported() {
        let mut publisher = MockSessionUpdatePublisher::new();
        publisher
            .expect_publish()
            .returning(|_| Err(DomainError::PublishError("closed".to_string())));

        let service = service(publisher);
        let result = service
            .handle_message("sensors/dev-1/port/13", &data_payload(1, &[1]))
            .await;
        assert!(matches!(
            result,
            Err(IngestError::Domain(DomainError::PublishError(_)))
        ));
    }
}
