use async_trait::async_trait;
use common::domain::{AuxReading, DeviceIdentity, DomainError, DomainResult, TorqueEventFields};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;

/// Side effect emitted by a device session after a packet is applied
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Current state of a still-streaming event
    EventProgress(TorqueEventFields),
    /// Final state of an event that just received its summary
    EventSealed(TorqueEventFields),
    AuxiliaryReading(AuxReading),
}

impl SessionUpdate {
    pub fn device_identity(&self) -> &DeviceIdentity {
        match self {
            SessionUpdate::EventProgress(fields) | SessionUpdate::EventSealed(fields) => {
                &fields.device_identity
            }
            SessionUpdate::AuxiliaryReading(reading) => &reading.device_identity,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionUpdate::EventProgress(_) => "event_progress",
            SessionUpdate::EventSealed(_) => "event_sealed",
            SessionUpdate::AuxiliaryReading(_) => "auxiliary_reading",
        }
    }
}

/// Shard a device's traffic lands on, out of `shards` (must be non-zero).
///
/// Shared by every sharded stage so one device maps to the same index
/// throughout the pipeline.
pub fn shard_index(device_identity: &DeviceIdentity, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    device_identity.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Outbound channel between the session tracker and persistence
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SessionUpdatePublisher: Send + Sync {
    async fn publish(&self, update: SessionUpdate) -> DomainResult<()>;
}

/// Publishes updates onto bounded queues sharded by device identity.
///
/// Every update for one device lands on the same queue, so a single worker
/// sees that device's updates in order.
pub struct ChannelSessionUpdatePublisher {
    senders: Vec<mpsc::Sender<SessionUpdate>>,
}

impl ChannelSessionUpdatePublisher {
    /// Create the publisher and the receiving end of each shard
    pub fn new(
        shards: usize,
        capacity: usize,
    ) -> DomainResult<(Self, Vec<mpsc::Receiver<SessionUpdate>>)> {
        if shards == 0 || capacity == 0 {
            return Err(DomainError::InvalidConfig(format!(
                "session update queues need at least one shard and a non-zero capacity (shards={}, capacity={})",
                shards, capacity
            )));
        }

        let (senders, receivers) = (0..shards).map(|_| mpsc::channel(capacity)).unzip();
        Ok((Self { senders }, receivers))
    }

    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    pub fn shard_for(&self, device_identity: &DeviceIdentity) -> usize {
        shard_index(device_identity, self.senders.len())
    }
}

#[async_trait]
impl SessionUpdatePublisher for ChannelSessionUpdatePublisher {
    async fn publish(&self, update: SessionUpdate) -> DomainResult<()> {
        let shard = self.shard_for(update.device_identity());
        self.senders[shard].send(update).await.map_err(|e| {
            DomainError::PublishError(format!("persistence queue {} is closed: {}", shard, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(device: &str) -> SessionUpdate {
        SessionUpdate::EventProgress(TorqueEventFields::new(DeviceIdentity::new(device)))
    }

    #[test]
    fn test_zero_shards_rejected() {
        assert!(matches!(
            ChannelSessionUpdatePublisher::new(0, 8),
            Err(DomainError::InvalidConfig(_))
        ));
        assert!(ChannelSessionUpdatePublisher::new(2, 0).is_err());
    }

    #[tokio::test]
    async fn test_device_updates_stay_on_one_shard_in_order() {
        let (publisher, mut receivers) = ChannelSessionUpdatePublisher::new(4, 16).unwrap();
        let device = DeviceIdentity::new("dev-7");
        let shard = publisher.shard_for(&device);

        publisher.publish(progress("dev-7")).await.unwrap();
        let mut sealed = TorqueEventFields::new(device.clone());
        sealed.is_streaming = false;
        publisher
            .publish(SessionUpdate::EventSealed(sealed))
            .await
            .unwrap();

        let receiver = &mut receivers[shard];
        assert_eq!(receiver.recv().await.map(|u| u.kind()), Some("event_progress"));
        assert_eq!(receiver.recv().await.map(|u| u.kind()), Some("event_sealed"));
    }

    #[tokio::test]
    async fn test_publish_to_closed_queue_fails() {
        let (publisher, receivers) = ChannelSessionUpdatePublisher::new(1, 1).unwrap();
        drop(receivers);

        let result = publisher.publish(progress("dev-1")).await;
        assert!(matches!(result, Err(DomainError::PublishError(_))));
    }
}
