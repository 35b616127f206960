use crate::domain::{
    AuxReading, AuxReadingRepository, DeviceIdentity, DomainError, DomainResult, EventId,
    TorqueEvent, TorqueEventFields, TorqueEventRepository,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory implementation of TorqueEventRepository using a BTreeMap keyed by EventId
pub struct InMemoryTorqueEventRepository {
    events: Arc<RwLock<BTreeMap<EventId, TorqueEventFields>>>,
    next_id: AtomicU64,
}

impl InMemoryTorqueEventRepository {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn get_event(&self, id: EventId) -> Option<TorqueEvent> {
        let events = self.events.read().await;
        events.get(&id).map(|fields| TorqueEvent {
            id,
            fields: fields.clone(),
        })
    }

    /// All events for a device, oldest first
    pub async fn list_events(&self, device_identity: &DeviceIdentity) -> Vec<TorqueEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .filter(|(_, fields)| &fields.device_identity == device_identity)
            .map(|(id, fields)| TorqueEvent {
                id: *id,
                fields: fields.clone(),
            })
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }
}

impl Default for InMemoryTorqueEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TorqueEventRepository for InMemoryTorqueEventRepository {
    async fn find_active_streaming_event(
        &self,
        device_identity: &DeviceIdentity,
        heartbeat_checksum: Option<u16>,
    ) -> DomainResult<Option<TorqueEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .rev()
            .find(|(_, fields)| {
                fields.is_streaming
                    && &fields.device_identity == device_identity
                    && fields.heartbeat_record_payload_crc == heartbeat_checksum
            })
            .map(|(id, fields)| TorqueEvent {
                id: *id,
                fields: fields.clone(),
            }))
    }

    async fn create_event(&self, fields: TorqueEventFields) -> DomainResult<EventId> {
        let id = EventId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(event_id = %id, device_id = %fields.device_identity, "storing torque event");
        let mut events = self.events.write().await;
        events.insert(id, fields);
        Ok(id)
    }

    async fn update_event(&self, id: EventId, fields: TorqueEventFields) -> DomainResult<()> {
        let mut events = self.events.write().await;
        let stored = events.get_mut(&id).ok_or(DomainError::EventNotFound(id))?;

        // Whole record swaps under the write lock, flag included
        debug!(event_id = %id, is_streaming = fields.is_streaming, "updating torque event");
        *stored = fields;
        Ok(())
    }
}

/// In-memory implementation of AuxReadingRepository
pub struct InMemoryAuxReadingRepository {
    readings: Arc<RwLock<Vec<AuxReading>>>,
}

impl InMemoryAuxReadingRepository {
    pub fn new() -> Self {
        Self {
            readings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn readings(&self) -> Vec<AuxReading> {
        self.readings.read().await.clone()
    }
}

impl Default for InMemoryAuxReadingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuxReadingRepository for InMemoryAuxReadingRepository {
    async fn store_reading(&self, reading: AuxReading) -> DomainResult<()> {
        debug!(device_id = %reading.device_identity, "storing aux reading");
        self.readings.write().await.push(reading);
        Ok(())
    }
}
