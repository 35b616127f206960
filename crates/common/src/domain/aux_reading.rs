use crate::domain::{DeviceIdentity, DomainResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reading from an auxiliary (gas concentration) sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxReading {
    pub device_identity: DeviceIdentity,
    /// Base value multiplied by the packet's scaling factor
    pub scaled_value: u32,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

/// Persistence collaborator for auxiliary sensor readings
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuxReadingRepository: Send + Sync {
    /// Store a single reading
    async fn store_reading(&self, reading: AuxReading) -> DomainResult<()>;
}
