use crate::domain::DeviceSession;
use common::domain::DeviceIdentity;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Table of device sessions.
///
/// Sessions are created lazily on the first packet for a device and are
/// never evicted. The table lock is only taken for writing to insert a new
/// device; all per-packet work happens under that device's own mutex.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<DeviceIdentity, Arc<Mutex<DeviceSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session for `device_identity`, creating it if absent
    pub async fn session(&self, device_identity: &DeviceIdentity) -> Arc<Mutex<DeviceSession>> {
        if let Some(session) = self.sessions.read().await.get(device_identity) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(device_identity.clone()).or_insert_with(|| {
            debug!(device_id = %device_identity, "creating device session");
            Arc::new(Mutex::new(DeviceSession::new(device_identity.clone())))
        });
        Arc::clone(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
