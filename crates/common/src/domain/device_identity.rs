use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token identifying one physical sensor, taken from the transport topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}
