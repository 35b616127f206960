pub mod domain;
pub mod mqtt;
mod torque_ingest;

pub use domain::*;
pub use torque_ingest::*;

#[cfg(any(test, feature = "testing"))]
pub use domain::MockSessionUpdatePublisher;
