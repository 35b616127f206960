pub mod domain;
pub mod telemetry;

pub use domain::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockAuxReadingRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockTorqueEventRepository;
