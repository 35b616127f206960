mod aux_reading;
mod device_identity;
mod in_memory_torque_event_repository;
mod result;
mod torque_event;

pub use aux_reading::*;
pub use device_identity::*;
pub use in_memory_torque_event_repository::*;
pub use result::*;
pub use torque_event::*;
