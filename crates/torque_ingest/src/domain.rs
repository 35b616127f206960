mod assembled_event;
mod auxiliary;
mod byte_reader;
mod crc16;
mod data_record;
mod device_session;
mod duplicate_detector;
mod error;
mod event_summary;
#[cfg(test)]
pub(crate) mod fixtures;
mod heartbeat;
mod ingest_dispatcher;
mod ingest_service;
mod live_upsert_policy;
mod packet;
mod packet_dump;
mod persistence_worker;
mod replay;
mod session_registry;
mod session_update;

pub use assembled_event::*;
pub use auxiliary::*;
pub use byte_reader::*;
pub use crc16::*;
pub use data_record::*;
pub use device_session::*;
pub use duplicate_detector::*;
pub use error::*;
pub use event_summary::*;
pub use heartbeat::*;
pub use ingest_dispatcher::*;
pub use ingest_service::*;
pub use live_upsert_policy::*;
pub use packet::*;
pub use packet_dump::*;
pub use persistence_worker::*;
pub use replay::*;
pub use session_registry::*;
pub use session_update::*;
