use common::domain::DeviceIdentity;
use thiserror::Error;

/// Errors that reject a single inbound packet.
///
/// None of these disturb the device session the packet was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("malformed {packet} packet: {width}-byte read at offset {offset} exceeds payload length {len}")]
    MalformedPacket {
        packet: &'static str,
        offset: usize,
        width: usize,
        len: usize,
    },

    #[error("invalid topic '{0}': expected 'sensors/<device>/port/<port>'")]
    InvalidTopic(String),

    #[error("unknown port '{0}'")]
    UnknownPort(String),

    #[error("data record sequence numbers are 1-based, got 0")]
    InvalidSequenceNumber,

    #[error("data record sequence {sequence} is too far past the {fragments} slots seen so far")]
    SequenceOutOfRange { sequence: u16, fragments: usize },

    #[error("invalid auxiliary reading: {0}")]
    InvalidReading(String),

    #[error("packet for device {received} routed to session bound to {bound}")]
    DeviceIdentityMismatch {
        bound: DeviceIdentity,
        received: DeviceIdentity,
    },
}

pub type PacketResult<T> = Result<T, PacketError>;

/// Failure handling one inbound message end to end
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Domain(#[from] common::domain::DomainError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure handing an inbound message to its ingest shard.
///
/// Returned without waiting: a full shard drops the message rather than
/// stalling the transport.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("ingest queue {shard} is full, dropping message")]
    QueueFull { shard: usize },

    #[error("ingest queue {shard} is closed")]
    QueueClosed { shard: usize },
}
