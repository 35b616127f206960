use crate::domain::{
    AuxiliaryRecord, DataRecord, EventSummaryRecord, HeartbeatRecord, PacketError, PacketResult,
};
use chrono::{DateTime, Utc};
use common::domain::DeviceIdentity;
use std::fmt;

pub const PORT_HEARTBEAT: u16 = 12;
pub const PORT_DATA: u16 = 13;
pub const PORT_EVENT_SUMMARY: u16 = 14;
pub const PORT_AUXILIARY: u16 = 15;

/// Packet kind, addressed by the numeric port in the transport topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketPort {
    Heartbeat,
    Data,
    EventSummary,
    Auxiliary,
    Unknown(u16),
}

impl PacketPort {
    pub fn number(&self) -> u16 {
        match self {
            PacketPort::Heartbeat => PORT_HEARTBEAT,
            PacketPort::Data => PORT_DATA,
            PacketPort::EventSummary => PORT_EVENT_SUMMARY,
            PacketPort::Auxiliary => PORT_AUXILIARY,
            PacketPort::Unknown(number) => *number,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacketPort::Heartbeat => "heartbeat",
            PacketPort::Data => "data",
            PacketPort::EventSummary => "event_summary",
            PacketPort::Auxiliary => "auxiliary",
            PacketPort::Unknown(_) => "unknown",
        }
    }
}

impl From<u16> for PacketPort {
    fn from(number: u16) -> Self {
        match number {
            PORT_HEARTBEAT => PacketPort::Heartbeat,
            PORT_DATA => PacketPort::Data,
            PORT_EVENT_SUMMARY => PacketPort::EventSummary,
            PORT_AUXILIARY => PacketPort::Auxiliary,
            other => PacketPort::Unknown(other),
        }
    }
}

impl fmt::Display for PacketPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A decoded payload, one variant per known port
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Heartbeat(HeartbeatRecord),
    Data(DataRecord),
    EventSummary(EventSummaryRecord),
    Auxiliary(AuxiliaryRecord),
}

impl Packet {
    /// Decode `payload` according to `port`.
    ///
    /// `received_at` stamps auxiliary readings, which carry no clock of their own.
    pub fn decode(
        port: PacketPort,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> PacketResult<Self> {
        match port {
            PacketPort::Heartbeat => HeartbeatRecord::decode(payload).map(Packet::Heartbeat),
            PacketPort::Data => DataRecord::decode(payload).map(Packet::Data),
            PacketPort::EventSummary => {
                EventSummaryRecord::decode(payload).map(Packet::EventSummary)
            }
            PacketPort::Auxiliary => {
                AuxiliaryRecord::decode(payload, received_at).map(Packet::Auxiliary)
            }
            PacketPort::Unknown(number) => Err(PacketError::UnknownPort(number.to_string())),
        }
    }

    pub fn port(&self) -> PacketPort {
        match self {
            Packet::Heartbeat(_) => PacketPort::Heartbeat,
            Packet::Data(_) => PacketPort::Data,
            Packet::EventSummary(_) => PacketPort::EventSummary,
            Packet::Auxiliary(_) => PacketPort::Auxiliary,
        }
    }

    /// Integrity verdict; auxiliary readings are never checksummed
    pub fn checksum_matches(&self) -> Option<bool> {
        match self {
            Packet::Heartbeat(record) => Some(record.checksum_matches()),
            Packet::Data(record) => Some(record.checksum_matches()),
            Packet::EventSummary(record) => Some(record.checksum_matches()),
            Packet::Auxiliary(_) => None,
        }
    }
}

/// A decoded packet together with the device that sent it
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    pub device_identity: DeviceIdentity,
    pub packet: Packet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{data_payload, summary_payload};

    #[test]
    fn test_port_numbers() {
        assert_eq!(PacketPort::from(12), PacketPort::Heartbeat);
        assert_eq!(PacketPort::from(13), PacketPort::Data);
        assert_eq!(PacketPort::from(14), PacketPort::EventSummary);
        assert_eq!(PacketPort::from(15), PacketPort::Auxiliary);
        assert_eq!(PacketPort::from(16), PacketPort::Unknown(16));
        assert_eq!(PacketPort::Unknown(99).number(), 99);
        assert_eq!(PacketPort::Data.to_string(), "13");
    }

    #[test]
    fn test_decode_dispatches_on_port() {
        let packet = Packet::decode(PacketPort::Data, &data_payload(1, &[7]), Utc::now()).unwrap();
        assert!(matches!(packet, Packet::Data(ref record) if record.samples == vec![7]));
        assert_eq!(packet.port(), PacketPort::Data);
        assert_eq!(packet.checksum_matches(), Some(true));

        let packet =
            Packet::decode(PacketPort::EventSummary, &summary_payload(1, 2, 3), Utc::now())
                .unwrap();
        assert_eq!(packet.port(), PacketPort::EventSummary);
    }

    #[test]
    fn test_unknown_port_is_rejected() {
        let result = Packet::decode(PacketPort::Unknown(42), &[0u8; 96], Utc::now());
        assert_eq!(result, Err(PacketError::UnknownPort("42".to_string())));
    }
}
