use crate::domain::{
    find_duplicate_tail, AssembledEvent, FragmentPlacement, InboundPacket, Packet, PacketError,
    PacketResult, SessionUpdate,
};
use common::domain::{AuxReading, DeviceIdentity};
use std::mem;
use tracing::{debug, warn};

/// Per-device state: the event being assembled and the last sealed one.
///
/// Bound to a single device identity for its whole life.
#[derive(Debug)]
pub struct DeviceSession {
    device_identity: DeviceIdentity,
    current: AssembledEvent,
    previous: Option<AssembledEvent>,
}

impl DeviceSession {
    pub fn new(device_identity: DeviceIdentity) -> Self {
        Self {
            current: AssembledEvent::new(device_identity.clone()),
            device_identity,
            previous: None,
        }
    }

    pub fn device_identity(&self) -> &DeviceIdentity {
        &self.device_identity
    }

    pub fn current(&self) -> &AssembledEvent {
        &self.current
    }

    pub fn previous(&self) -> Option<&AssembledEvent> {
        self.previous.as_ref()
    }

    /// Apply one decoded packet and return the update to publish.
    ///
    /// A packet for another device is rejected before anything is touched.
    pub fn apply(&mut self, inbound: InboundPacket) -> PacketResult<SessionUpdate> {
        if inbound.device_identity != self.device_identity {
            return Err(PacketError::DeviceIdentityMismatch {
                bound: self.device_identity.clone(),
                received: inbound.device_identity,
            });
        }

        let update = match inbound.packet {
            Packet::Heartbeat(heartbeat) => {
                if !heartbeat.checksum_matches() {
                    warn!(
                        device_id = %self.device_identity,
                        embedded = heartbeat.payload_crc,
                        calculated = heartbeat.calculated_payload_crc,
                        "heartbeat record checksum mismatch"
                    );
                }
                self.current.merge_heartbeat(heartbeat);
                SessionUpdate::EventProgress(self.current.to_fields())
            }
            Packet::Data(record) => {
                let sequence = record.sequence;
                if !self.current.within_reach(sequence) {
                    return Err(PacketError::SequenceOutOfRange {
                        sequence,
                        fragments: self.current.fragments().len(),
                    });
                }
                if !record.checksum_matches() {
                    warn!(
                        device_id = %self.device_identity,
                        sequence,
                        embedded = record.payload_crc,
                        calculated = record.calculated_payload_crc,
                        "data record checksum mismatch"
                    );
                }
                if record.trailing_byte {
                    warn!(
                        device_id = %self.device_identity,
                        sequence,
                        "data record has an odd trailing byte, ignoring it"
                    );
                }
                if self.current.place_fragment(record) == FragmentPlacement::Overwritten {
                    warn!(
                        device_id = %self.device_identity,
                        sequence,
                        "duplicate sequence number within the same event, overwriting fragment"
                    );
                }
                SessionUpdate::EventProgress(self.current.to_fields())
            }
            Packet::EventSummary(summary) => {
                if !summary.checksum_matches() {
                    warn!(
                        device_id = %self.device_identity,
                        embedded = summary.payload_crc,
                        calculated = summary.calculated_payload_crc,
                        "event summary record checksum mismatch"
                    );
                }
                let hidden = self
                    .previous
                    .as_ref()
                    .map(|previous| find_duplicate_tail(&self.current, previous))
                    .unwrap_or_default();
                if !hidden.is_empty() {
                    debug!(
                        device_id = %self.device_identity,
                        hidden = ?hidden,
                        "fragments restate the previous event"
                    );
                }

                self.current.seal(summary, hidden);
                let fields = self.current.to_fields();
                let sealed = mem::replace(
                    &mut self.current,
                    AssembledEvent::new(self.device_identity.clone()),
                );
                self.previous = Some(sealed);
                SessionUpdate::EventSealed(fields)
            }
            Packet::Auxiliary(record) => SessionUpdate::AuxiliaryReading(AuxReading {
                device_identity: self.device_identity.clone(),
                scaled_value: record.scaled_value(),
                captured_at: record.captured_at,
            }),
        };

        Ok(update)
    }
}
