use crate::domain::{crc16, ByteReader, PacketResult};
use common::domain::StrokeType;

const OFF_TYPE_OF_STROKE: usize = 0;
const OFF_STROKE_TIME: usize = 2;
const OFF_MAX_TORQUE: usize = 4;
const OFF_PAYLOAD_CRC: usize = 20;

pub const EVENT_SUMMARY_LEN: usize = 22;

/// Closing record of an actuation stroke
#[derive(Debug, Clone, PartialEq)]
pub struct EventSummaryRecord {
    pub type_of_stroke: u16,
    pub stroke_time: u16,
    pub max_torque: i16,
    pub payload_crc: u16,
    pub calculated_payload_crc: u16,
}

impl EventSummaryRecord {
    pub fn decode(payload: &[u8]) -> PacketResult<Self> {
        let reader = ByteReader::new("event summary", payload);
        reader.require(EVENT_SUMMARY_LEN)?;

        Ok(Self {
            type_of_stroke: reader.u16(OFF_TYPE_OF_STROKE)?,
            stroke_time: reader.u16(OFF_STROKE_TIME)?,
            max_torque: reader.i16(OFF_MAX_TORQUE)?,
            payload_crc: reader.u16(OFF_PAYLOAD_CRC)?,
            calculated_payload_crc: crc16(reader.bytes(0, OFF_PAYLOAD_CRC)?),
        })
    }

    pub fn stroke_type(&self) -> StrokeType {
        StrokeType::from(self.type_of_stroke)
    }

    pub fn checksum_matches(&self) -> bool {
        self.payload_crc == self.calculated_payload_crc
    }
}
