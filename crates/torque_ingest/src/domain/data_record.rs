use crate::domain::{crc16, ByteReader, PacketError, PacketResult, CHECKSUM_WIDTH};

const OFF_SEQUENCE: usize = 0;
const OFF_SAMPLES: usize = 2;
const SAMPLE_WIDTH: usize = 2;

/// Smallest data record: sequence number and checksum with no samples
pub const DATA_RECORD_MIN_LEN: usize = OFF_SAMPLES + CHECKSUM_WIDTH;

/// One fragment of a stroke's torque trace
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    /// 1-based position of this fragment within the event
    pub sequence: u16,
    pub samples: Vec<i16>,
    /// Set when the sample region had an odd byte left over
    pub trailing_byte: bool,
    pub payload_crc: u16,
    pub calculated_payload_crc: u16,
}

impl DataRecord {
    pub fn decode(payload: &[u8]) -> PacketResult<Self> {
        let reader = ByteReader::new("data", payload);
        reader.require(DATA_RECORD_MIN_LEN)?;

        let sequence = reader.u16(OFF_SEQUENCE)?;
        if sequence == 0 {
            return Err(PacketError::InvalidSequenceNumber);
        }

        let crc_offset = payload.len() - CHECKSUM_WIDTH;
        let sample_bytes = reader.bytes(OFF_SAMPLES, crc_offset - OFF_SAMPLES)?;
        let chunks = sample_bytes.chunks_exact(SAMPLE_WIDTH);
        let trailing_byte = !chunks.remainder().is_empty();
        let samples = chunks
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();

        Ok(Self {
            sequence,
            samples,
            trailing_byte,
            payload_crc: reader.u16(crc_offset)?,
            calculated_payload_crc: crc16(reader.bytes(0, crc_offset)?),
        })
    }

    pub fn checksum_matches(&self) -> bool {
        self.payload_crc == self.calculated_payload_crc
    }
}
