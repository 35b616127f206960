use crate::domain::{ByteReader, PacketError, PacketResult};
use chrono::{DateTime, Utc};

const OFF_BASE_VALUE: usize = 3;
const BASE_VALUE_WIDTH: usize = 5;
const OFF_SCALING_FACTOR: usize = 12;

pub const AUXILIARY_MIN_LEN: usize = 20;

/// Gas concentration report from an auxiliary sensor.
///
/// The base value travels as ASCII decimal digits; there is no checksum.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryRecord {
    pub base_value: u32,
    pub scaling_factor: u8,
    pub captured_at: DateTime<Utc>,
}

impl AuxiliaryRecord {
    pub fn decode(payload: &[u8], captured_at: DateTime<Utc>) -> PacketResult<Self> {
        let reader = ByteReader::new("auxiliary", payload);
        reader.require(AUXILIARY_MIN_LEN)?;

        let digits = reader.bytes(OFF_BASE_VALUE, BASE_VALUE_WIDTH)?;
        let base_value = std::str::from_utf8(digits)
            .ok()
            .and_then(|text| text.trim().parse::<u32>().ok())
            .ok_or_else(|| {
                PacketError::InvalidReading(format!(
                    "base value {:?} is not a decimal number",
                    String::from_utf8_lossy(digits)
                ))
            })?;

        Ok(Self {
            base_value,
            scaling_factor: reader.u8(OFF_SCALING_FACTOR)?,
            captured_at,
        })
    }

    pub fn scaled_value(&self) -> u32 {
        self.base_value.saturating_mul(u32::from(self.scaling_factor))
    }
}
