//! Wire payload builders shared by unit tests

use crate::domain::{crc16, HEARTBEAT_LEN};

fn with_checksum(mut body: Vec<u8>) -> Vec<u8> {
    let crc = crc16(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    body
}

pub fn data_payload(sequence: u16, samples: &[i16]) -> Vec<u8> {
    let mut body = sequence.to_le_bytes().to_vec();
    for sample in samples {
        body.extend_from_slice(&sample.to_le_bytes());
    }
    with_checksum(body)
}

pub fn summary_payload(type_of_stroke: u16, stroke_time: u16, max_torque: i16) -> Vec<u8> {
    let mut body = vec![0u8; 20];
    body[0..2].copy_from_slice(&type_of_stroke.to_le_bytes());
    body[2..4].copy_from_slice(&stroke_time.to_le_bytes());
    body[4..6].copy_from_slice(&max_torque.to_le_bytes());
    with_checksum(body)
}

pub fn aux_payload(digits: &[u8; 5], scaling_factor: u8) -> Vec<u8> {
    let mut payload = vec![0u8; 20];
    payload[3..8].copy_from_slice(digits);
    payload[12] = scaling_factor;
    payload
}

pub struct HeartbeatBuilder {
    body: [u8; HEARTBEAT_LEN - 2],
}

impl HeartbeatBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            body: [0u8; HEARTBEAT_LEN - 2],
        };
        builder.body[66] = 1;
        builder.body[67] = 1;
        builder
    }

    fn text(mut self, offset: usize, width: usize, value: &str) -> Self {
        let bytes = value.as_bytes();
        let len = bytes.len().min(width);
        self.body[offset..offset + len].copy_from_slice(&bytes[..len]);
        self
    }

    fn word(mut self, offset: usize, value: [u8; 2]) -> Self {
        self.body[offset..offset + 2].copy_from_slice(&value);
        self
    }

    pub fn firmware(self, value: &str) -> Self {
        self.text(0, 4, value)
    }

    pub fn serial(self, value: &str) -> Self {
        self.text(6, 16, value)
    }

    pub fn location(self, value: &str) -> Self {
        self.text(38, 26, value)
    }

    pub fn clock(mut self, year: u8, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        self.body[66..72].copy_from_slice(&[month, day, year, hour, minute, second]);
        self
    }

    pub fn temperature(self, value: i16) -> Self {
        self.word(72, value.to_le_bytes())
    }

    pub fn battery_voltage(self, value: u16) -> Self {
        self.word(74, value.to_le_bytes())
    }

    pub fn valve_counts(self, open: u16, close: u16) -> Self {
        self.word(77, open.to_le_bytes()).word(79, close.to_le_bytes())
    }

    pub fn sleep_torques(self, before: i16, after: i16) -> Self {
        self.word(81, before.to_le_bytes())
            .word(83, after.to_le_bytes())
    }

    pub fn build(self) -> Vec<u8> {
        with_checksum(self.body.to_vec())
    }
}
