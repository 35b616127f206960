//! CRC-16/CCITT as computed by the actuator firmware.
//!
//! The firmware pairs the MSB-first lookup table for polynomial 0x1021 with a
//! right-shifting (reflected) update and an initial value of 0xFFFF, with no
//! final XOR. The result matches none of the catalogued CRC-16 variants, so
//! the table and update are reproduced exactly rather than taken from a
//! generic CRC implementation.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Width in bytes of the checksum word that trails every checksummed payload
pub const CHECKSUM_WIDTH: usize = 2;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the firmware checksum over `bytes`
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(INITIAL, |crc, &byte| {
        TABLE[((crc ^ u16::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}
