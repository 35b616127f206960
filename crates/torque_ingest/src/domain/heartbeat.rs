use crate::domain::{crc16, ByteReader, PacketResult};
use chrono::{NaiveDate, NaiveDateTime};

pub const HEARTBEAT_LEN: usize = 96;

const OFF_FIRMWARE_VERSION: usize = 0;
const OFF_PWA_REVISION: usize = 4;
const OFF_SERIAL_NUMBER: usize = 6;
const OFF_DEVICE_TYPE: usize = 22;
const OFF_DEVICE_LOCATION: usize = 38;
const OFF_DEVICE_INFO_CRC: usize = 64;
const OFF_MONTH: usize = 66;
const OFF_DAY: usize = 67;
const OFF_YEAR: usize = 68;
const OFF_HOUR: usize = 69;
const OFF_MINUTE: usize = 70;
const OFF_SECOND: usize = 71;
// Firmware order; the device documentation lists battery voltage first
const OFF_TEMPERATURE: usize = 72;
const OFF_BATTERY_VOLTAGE: usize = 74;
const OFF_DIAGNOSTIC: usize = 76;
const OFF_OPEN_VALVE_COUNT: usize = 77;
const OFF_CLOSE_VALVE_COUNT: usize = 79;
const OFF_LAST_TORQUE_BEFORE_SLEEP: usize = 81;
const OFF_FIRST_TORQUE_AFTER_SLEEP: usize = 83;
const OFF_DATA_UNITS: usize = 85;
const OFF_CALIBRATION_FACTOR: usize = 86;
const OFF_PAYLOAD_CRC: usize = 94;

const YEAR_BASE: i32 = 2000;

/// Device status report sent once per wake cycle
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatRecord {
    pub firmware_version: String,
    pub pwa_revision: String,
    pub serial_number: String,
    pub device_type: String,
    pub device_location: String,
    /// Carried on the wire but never computed by firmware
    pub device_info_crc: u16,
    /// `None` when the clock fields do not form a valid date and time
    pub timestamp: Option<NaiveDateTime>,
    pub temperature: i16,
    pub battery_voltage: u16,
    pub diagnostic: u8,
    pub open_valve_count: u16,
    pub close_valve_count: u16,
    pub last_torque_before_sleep: i16,
    pub first_torque_after_sleep: i16,
    pub data_units: u8,
    pub calibration_factor: u8,
    pub payload_crc: u16,
    pub calculated_payload_crc: u16,
}

impl HeartbeatRecord {
    pub fn decode(payload: &[u8]) -> PacketResult<Self> {
        let reader = ByteReader::new("heartbeat", payload);
        reader.require(HEARTBEAT_LEN)?;

        let timestamp = device_timestamp(
            reader.u8(OFF_YEAR)?,
            reader.u8(OFF_MONTH)?,
            reader.u8(OFF_DAY)?,
            reader.u8(OFF_HOUR)?,
            reader.u8(OFF_MINUTE)?,
            reader.u8(OFF_SECOND)?,
        );

        Ok(Self {
            firmware_version: reader.cstr(OFF_FIRMWARE_VERSION, 4)?,
            pwa_revision: reader.cstr(OFF_PWA_REVISION, 2)?,
            serial_number: reader.cstr(OFF_SERIAL_NUMBER, 16)?,
            device_type: reader.cstr(OFF_DEVICE_TYPE, 16)?,
            device_location: reader.cstr(OFF_DEVICE_LOCATION, 26)?,
            device_info_crc: reader.u16(OFF_DEVICE_INFO_CRC)?,
            timestamp,
            temperature: reader.i16(OFF_TEMPERATURE)?,
            battery_voltage: reader.u16(OFF_BATTERY_VOLTAGE)?,
            diagnostic: reader.u8(OFF_DIAGNOSTIC)?,
            open_valve_count: reader.u16(OFF_OPEN_VALVE_COUNT)?,
            close_valve_count: reader.u16(OFF_CLOSE_VALVE_COUNT)?,
            last_torque_before_sleep: reader.i16(OFF_LAST_TORQUE_BEFORE_SLEEP)?,
            first_torque_after_sleep: reader.i16(OFF_FIRST_TORQUE_AFTER_SLEEP)?,
            data_units: reader.u8(OFF_DATA_UNITS)?,
            calibration_factor: reader.u8(OFF_CALIBRATION_FACTOR)?,
            payload_crc: reader.u16(OFF_PAYLOAD_CRC)?,
            calculated_payload_crc: crc16(reader.bytes(0, OFF_PAYLOAD_CRC)?),
        })
    }

    pub fn checksum_matches(&self) -> bool {
        self.payload_crc == self.calculated_payload_crc
    }
}

fn device_timestamp(
    year: u8,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(YEAR_BASE + i32::from(year), month.into(), day.into())?.and_hms_opt(
        hour.into(),
        minute.into(),
        second.into(),
    )
}
