use crate::domain::{DeviceIdentity, DomainResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record number reported for a fragment slot that never received a packet
pub const MISSING_RECORD_NUMBER: i32 = -1;

/// Identifier assigned by the persistence collaborator to a stored torque event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stroke type reported by the event-summary record.
///
/// Firmware uses three values even though the device documentation lists two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeType {
    Undefined,
    Open,
    Closed,
    Unrecognized(u16),
}

impl StrokeType {
    pub fn code(&self) -> u16 {
        match self {
            StrokeType::Undefined => 0,
            StrokeType::Open => 1,
            StrokeType::Closed => 2,
            StrokeType::Unrecognized(code) => *code,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrokeType::Open => "Open",
            StrokeType::Closed => "Close",
            StrokeType::Undefined | StrokeType::Unrecognized(_) => "N/A",
        }
    }
}

impl From<u16> for StrokeType {
    fn from(code: u16) -> Self {
        match code {
            0 => StrokeType::Undefined,
            1 => StrokeType::Open,
            2 => StrokeType::Closed,
            other => StrokeType::Unrecognized(other),
        }
    }
}

/// Flattened, persistence-ready view of one actuation stroke.
///
/// This is both what the live upsert policy writes through
/// [`TorqueEventRepository`] and what downstream consumers read back.
/// Fragment-level vectors are aligned by slot: index `i` describes the
/// fragment with sequence number `i + 1`, and slots that never received a
/// packet carry [`MISSING_RECORD_NUMBER`], a length of 0 and `None` checksums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorqueEventFields {
    pub device_identity: DeviceIdentity,
    pub timestamp: Option<NaiveDateTime>,
    pub is_streaming: bool,

    // Device information (heartbeat)
    pub firmware_version: String,
    pub pwa_revision: String,
    pub serial_number: String,
    pub device_type: String,
    pub device_location: String,
    pub diagnostic: u8,
    pub open_valve_count: u16,
    pub close_valve_count: u16,

    // Trend information
    pub stroke_time: u16,
    pub max_torque: i16,
    pub temperature: i16,
    pub battery_voltage: u16,

    // Stroke data
    pub last_torque_before_sleep: i16,
    pub first_torque_after_sleep: i16,
    pub record_numbers: Vec<i32>,
    pub record_lengths: Vec<u32>,
    pub torque_data: Vec<i16>,
    pub hidden_data_indices: Vec<u16>,
    pub type_of_stroke: u16,

    // Integrity
    pub data_record_payload_crcs: Vec<Option<u16>>,
    pub calculated_data_record_payload_crcs: Vec<Option<u16>>,
    pub event_record_payload_crc: Option<u16>,
    pub calculated_event_record_payload_crc: Option<u16>,
    pub heartbeat_record_payload_crc: Option<u16>,
    pub calculated_heartbeat_record_payload_crc: Option<u16>,
}

impl TorqueEventFields {
    /// Empty record for a device that has not reported anything yet
    pub fn new(device_identity: DeviceIdentity) -> Self {
        Self {
            device_identity,
            timestamp: None,
            is_streaming: true,
            firmware_version: String::new(),
            pwa_revision: String::new(),
            serial_number: String::new(),
            device_type: String::new(),
            device_location: String::new(),
            diagnostic: 0,
            open_valve_count: 0,
            close_valve_count: 0,
            stroke_time: 0,
            max_torque: 0,
            temperature: 0,
            battery_voltage: 0,
            last_torque_before_sleep: 0,
            first_torque_after_sleep: 0,
            record_numbers: Vec::new(),
            record_lengths: Vec::new(),
            torque_data: Vec::new(),
            hidden_data_indices: Vec::new(),
            type_of_stroke: 0,
            data_record_payload_crcs: Vec::new(),
            calculated_data_record_payload_crcs: Vec::new(),
            event_record_payload_crc: None,
            calculated_event_record_payload_crc: None,
            heartbeat_record_payload_crc: None,
            calculated_heartbeat_record_payload_crc: None,
        }
    }

    pub fn stroke_type(&self) -> StrokeType {
        StrokeType::from(self.type_of_stroke)
    }

    /// Whether every received data record's embedded checksum matched
    pub fn data_checksums_match(&self) -> bool {
        self.data_record_payload_crcs
            .iter()
            .zip(&self.calculated_data_record_payload_crcs)
            .all(|(embedded, computed)| embedded == computed)
    }

    /// Copy of this record with every hidden packet's samples, record number
    /// and length removed.
    ///
    /// Slots that never received a packet are kept so gaps stay visible.
    pub fn without_hidden_packets(&self) -> Self {
        let mut visible = self.clone();
        visible.torque_data = Vec::with_capacity(self.torque_data.len());
        visible.record_numbers = Vec::with_capacity(self.record_numbers.len());
        visible.record_lengths = Vec::with_capacity(self.record_lengths.len());

        let mut offset = 0usize;
        for (&number, &length) in self.record_numbers.iter().zip(&self.record_lengths) {
            let length = length as usize;
            let end = (offset + length).min(self.torque_data.len());
            let hidden = u16::try_from(number)
                .map(|sequence| self.hidden_data_indices.contains(&sequence))
                .unwrap_or(false);

            if !hidden {
                visible
                    .torque_data
                    .extend_from_slice(&self.torque_data[offset..end]);
                visible.record_numbers.push(number);
                visible.record_lengths.push(length as u32);
            }
            offset = end;
        }

        visible
    }
}

/// Stored torque event as returned by the persistence collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct TorqueEvent {
    pub id: EventId,
    pub fields: TorqueEventFields,
}

impl TorqueEvent {
    pub fn is_streaming(&self) -> bool {
        self.fields.is_streaming
    }
}

/// Persistence collaborator for torque events.
///
/// The ingest core only decides *what* to write; storage mechanics live in
/// the implementation (in-memory, PostgreSQL, ...).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TorqueEventRepository: Send + Sync {
    /// Find the still-streaming event for a device and wake cycle.
    ///
    /// `heartbeat_checksum` is the embedded heartbeat checksum of the cycle,
    /// or `None` when no heartbeat has been seen for it yet.
    async fn find_active_streaming_event(
        &self,
        device_identity: &DeviceIdentity,
        heartbeat_checksum: Option<u16>,
    ) -> DomainResult<Option<TorqueEvent>>;

    /// Persist a new event and return its identifier
    async fn create_event(&self, fields: TorqueEventFields) -> DomainResult<EventId>;

    /// Overwrite an existing event's fields.
    ///
    /// Implementations apply `is_streaming` last so a sealing update never
    /// leaves a sealed record with stale data.
    async fn update_event(&self, id: EventId, fields: TorqueEventFields) -> DomainResult<()>;
}
