use crate::domain::{DataRecord, EventSummaryRecord, HeartbeatRecord};
use common::domain::{DeviceIdentity, TorqueEventFields, MISSING_RECORD_NUMBER};

/// How many slots past the current table a data record may land.
///
/// Larger leads come from corrupted sequence numbers and would otherwise
/// blow every later snapshot up to tens of thousands of missing slots.
pub const MAX_SEQUENCE_LEAD: usize = 128;

/// One placed data record
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub samples: Vec<i16>,
    pub payload_crc: u16,
    pub calculated_payload_crc: u16,
}

impl Fragment {
    pub fn checksum_matches(&self) -> bool {
        self.payload_crc == self.calculated_payload_crc
    }
}

impl From<DataRecord> for Fragment {
    fn from(record: DataRecord) -> Self {
        Self {
            samples: record.samples,
            payload_crc: record.payload_crc,
            calculated_payload_crc: record.calculated_payload_crc,
        }
    }
}

/// Result of placing a fragment into its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentPlacement {
    Placed,
    /// The slot already held a fragment with the same sequence number
    Overwritten,
}

/// In-progress (or sealed) reconstruction of one actuation stroke.
///
/// Fragments live in a sparse table indexed by `sequence - 1`; slots that
/// have not received a packet are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledEvent {
    device_identity: DeviceIdentity,
    fragments: Vec<Option<Fragment>>,
    heartbeat: Option<HeartbeatRecord>,
    summary: Option<EventSummaryRecord>,
    is_streaming: bool,
    hidden_data_indices: Vec<u16>,
}

impl AssembledEvent {
    pub fn new(device_identity: DeviceIdentity) -> Self {
        Self {
            device_identity,
            fragments: Vec::new(),
            heartbeat: None,
            summary: None,
            is_streaming: true,
            hidden_data_indices: Vec::new(),
        }
    }

    pub fn device_identity(&self) -> &DeviceIdentity {
        &self.device_identity
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn heartbeat(&self) -> Option<&HeartbeatRecord> {
        self.heartbeat.as_ref()
    }

    pub fn summary(&self) -> Option<&EventSummaryRecord> {
        self.summary.as_ref()
    }

    pub fn hidden_data_indices(&self) -> &[u16] {
        &self.hidden_data_indices
    }

    /// Sparse fragment table; index `i` holds sequence number `i + 1`
    pub fn fragments(&self) -> &[Option<Fragment>] {
        &self.fragments
    }

    pub fn fragment(&self, sequence: u16) -> Option<&Fragment> {
        let index = usize::from(sequence).checked_sub(1)?;
        self.fragments.get(index)?.as_ref()
    }

    /// Number of fragments actually received
    pub fn received_fragments(&self) -> usize {
        self.fragments.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.heartbeat.is_none() && self.summary.is_none() && self.fragments.is_empty()
    }

    pub fn merge_heartbeat(&mut self, heartbeat: HeartbeatRecord) {
        self.heartbeat = Some(heartbeat);
    }

    /// Whether `sequence` is within [`MAX_SEQUENCE_LEAD`] slots of the table
    pub fn within_reach(&self, sequence: u16) -> bool {
        usize::from(sequence) <= self.fragments.len() + MAX_SEQUENCE_LEAD
    }

    /// Place a data record at slot `sequence - 1`, growing the table with
    /// missing slots as needed.
    ///
    /// Callers guarantee `sequence >= 1`; the data decoder rejects 0.
    pub fn place_fragment(&mut self, record: DataRecord) -> FragmentPlacement {
        let index = usize::from(record.sequence).saturating_sub(1);
        if self.fragments.len() <= index {
            self.fragments.resize(index + 1, None);
        }

        match self.fragments[index].replace(Fragment::from(record)) {
            Some(_) => FragmentPlacement::Overwritten,
            None => FragmentPlacement::Placed,
        }
    }

    /// Attach the summary, record the hide-list and stop streaming.
    pub fn seal(&mut self, summary: EventSummaryRecord, hidden_data_indices: Vec<u16>) {
        self.summary = Some(summary);
        self.hidden_data_indices = hidden_data_indices;
        self.is_streaming = false;
    }

    /// Samples of every received fragment, in sequence order
    pub fn flattened_samples(&self) -> Vec<i16> {
        self.fragments
            .iter()
            .flatten()
            .flat_map(|fragment| fragment.samples.iter().copied())
            .collect()
    }

    pub fn record_numbers(&self) -> Vec<i32> {
        self.fragments
            .iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Some(_) => index as i32 + 1,
                None => MISSING_RECORD_NUMBER,
            })
            .collect()
    }

    pub fn record_lengths(&self) -> Vec<u32> {
        self.fragments
            .iter()
            .map(|slot| slot.as_ref().map_or(0, |f| f.samples.len() as u32))
            .collect()
    }

    /// Flatten into the persisted record shape
    pub fn to_fields(&self) -> TorqueEventFields {
        let mut fields = TorqueEventFields::new(self.device_identity.clone());
        fields.is_streaming = self.is_streaming;

        if let Some(heartbeat) = &self.heartbeat {
            fields.timestamp = heartbeat.timestamp;
            fields.firmware_version = heartbeat.firmware_version.clone();
            fields.pwa_revision = heartbeat.pwa_revision.clone();
            fields.serial_number = heartbeat.serial_number.clone();
            fields.device_type = heartbeat.device_type.clone();
            fields.device_location = heartbeat.device_location.clone();
            fields.diagnostic = heartbeat.diagnostic;
            fields.open_valve_count = heartbeat.open_valve_count;
            fields.close_valve_count = heartbeat.close_valve_count;
            fields.temperature = heartbeat.temperature;
            fields.battery_voltage = heartbeat.battery_voltage;
            fields.last_torque_before_sleep = heartbeat.last_torque_before_sleep;
            fields.first_torque_after_sleep = heartbeat.first_torque_after_sleep;
            fields.heartbeat_record_payload_crc = Some(heartbeat.payload_crc);
            fields.calculated_heartbeat_record_payload_crc =
                Some(heartbeat.calculated_payload_crc);
        }

        if let Some(summary) = &self.summary {
            fields.type_of_stroke = summary.type_of_stroke;
            fields.stroke_time = summary.stroke_time;
            fields.max_torque = summary.max_torque;
            fields.event_record_payload_crc = Some(summary.payload_crc);
            fields.calculated_event_record_payload_crc = Some(summary.calculated_payload_crc);
        }

        fields.torque_data = self.flattened_samples();
        fields.record_numbers = self.record_numbers();
        fields.record_lengths = self.record_lengths();
        fields.hidden_data_indices = self.hidden_data_indices.clone();
        fields.data_record_payload_crcs = self
            .fragments
            .iter()
            .map(|slot| slot.as_ref().map(|f| f.payload_crc))
            .collect();
        fields.calculated_data_record_payload_crcs = self
            .fragments
            .iter()
            .map(|slot| slot.as_ref().map(|f| f.calculated_payload_crc))
            .collect();

        fields
    }
}
