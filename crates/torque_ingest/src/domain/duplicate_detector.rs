use crate::domain::AssembledEvent;

/// Sequence numbers of `current` whose trailing fragments restate the
/// trailing fragments of `previous`.
///
/// Both fragment tables are walked backward in lock-step from their last
/// slot. A step matches when both slots hold a fragment with identical
/// samples and identical embedded checksum. The walk stops at the first
/// mismatch, at a missing slot on either side, or when either side runs
/// out. Only a shared tail is detected; matches elsewhere are not.
///
/// The result is ascending.
pub fn find_duplicate_tail(current: &AssembledEvent, previous: &AssembledEvent) -> Vec<u16> {
    let mut hidden: Vec<u16> = current
        .fragments()
        .iter()
        .enumerate()
        .rev()
        .zip(previous.fragments().iter().rev())
        .map_while(|((index, ours), theirs)| match (ours, theirs) {
            (Some(ours), Some(theirs))
                if ours.samples == theirs.samples && ours.payload_crc == theirs.payload_crc =>
            {
                u16::try_from(index + 1).ok()
            }
            _ => None,
        })
        .collect();

    hidden.reverse();
    hidden
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::data_payload;
    use crate::domain::DataRecord;
    use common::domain::DeviceIdentity;

    fn event_with(fragments: &[(u16, &[i16])]) -> AssembledEvent {
        let mut event = AssembledEvent::new(DeviceIdentity::new("dev-1"));
        for (sequence, samples) in fragments {
            event.place_fragment(DataRecord::decode(&data_payload(*sequence, samples)).unwrap());
        }
        event
    }

    #[test]
    fn test_matching_tail_of_k_fragments() {
        let previous = event_with(&[(1, &[1, 1]), (2, &[2, 2]), (3, &[3, 3]), (4, &[4, 4])]);
        let current = event_with(&[(1, &[9]), (2, &[8]), (3, &[3, 3]), (4, &[4, 4])]);

        assert_eq!(find_duplicate_tail(&current, &previous), vec![3, 4]);
    }

    #[test]
    fn test_equal_samples_at_other_positions_do_not_match() {
        // Embedded checksums cover the sequence number, so a restated
        // fragment only matches at the same position.
        let previous = event_with(&[(1, &[1, 1]), (2, &[2, 2]), (3, &[3, 3])]);
        let current = event_with(&[(1, &[2, 2]), (2, &[3, 3])]);

        assert!(find_duplicate_tail(&current, &previous).is_empty());
    }

    #[test]
    fn test_stops_at_first_mismatch_walking_backward() {
        let previous = event_with(&[(1, &[1]), (2, &[2]), (3, &[3])]);
        let current = event_with(&[(1, &[1]), (2, &[7]), (3, &[3])]);

        // Slot 1 matches too, but it is not part of the contiguous tail
        assert_eq!(find_duplicate_tail(&current, &previous), vec![3]);
    }

    #[test]
    fn test_identical_events_hide_everything() {
        let previous = event_with(&[(1, &[5, 6]), (2, &[7])]);
        let current = previous.clone();
        assert_eq!(find_duplicate_tail(&current, &previous), vec![1, 2]);
    }

    #[test]
    fn test_missing_slot_stops_walk() {
        let previous = event_with(&[(1, &[1]), (2, &[2]), (3, &[3])]);
        let current = event_with(&[(1, &[1]), (3, &[3])]);

        assert_eq!(find_duplicate_tail(&current, &previous), vec![3]);
    }

    #[test]
    fn test_checksum_difference_is_a_mismatch() {
        let previous = event_with(&[(1, &[1, 2])]);
        let mut payload = data_payload(1, &[1, 2]);
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let mut current = AssembledEvent::new(DeviceIdentity::new("dev-1"));
        current.place_fragment(DataRecord::decode(&payload).unwrap());

        assert!(find_duplicate_tail(&current, &previous).is_empty());
    }

    #[test]
    fn test_empty_side_yields_nothing() {
        let previous = AssembledEvent::new(DeviceIdentity::new("dev-1"));
        let current = event_with(&[(1, &[1])]);
        assert!(find_duplicate_tail(&current, &previous).is_empty());
        assert!(find_duplicate_tail(&previous, &current).is_empty());
    }
}
