use crate::domain::{PacketError, PacketPort, PacketResult};
use common::domain::DeviceIdentity;

/// Subscription filter covering every device and port
pub const TOPIC_FILTER: &str = "sensors/+/port/+";

const TOPIC_ROOT: &str = "sensors";
const PORT_SEGMENT: &str = "port";

/// Parsed MQTT topic containing the sending device and packet port
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub device_identity: DeviceIdentity,
    pub port: PacketPort,
}

/// Parse an MQTT topic in the format `sensors/{device}/port/{port}`
///
/// The port must be one of the known packet ports.
///
/// # Examples
/// ```
/// use torque_ingest::mqtt::parse_topic;
/// use torque_ingest::PacketPort;
///
/// let parsed = parse_topic("sensors/70b3d57ed0001234/port/13").unwrap();
/// assert_eq!(parsed.device_identity.as_str(), "70b3d57ed0001234");
/// assert_eq!(parsed.port, PacketPort::Data);
/// ```
pub fn parse_topic(topic: &str) -> PacketResult<ParsedTopic> {
    let topic = topic.trim();
    let parts: Vec<&str> = topic.split('/').collect();

    let [root, device, port_segment, port] = parts.as_slice() else {
        return Err(PacketError::InvalidTopic(topic.to_string()));
    };

    if *root != TOPIC_ROOT || *port_segment != PORT_SEGMENT || device.is_empty() {
        return Err(PacketError::InvalidTopic(topic.to_string()));
    }

    let number = port
        .parse::<u16>()
        .map_err(|_| PacketError::UnknownPort(port.to_string()))?;

    match PacketPort::from(number) {
        PacketPort::Unknown(_) => Err(PacketError::UnknownPort(port.to_string())),
        port => Ok(ParsedTopic {
            device_identity: DeviceIdentity::new(*device),
            port,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_topics() {
        for (topic, port) in [
            ("sensors/dev-1/port/12", PacketPort::Heartbeat),
            ("sensors/dev-1/port/13", PacketPort::Data),
            ("sensors/dev-1/port/14", PacketPort::EventSummary),
            ("sensors/dev-1/port/15", PacketPort::Auxiliary),
        ] {
            let parsed = parse_topic(topic).unwrap();
            assert_eq!(parsed.device_identity.as_str(), "dev-1");
            assert_eq!(parsed.port, port);
        }
    }

    #[test]
    fn test_parse_topic_trims_whitespace() {
        let parsed = parse_topic(" sensors/abc/port/12\n").unwrap();
        assert_eq!(parsed.device_identity.as_str(), "abc");
    }

    #[test]
    fn test_parse_topic_wrong_segment_count() {
        assert!(matches!(
            parse_topic("sensors/dev-1/port"),
            Err(PacketError::InvalidTopic(_))
        ));
        assert!(matches!(
            parse_topic("sensors/dev-1/port/13/extra"),
            Err(PacketError::InvalidTopic(_))
        ));
        assert!(matches!(parse_topic(""), Err(PacketError::InvalidTopic(_))));
    }

    #[test]
    fn test_parse_topic_missing_port_literal() {
        assert!(matches!(
            parse_topic("sensors/dev-1/ports/13"),
            Err(PacketError::InvalidTopic(_))
        ));
        assert!(matches!(
            parse_topic("devices/dev-1/port/13"),
            Err(PacketError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_parse_topic_empty_device() {
        assert!(matches!(
            parse_topic("sensors//port/13"),
            Err(PacketError::InvalidTopic(_))
        ));
    }

    #[test]
    fn test_parse_topic_bad_ports() {
        assert_eq!(
            parse_topic("sensors/dev-1/port/abc"),
            Err(PacketError::UnknownPort("abc".to_string()))
        );
        assert_eq!(
            parse_topic("sensors/dev-1/port/16"),
            Err(PacketError::UnknownPort("16".to_string()))
        );
    }
}
