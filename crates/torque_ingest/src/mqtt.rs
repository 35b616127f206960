pub(crate) mod subscriber;
mod topic;

pub use subscriber::{MqttSubscriber, MqttSubscriberConfig};
pub use topic::{parse_topic, ParsedTopic, TOPIC_FILTER};
