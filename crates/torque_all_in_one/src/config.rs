use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use torque_ingest::mqtt::{MqttSubscriberConfig, TOPIC_FILTER};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // MQTT configuration
    /// Disable to run replay-only without a broker
    #[serde(default = "default_mqtt_enabled")]
    pub mqtt_enabled: bool,

    /// Broker URL: `mqtt://host:port`, `tcp://host:port` or `host[:port]`
    #[serde(default = "default_mqtt_broker_url")]
    pub mqtt_broker_url: String,

    #[serde(default = "default_mqtt_client_id")]
    pub mqtt_client_id: String,

    #[serde(default)]
    pub mqtt_username: Option<String>,

    #[serde(default)]
    pub mqtt_password: Option<String>,

    #[serde(default = "default_mqtt_topic_filter")]
    pub mqtt_topic_filter: String,

    #[serde(default = "default_mqtt_keep_alive_secs")]
    pub mqtt_keep_alive_secs: u64,

    /// Consecutive connection failures tolerated before the subscriber gives up
    #[serde(default = "default_mqtt_max_retry_attempts")]
    pub mqtt_max_retry_attempts: u32,

    #[serde(default = "default_mqtt_retry_delay_ms")]
    pub mqtt_retry_delay_ms: u64,

    #[serde(default = "default_mqtt_channel_capacity")]
    pub mqtt_channel_capacity: usize,

    // Persistence configuration
    /// Number of persistence workers (one update queue each); also the
    /// number of ingest shards
    #[serde(default = "default_persistence_workers")]
    pub persistence_workers: usize,

    /// Bounded capacity of each persistence queue and each ingest queue
    #[serde(default = "default_persistence_queue_capacity")]
    pub persistence_queue_capacity: usize,

    // Packet dump / replay
    /// Write every received payload here when set
    #[serde(default)]
    pub packet_dump_dir: Option<PathBuf>,

    /// Feed previously dumped packets from here on startup when set
    #[serde(default)]
    pub replay_dir: Option<PathBuf>,

    // Telemetry configuration
    #[serde(default = "default_otel_enabled")]
    pub otel_enabled: bool,

    #[serde(default = "default_otel_endpoint")]
    pub otel_endpoint: String,

    #[serde(default = "default_otel_service_name")]
    pub otel_service_name: String,

    /// Time allowed for processes to wind down and closers to run
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_mqtt_enabled() -> bool {
    true
}

fn default_mqtt_broker_url() -> String {
    "mqtt://localhost:1883".to_string()
}

fn default_mqtt_client_id() -> String {
    "torque-ingest".to_string()
}

fn default_mqtt_topic_filter() -> String {
    TOPIC_FILTER.to_string()
}

fn default_mqtt_keep_alive_secs() -> u64 {
    30
}

fn default_mqtt_max_retry_attempts() -> u32 {
    10
}

fn default_mqtt_retry_delay_ms() -> u64 {
    5000
}

fn default_mqtt_channel_capacity() -> usize {
    100
}

fn default_persistence_workers() -> usize {
    4
}

fn default_persistence_queue_capacity() -> usize {
    1024
}

fn default_otel_enabled() -> bool {
    false
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_otel_service_name() -> String {
    "torque-ingest".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("TORQUE"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt_username.is_some() != self.mqtt_password.is_some() {
            return Err(ConfigError::Message(
                "TORQUE_MQTT_USERNAME and TORQUE_MQTT_PASSWORD must be set together".to_string(),
            ));
        }
        if self.persistence_workers == 0 {
            return Err(ConfigError::Message(
                "TORQUE_PERSISTENCE_WORKERS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Subscriber settings, or `None` when MQTT is disabled
    pub fn mqtt_subscriber_config(&self) -> Option<MqttSubscriberConfig> {
        if !self.mqtt_enabled {
            return None;
        }

        Some(MqttSubscriberConfig {
            broker_url: self.mqtt_broker_url.clone(),
            client_id: self.mqtt_client_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            topic_filter: self.mqtt_topic_filter.clone(),
            keep_alive_secs: self.mqtt_keep_alive_secs,
            max_retry_attempts: self.mqtt_max_retry_attempts,
            retry_delay_ms: self.mqtt_retry_delay_ms,
            channel_capacity: self.mqtt_channel_capacity,
        })
    }
}
