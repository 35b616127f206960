use crate::domain::{DispatchError, IngestDispatcher, PacketDump};
use common::domain::{DomainError, DomainResult};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet as MqttPacket, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

const DEFAULT_MQTT_PORT: u16 = 1883;

#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    /// `mqtt://host:port`, `tcp://host:port` or bare `host[:port]`
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_filter: String,
    pub keep_alive_secs: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Capacity of the client's request channel
    pub channel_capacity: usize,
}

impl MqttSubscriberConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Long-running MQTT client feeding every received publish into ingest.
///
/// The event loop only dumps and dispatches; ingest itself runs on the
/// dispatcher's shard workers. Subscribes with QoS 2. Connection failures are retried up to
/// `max_retry_attempts` consecutive times; a successful connection resets
/// the count.
pub struct MqttSubscriber {
    config: MqttSubscriberConfig,
    dispatcher: Arc<IngestDispatcher>,
    dump: Option<Arc<PacketDump>>,
}

impl MqttSubscriber {
    pub fn new(
        config: MqttSubscriberConfig,
        dispatcher: Arc<IngestDispatcher>,
        dump: Option<Arc<PacketDump>>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            dump,
        }
    }

    #[instrument(
        name = "mqtt_subscriber",
        skip_all,
        fields(broker_url = %self.config.broker_url, topic_filter = %self.config.topic_filter)
    )]
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!("starting MQTT subscriber");

        let mut retry_count = 0;

        loop {
            if ctx.is_cancelled() {
                debug!("MQTT subscriber cancelled before connection");
                break;
            }

            match self.run_connection(&ctx, &mut retry_count).await {
                Ok(()) => {
                    debug!("MQTT subscriber stopped cleanly");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "MQTT connection error");

                    retry_count += 1;
                    if retry_count >= self.config.max_retry_attempts {
                        error!(
                            max_retries = self.config.max_retry_attempts,
                            "max retry attempts reached, stopping MQTT subscriber"
                        );
                        return Err(anyhow::anyhow!(
                            "MQTT subscriber gave up after {} attempts: {}",
                            retry_count,
                            e
                        ));
                    }

                    warn!(
                        attempt = retry_count,
                        max_attempts = self.config.max_retry_attempts,
                        "retrying MQTT connection"
                    );

                    tokio::select! {
                        _ = ctx.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_delay()) => {}
                    }
                }
            }
        }

        info!("MQTT subscriber stopped");
        Ok(())
    }

    async fn run_connection(
        &self,
        ctx: &CancellationToken,
        retry_count: &mut u32,
    ) -> DomainResult<()> {
        let (host, port) = parse_broker_url(&self.config.broker_url)?;

        let mut mqtt_options = MqttOptions::new(&self.config.client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        mqtt_options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            mqtt_options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, self.config.channel_capacity);

        client
            .subscribe(&self.config.topic_filter, QoS::ExactlyOnce)
            .await
            .map_err(|e| {
                DomainError::RepositoryError(anyhow::anyhow!("failed to subscribe: {}", e))
            })?;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("shutdown signal received");
                    let _ = client.disconnect().await;
                    return Ok(());
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(MqttPacket::Publish(publish))) => {
                            self.handle_message(&publish.topic, &publish.payload).await;
                        }
                        Ok(Event::Incoming(MqttPacket::ConnAck(_))) => {
                            info!("connected to MQTT broker");
                            *retry_count = 0;
                        }
                        Ok(Event::Incoming(MqttPacket::SubAck(_))) => {
                            info!(topic = %self.config.topic_filter, "subscription acknowledged");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            return Err(DomainError::RepositoryError(anyhow::anyhow!(
                                "MQTT event loop error: {}",
                                e
                            )));
                        }
                    }
                }
            }
        }
    }

    /// Dump and dispatch one publish in its own root span.
    ///
    /// Never waits on an ingest queue; errors are logged and nothing here
    /// stops the event loop.
    pub(crate) async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let span = info_span!(
            parent: Span::none(),
            "mqtt_message",
            topic = %topic,
            payload_size = payload.len(),
        );

        async {
            if let Some(dump) = &self.dump {
                if let Err(e) = dump.write(topic, payload, chrono::Utc::now()).await {
                    warn!(error = %e, dir = %dump.dir().display(), "failed to dump packet");
                }
            }

            match self.dispatcher.dispatch(topic, payload, Span::current()) {
                Ok(shard) => debug!(shard, "packet dispatched"),
                Err(DispatchError::Packet(e)) => {
                    warn!(error = %e, "rejected packet");
                }
                Err(e) => {
                    error!(error = %e, "failed to dispatch packet");
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
pub fn parse_broker_url(url: &str) -> DomainResult<(&str, u16)> {
    let address = url.trim_start_matches("mqtt://").trim_start_matches("tcp://");

    match address.split_once(':') {
        None if !address.is_empty() => Ok((address, DEFAULT_MQTT_PORT)),
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| {
                DomainError::InvalidConfig(format!("invalid port in broker URL: {}", port))
            })?;
            Ok((host, port))
        }
        _ => Err(DomainError::InvalidConfig(format!(
            "invalid broker URL format: {}",
            url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::data_payload;
    use crate::domain::{
        ChannelSessionUpdatePublisher, IngestService, IngestShardWorker, SessionRegistry,
        SessionUpdate,
    };
    use tokio::sync::mpsc;

    fn config() -> MqttSubscriberConfig {
        MqttSubscriberConfig {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "torque-test".to_string(),
            username: None,
            password: None,
            topic_filter: crate::mqtt::TOPIC_FILTER.to_string(),
            keep_alive_secs: 30,
            max_retry_attempts: 2,
            retry_delay_ms: 10,
            channel_capacity: 10,
        }
    }

    fn subscriber(
        dump: Option<Arc<PacketDump>>,
    ) -> (
        MqttSubscriber,
        Vec<IngestShardWorker>,
        Vec<mpsc::Receiver<SessionUpdate>>,
    ) {
        let (publisher, updates) = ChannelSessionUpdatePublisher::new(1, 8).unwrap();
        let service = IngestService::new(Arc::new(SessionRegistry::new()), Arc::new(publisher));
        let (dispatcher, workers) = IngestDispatcher::new(Arc::new(service), 1, 8).unwrap();
        (
            MqttSubscriber::new(config(), Arc::new(dispatcher), dump),
            workers,
            updates,
        )
    }

    #[test]
    fn test_parse_broker_url_with_port() {
        assert_eq!(parse_broker_url("mqtt://localhost:1883").unwrap(), ("localhost", 1883));
    }

    #[test]
    fn test_parse_broker_url_without_scheme() {
        assert_eq!(
            parse_broker_url("broker.example.com:8883").unwrap(),
            ("broker.example.com", 8883)
        );
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        assert_eq!(parse_broker_url("tcp://broker.local").unwrap(), ("broker.local", 1883));
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
        assert!(parse_broker_url("mqtt://").is_err());
        assert!(parse_broker_url(":1883").is_err());
    }

    #[tokio::test]
    async fn test_handle_message_dumps_and_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let dump = Arc::new(PacketDump::open(dir.path()).await.unwrap());

        let (subscriber, mut workers, mut updates) = subscriber(Some(dump));
        subscriber
            .handle_message("sensors/dev-1/port/13", &data_payload(1, &[1, 2]))
            .await;

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);

        // Nothing is ingested until the shard worker runs
        assert!(updates[0].try_recv().is_err());

        let ctx = CancellationToken::new();
        ctx.cancel();
        workers.remove(0).run(ctx).await.unwrap();

        let update = updates[0].recv().await.unwrap();
        assert!(matches!(update, SessionUpdate::EventProgress(ref f) if f.torque_data == vec![1, 2]));
    }

    #[tokio::test]
    async fn test_handle_message_invalid_topic_is_dropped() {
        let (subscriber, mut workers, mut updates) = subscriber(None);
        subscriber.handle_message("invalid-topic", &[0x01]).await;

        let ctx = CancellationToken::new();
        ctx.cancel();
        workers.remove(0).run(ctx).await.unwrap();

        assert!(updates[0].try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let (subscriber, _workers, _updates) = subscriber(None);
        let ctx = CancellationToken::new();
        ctx.cancel();

        subscriber.run(ctx).await.unwrap();
    }
}
