use crate::domain::{
    replay_directory, ChannelSessionUpdatePublisher, IngestDispatcher, IngestService,
    IngestShardWorker, LiveUpsertPolicy, PacketDump, PersistenceWorker, SessionRegistry,
};
use crate::mqtt::{MqttSubscriber, MqttSubscriberConfig};
use anyhow::Context;
use common::domain::{AuxReadingRepository, TorqueEventRepository};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A named long-running process handed to the runner
pub type IngestProcess = (
    String,
    Box<
        dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
            + Send,
    >,
);

pub struct TorqueIngestConfig {
    /// `None` runs without a broker connection (replay only)
    pub mqtt: Option<MqttSubscriberConfig>,
    /// Shard count shared by the ingest and persistence stages
    pub persistence_workers: usize,
    /// Capacity of each ingest queue and each persistence queue
    pub persistence_queue_capacity: usize,
    pub packet_dump_dir: Option<PathBuf>,
    pub replay_dir: Option<PathBuf>,
}

/// Wires the ingest pipeline: subscriber → ingest shards (or replay) →
/// sessions → persistence queues → persistence workers.
pub struct TorqueIngest {
    service: Arc<IngestService>,
    subscriber: Option<MqttSubscriber>,
    ingest_shards: Vec<IngestShardWorker>,
    workers: Vec<PersistenceWorker>,
    replay_dir: Option<PathBuf>,
}

impl TorqueIngest {
    pub async fn new(
        config: TorqueIngestConfig,
        event_repository: Arc<dyn TorqueEventRepository>,
        aux_repository: Arc<dyn AuxReadingRepository>,
    ) -> anyhow::Result<Self> {
        debug!("initializing torque ingest module");

        let (publisher, receivers) = ChannelSessionUpdatePublisher::new(
            config.persistence_workers,
            config.persistence_queue_capacity,
        )?;

        let upsert_policy = Arc::new(LiveUpsertPolicy::new(event_repository));
        let workers = receivers
            .into_iter()
            .enumerate()
            .map(|(shard, receiver)| {
                PersistenceWorker::new(
                    shard,
                    receiver,
                    Arc::clone(&upsert_policy),
                    Arc::clone(&aux_repository),
                )
            })
            .collect();

        let service = Arc::new(IngestService::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(publisher),
        ));

        let dump = match &config.packet_dump_dir {
            Some(dir) => {
                let dump = PacketDump::open(dir.clone())
                    .await
                    .with_context(|| format!("failed to open packet dump dir {}", dir.display()))?;
                info!(dir = %dir.display(), "dumping received packets");
                Some(Arc::new(dump))
            }
            None => None,
        };

        let (subscriber, ingest_shards) = match config.mqtt {
            Some(mqtt) => {
                let (dispatcher, ingest_shards) = IngestDispatcher::new(
                    Arc::clone(&service),
                    config.persistence_workers,
                    config.persistence_queue_capacity,
                )?;
                let subscriber = MqttSubscriber::new(mqtt, Arc::new(dispatcher), dump);
                (Some(subscriber), ingest_shards)
            }
            None => (None, Vec::new()),
        };

        Ok(Self {
            service,
            subscriber,
            ingest_shards,
            workers,
            replay_dir: config.replay_dir,
        })
    }

    pub fn service(&self) -> Arc<IngestService> {
        Arc::clone(&self.service)
    }

    pub fn into_runner_processes(self) -> Vec<IngestProcess> {
        let mut processes: Vec<IngestProcess> = Vec::new();

        for (shard, worker) in self.workers.into_iter().enumerate() {
            processes.push((
                format!("persistence-worker-{}", shard),
                Box::new(move |ctx| Box::pin(async move { worker.run(ctx).await })),
            ));
        }

        for shard in self.ingest_shards {
            processes.push((
                format!("ingest-shard-{}", shard.shard()),
                Box::new(move |ctx| Box::pin(async move { shard.run(ctx).await })),
            ));
        }

        if let Some(subscriber) = self.subscriber {
            processes.push((
                "mqtt-subscriber".to_string(),
                Box::new(move |ctx| Box::pin(async move { subscriber.run(ctx).await })),
            ));
        }

        if let Some(dir) = self.replay_dir {
            let service = self.service;
            processes.push((
                "packet-replay".to_string(),
                Box::new(move |ctx| {
                    Box::pin(async move {
                        replay_directory(&dir, &service, &ctx).await.map(|_| ())
                    })
                }),
            ));
        }

        processes
    }
}
