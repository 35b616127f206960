use crate::domain::{shard_index, DispatchError, IngestError, IngestService};
use crate::mqtt::parse_topic;
use common::domain::{DomainError, DomainResult};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument, Span};

/// One transport message waiting for its shard's ingest task
#[derive(Debug)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Root span the message was received under
    pub span: Span,
}

/// Routes inbound messages to per-shard ingest queues without waiting.
///
/// Messages are sharded by device identity with the same function the
/// session-update publisher uses, so a shard whose persistence queue is
/// backed up only holds back its own devices. The caller (the MQTT event
/// loop) never awaits a queue.
pub struct IngestDispatcher {
    senders: Vec<mpsc::Sender<InboundMessage>>,
}

impl IngestDispatcher {
    /// Create the dispatcher and one ingest worker per shard
    pub fn new(
        service: Arc<IngestService>,
        shards: usize,
        capacity: usize,
    ) -> DomainResult<(Self, Vec<IngestShardWorker>)> {
        if shards == 0 || capacity == 0 {
            return Err(DomainError::InvalidConfig(format!(
                "ingest queues need at least one shard and a non-zero capacity (shards={}, capacity={})",
                shards, capacity
            )));
        }

        let mut senders = Vec::with_capacity(shards);
        let mut workers = Vec::with_capacity(shards);
        for shard in 0..shards {
            let (sender, receiver) = mpsc::channel(capacity);
            senders.push(sender);
            workers.push(IngestShardWorker {
                shard,
                receiver,
                service: Arc::clone(&service),
            });
        }

        Ok((Self { senders }, workers))
    }

    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    /// Queue a message on its device's shard.
    ///
    /// Topics that do not parse are rejected here, before any queueing.
    pub fn dispatch(&self, topic: &str, payload: &[u8], span: Span) -> Result<usize, DispatchError> {
        let parsed = parse_topic(topic)?;
        let shard = shard_index(&parsed.device_identity, self.senders.len());

        let message = InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            span,
        };

        match self.senders[shard].try_send(message) {
            Ok(()) => Ok(shard),
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull { shard }),
            Err(TrySendError::Closed(_)) => Err(DispatchError::QueueClosed { shard }),
        }
    }
}

/// Feeds one shard's messages through the ingest service in arrival order
pub struct IngestShardWorker {
    shard: usize,
    receiver: mpsc::Receiver<InboundMessage>,
    service: Arc<IngestService>,
}

impl IngestShardWorker {
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Ingest until the queue closes or `ctx` is cancelled, then finish
    /// what is already queued.
    pub async fn run(mut self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(shard = self.shard, "ingest shard started");

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.receiver.close();
                    while let Some(message) = self.receiver.recv().await {
                        self.ingest(message).await;
                    }
                    break;
                }
                message = self.receiver.recv() => match message {
                    Some(message) => self.ingest(message).await,
                    None => break,
                },
            }
        }

        info!(shard = self.shard, "ingest shard stopped");
        Ok(())
    }

    async fn ingest(&self, message: InboundMessage) {
        let InboundMessage {
            topic,
            payload,
            span,
        } = message;

        async {
            match self.service.handle_message(&topic, &payload).await {
                Ok(()) => debug!("packet ingested"),
                Err(IngestError::Packet(e)) => {
                    warn!(error = %e, "rejected packet");
                }
                Err(IngestError::Domain(e)) => {
                    error!(error = %e, "failed to hand off session update");
                }
            }
        }
        .instrument(span)
        .await
    }
}
