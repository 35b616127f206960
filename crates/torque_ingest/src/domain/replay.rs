use crate::domain::{IngestError, IngestService, DUMP_EXTENSION};
use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Counts from one replay run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub replayed: usize,
    /// Files whose names do not follow the dump naming scheme
    pub skipped: usize,
    /// Packets the ingest service rejected
    pub rejected: usize,
}

/// Rebuild the transport topic from a dump file name.
///
/// Expects `<millis>.sensors_<device>_port_<port>.data`; the device part may
/// itself contain underscores.
pub fn topic_from_file_name(file_name: &str) -> Option<(i64, String)> {
    let stem = file_name.strip_suffix(DUMP_EXTENSION)?.strip_suffix('.')?;
    let (millis, topic) = stem.split_once('.')?;
    let millis = millis.parse::<i64>().ok()?;

    let rest = topic.strip_prefix("sensors_")?;
    let (device, port) = rest.rsplit_once("_port_")?;
    if device.is_empty() || port.is_empty() {
        return None;
    }

    Some((millis, format!("sensors/{}/port/{}", device, port)))
}

/// Feed every dumped packet in `dir` back through `service`, oldest first.
pub async fn replay_directory(
    dir: &Path,
    service: &IngestService,
    ctx: &CancellationToken,
) -> anyhow::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let mut entries: Vec<(i64, String, PathBuf)> = Vec::new();

    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read replay directory {}", dir.display()))?;
    while let Some(entry) = read_dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        match topic_from_file_name(&file_name) {
            Some((millis, topic)) => entries.push((millis, topic, entry.path())),
            None => {
                warn!(file = %file_name, "skipping file that is not a packet dump");
                summary.skipped += 1;
            }
        }
    }

    entries.sort_by(|a, b| (a.0, &a.2).cmp(&(b.0, &b.2)));
    info!(dir = %dir.display(), files = entries.len(), "replaying packet dumps");

    for (_, topic, path) in entries {
        if ctx.is_cancelled() {
            info!("replay cancelled");
            break;
        }

        let payload = tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        match service.handle_message(&topic, &payload).await {
            Ok(()) => summary.replayed += 1,
            Err(IngestError::Packet(e)) => {
                warn!(file = %path.display(), error = %e, "replayed packet rejected");
                summary.rejected += 1;
            }
            Err(IngestError::Domain(e)) => {
                return Err(e).with_context(|| format!("failed to replay {}", path.display()));
            }
        }
    }

    info!(
        replayed = summary.replayed,
        skipped = summary.skipped,
        rejected = summary.rejected,
        "replay finished"
    );
    Ok(summary)
}
