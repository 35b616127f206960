use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

const MAX_TOPIC_LEN: usize = 255;
const HOSTILE_CHARS: &[char] = &['/', '<', '>', ':', '"', '\\', '|', '?', '*'];
pub const DUMP_EXTENSION: &str = "data";

/// Writes raw payloads to disk so they can be replayed later.
///
/// Files are named `<unix_millis>.<sanitized_topic>.data`. The millisecond
/// prefix is kept strictly increasing within a process so two packets in the
/// same millisecond neither collide nor reorder.
pub struct PacketDump {
    dir: PathBuf,
    last_millis: AtomicI64,
}

impl PacketDump {
    pub async fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            last_millis: AtomicI64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write(
        &self,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> io::Result<PathBuf> {
        let millis = self.next_millis(received_at.timestamp_millis());
        let path = self.dir.join(dump_file_name(millis, topic));
        tokio::fs::write(&path, payload).await?;
        debug!(path = %path.display(), bytes = payload.len(), "dumped packet");
        Ok(path)
    }

    fn next_millis(&self, now: i64) -> i64 {
        let mut last = self.last_millis.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_millis.compare_exchange_weak(
                last,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Replace path separators and characters most filesystems reject with `_`
pub fn sanitize_topic(topic: &str) -> String {
    topic
        .chars()
        .map(|c| if HOSTILE_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_TOPIC_LEN)
        .collect()
}

pub fn dump_file_name(unix_millis: i64, topic: &str) -> String {
    format!("{}.{}.{}", unix_millis, sanitize_topic(topic), DUMP_EXTENSION)
}
