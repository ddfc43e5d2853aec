//! The durable record log backing every entity collection.
//!
//! One [`Collection`] per entity type (feeds, categories, articles), each an
//! append-only file of line-delimited JSON operations replayed into memory
//! on open. A `put` line carries the whole document, a `del` line a
//! tombstone; the last operation for a key wins. Compaction rewrites the
//! file to live records only, through a temp file and an atomic rename, so
//! the log is never observable in a partial state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::types::StoreError;

/// A durable record: anything serializable that can name its own key.
pub trait Record: Serialize + DeserializeOwned + Clone {
    fn key(&self) -> String;
}

/// Owned log line, used on replay.
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogLine<T> {
    Put { doc: T },
    Del { key: String },
}

/// Borrowed log line, used on append so records need not be cloned to be
/// written.
#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogLineRef<'a, T> {
    Put { doc: &'a T },
    Del { key: &'a str },
}

/// Minimum number of dead lines before auto-compaction is considered at
/// all; below this the rewrite costs more than the waste.
const COMPACT_FLOOR: usize = 64;

/// A keyed record collection persisted as an append/compact log.
pub struct Collection<T: Record> {
    path: PathBuf,
    file: File,
    records: HashMap<String, T>,
    dead_lines: usize,
}

impl<T: Record> Collection<T> {
    /// Opens (or creates) the log at `path` and replays it into memory.
    ///
    /// An undecodable line is skipped with a warning rather than failing
    /// the whole load — the common cause is a torn final append from a
    /// crash, and losing one record beats losing the library. When dead
    /// lines outnumber live records the log is rewritten before use.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut records: HashMap<String, T> = HashMap::new();
        let mut dead_lines = 0usize;

        match File::open(&path).await {
            Ok(file) => {
                let mut lines = BufReader::new(file).lines();
                let mut line_no = 0usize;
                while let Some(line) = lines.next_line().await? {
                    line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogLine<T>>(&line) {
                        Ok(LogLine::Put { doc }) => {
                            if records.insert(doc.key(), doc).is_some() {
                                dead_lines += 1;
                            }
                        }
                        Ok(LogLine::Del { key }) => {
                            dead_lines += 1;
                            if records.remove(&key).is_some() {
                                dead_lines += 1;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(
                                path = %path.display(),
                                line = line_no,
                                %error,
                                "skipping undecodable record"
                            );
                            dead_lines += 1;
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let mut collection = Self {
            path,
            file,
            records,
            dead_lines,
        };
        if collection.should_compact() {
            collection.compact().await?;
        }
        Ok(collection)
    }

    /// Upserts a record. The append is durable before the in-memory state
    /// changes, so a failed write leaves the collection untouched.
    pub async fn put(&mut self, record: T) -> Result<(), StoreError> {
        let key = record.key();
        self.append(&LogLineRef::Put { doc: &record }).await?;
        if self.records.insert(key, record).is_some() {
            self.dead_lines += 1;
        }
        Ok(())
    }

    /// Deletes by key, returning whether a record was actually present.
    pub async fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        if !self.records.contains_key(key) {
            return Ok(false);
        }
        self.append(&LogLineRef::Del { key }).await?;
        self.records.remove(key);
        // the tombstone and the put it shadows are both dead weight now
        self.dead_lines += 2;
        Ok(true)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.records.get(key)
    }

    /// In-memory mutation that is deliberately NOT persisted. Callers that
    /// want durability go through [`Collection::put`]; this exists for
    /// derived fields (cached counters) that must never hit the log.
    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.records.get_mut(key)
    }

    /// Lazy iteration over live records, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrites the log to live records only.
    ///
    /// Writes to a randomized temp file in the same directory, syncs, then
    /// atomically renames over the log, so a crash at any point leaves
    /// either the old log or the new one — never a truncated mix.
    pub async fn compact(&mut self) -> Result<(), StoreError> {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let tmp = self.path.with_extension(format!("tmp.{suffix:016x}"));

        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .await?;
        for doc in self.records.values() {
            let mut buf = serde_json::to_vec(&LogLineRef::Put { doc })?;
            buf.push(b'\n');
            out.write_all(&buf).await?;
        }
        out.flush().await?;
        out.sync_all().await?;
        drop(out);

        tokio::fs::rename(&tmp, &self.path).await?;
        self.file = OpenOptions::new().append(true).open(&self.path).await?;
        self.dead_lines = 0;

        tracing::debug!(
            path = %self.path.display(),
            records = self.records.len(),
            "compacted record log"
        );
        Ok(())
    }

    /// Byte size of the backing log file. Reporting only.
    pub async fn size_bytes(&self) -> Result<u64, StoreError> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    fn should_compact(&self) -> bool {
        self.dead_lines >= COMPACT_FLOOR && self.dead_lines > self.records.len()
    }

    async fn append(&mut self, line: &LogLineRef<'_, T>) -> Result<(), StoreError> {
        let mut buf = serde_json::to_vec(line)?;
        buf.push(b'\n');
        self.file.write_all(&buf).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}
