use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::VesselRecord;
use crate::utils::error::StoreError;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable, append-only history of observations for one vessel.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist `record` after every previously appended record.
    async fn append(&self, record: &VesselRecord) -> StoreResult<()>;

    /// Record with the greatest capture time, `None` when nothing is stored.
    async fn latest(&self) -> StoreResult<Option<VesselRecord>>;

    /// Every stored record, oldest first.
    async fn all(&self) -> StoreResult<Vec<VesselRecord>>;

    /// Drop records captured before `cutoff`. The latest record always survives.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize>;
}

/// History kept as a single JSON array file, replaced atomically on every write.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(history_dir: impl AsRef<Path>, mmsi: u64) -> Self {
        Self::at_path(history_dir.as_ref().join(format!("{}.json", mmsi)))
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    async fn load(&self) -> StoreResult<Vec<VesselRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            source,
        })
    }

    /// Write to `<file>.tmp`, fsync, then rename over the history file.
    async fn write_atomic(&self, records: &[VesselRecord]) -> StoreResult<()> {
        let tmp_path = self.tmp_path();
        let json = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let io_err = |source: std::io::Error| StoreError::Io {
            path: tmp_path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
        file.write_all(&json).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn append(&self, record: &VesselRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await?;
        records.push(record.clone());
        self.write_atomic(&records).await?;

        debug!("Appended record {} to {}", record.captured_at(), self.path.display());
        Ok(())
    }

    async fn latest(&self) -> StoreResult<Option<VesselRecord>> {
        let records = self.load().await?;
        Ok(records.into_iter().max_by_key(|r| r.captured_at()))
    }

    async fn all(&self) -> StoreResult<Vec<VesselRecord>> {
        self.load().await
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let _guard = self.write_lock.lock().await;

        let records = self.load().await?;
        let Some(latest_at) = records.iter().map(|r| r.captured_at()).max() else {
            return Ok(0);
        };

        let before = records.len();
        let kept: Vec<VesselRecord> = records
            .into_iter()
            .filter(|r| r.captured_at() >= cutoff || r.captured_at() == latest_at)
            .collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.write_atomic(&kept).await?;
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotEntry {
    pub path: PathBuf,
    /// Parsed from the file name, when it follows the archive naming scheme.
    pub captured_at: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl ScreenshotEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.captured_at.or(self.modified)
    }
}

/// Directory of captured page screenshots.
#[derive(Debug, Clone)]
pub struct ScreenshotArchive {
    dir: PathBuf,
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{8}_\d{6})(?:_(\d{3}))?(?:-\d+)?\.png$").expect("static regex"))
}

impl ScreenshotArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(label: &str, captured_at: DateTime<Utc>) -> String {
        let label: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}_{}.png", label, captured_at.format("%Y%m%d_%H%M%S_%3f"))
    }

    /// Timestamp encoded in an archive file name. Anchored to the extension
    /// so digits in the label are not mistaken for the timestamp.
    pub fn parse_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
        let caps = timestamp_regex().captures(file_name)?;
        let base = NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d_%H%M%S").ok()?;
        let millis: i64 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        Some(base.and_utc() + chrono::Duration::milliseconds(millis))
    }

    /// Store a PNG. Called from the blocking extraction thread, so this is
    /// synchronous. Existing files are never overwritten.
    pub fn save(&self, label: &str, captured_at: DateTime<Utc>, png: &[u8]) -> StoreResult<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let base = Self::file_name(label, captured_at);
        let stem = base.trim_end_matches(".png").to_string();

        for n in 0..100u32 {
            let name = if n == 0 { base.clone() } else { format!("{}-{}.png", stem, n) };
            let path = self.dir.join(name);

            match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(png).map_err(|source| StoreError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }

        Err(StoreError::Io {
            path: self.dir.join(base),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free screenshot name"),
        })
    }

    pub async fn list(&self) -> StoreResult<Vec<ScreenshotEntry>> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read screenshot directory entry: {}", e);
                    break;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }

            let captured_at = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(Self::parse_timestamp);
            let modified = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from);

            entries.push(ScreenshotEntry {
                path,
                captured_at,
                modified,
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    pub async fn remove(&self, path: &Path) -> StoreResult<()> {
        tokio::fs::remove_file(path).await.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
