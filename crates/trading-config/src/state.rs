//! Session state collaborators: the emergency-stop flag and the journal.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use trading_core::error::{TradingError, TradingResult};
use trading_core::traits::StateStore;
use trading_core::types::JournalRecord;

use crate::StateSettings;

/// Flag file plus a JSON-lines journal.
///
/// The emergency stop is raised by creating the flag file, so an operator
/// can stop a running session from a shell.
pub struct FileStateStore {
    flag_path: PathBuf,
    journal_path: PathBuf,
    journal_lock: tokio::sync::Mutex<()>,
}

impl FileStateStore {
    pub fn new(flag_path: impl Into<PathBuf>, journal_path: impl Into<PathBuf>) -> Self {
        Self {
            flag_path: flag_path.into(),
            journal_path: journal_path.into(),
            journal_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_settings(settings: &StateSettings) -> Self {
        Self::new(&settings.emergency_flag_path, &settings.journal_path)
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    /// Raise the emergency stop.
    pub async fn trigger_emergency_stop(&self, reason: &str) -> TradingResult<()> {
        ensure_parent(&self.flag_path).await?;
        tokio::fs::write(&self.flag_path, reason).await?;
        warn!(path = %self.flag_path.display(), %reason, "Emergency stop flag raised");
        Ok(())
    }

    /// Remove the flag; a missing flag is fine.
    pub async fn clear_emergency_stop(&self) -> TradingResult<()> {
        match tokio::fs::remove_file(&self.flag_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read back every journal record.
    pub async fn read_journal(&self) -> TradingResult<Vec<JournalRecord>> {
        let text = match tokio::fs::read_to_string(&self.journal_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(TradingError::from))
            .collect()
    }
}

async fn ensure_parent(path: &Path) -> TradingResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn emergency_stop(&self) -> TradingResult<bool> {
        Ok(tokio::fs::try_exists(&self.flag_path).await?)
    }

    async fn append(&self, record: JournalRecord) -> TradingResult<()> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self.journal_lock.lock().await;
        ensure_parent(&self.journal_path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(kind = record.kind(), "Journal record appended");
        Ok(())
    }
}

/// In-memory store for paper sessions and tests.
#[derive(Default)]
pub struct MemoryStateStore {
    stop: AtomicBool,
    unavailable: AtomicBool,
    records: Mutex<Vec<JournalRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_emergency_stop(&self, on: bool) {
        self.stop.store(on, Ordering::SeqCst);
    }

    /// Make every call fail, as a broken backing store would.
    pub fn set_unavailable(&self, on: bool) {
        self.unavailable.store(on, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<JournalRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records of one kind, e.g. `"position_closed"`.
    pub fn records_of(&self, kind: &str) -> Vec<JournalRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.kind() == kind)
            .collect()
    }

    fn check_available(&self) -> TradingResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TradingError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "state store unavailable",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn emergency_stop(&self) -> TradingResult<bool> {
        self.check_available()?;
        Ok(self.stop.load(Ordering::SeqCst))
    }

    async fn append(&self, record: JournalRecord) -> TradingResult<()> {
        self.check_available()?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trading_core::types::{JournalEvent, SessionPhase};

    fn phase_record(detail: &str) -> JournalRecord {
        JournalRecord::now(JournalEvent::PhaseChanged {
            phase: SessionPhase::Running,
            detail: detail.into(),
        })
    }

    #[tokio::test]
    async fn test_file_store_flag_and_journal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(
            dir.path().join("flags/EMERGENCY_STOP"),
            dir.path().join("journal/session.jsonl"),
        );

        assert!(!store.emergency_stop().await.unwrap());
        store.trigger_emergency_stop("operator").await.unwrap();
        assert!(store.emergency_stop().await.unwrap());
        store.clear_emergency_stop().await.unwrap();
        store.clear_emergency_stop().await.unwrap();
        assert!(!store.emergency_stop().await.unwrap());

        store.append(phase_record("first")).await.unwrap();
        store.append(phase_record("second")).await.unwrap();

        let records = store.read_journal().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind(), "phase_changed");

        let text = std::fs::read_to_string(store.journal_path()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_missing_journal_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("STOP"), dir.path().join("none.jsonl"));
        assert!(store.read_journal().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStateStore::new();
        store.append(phase_record("x")).await.unwrap();
        assert_eq!(store.records_of("phase_changed").len(), 1);

        store.set_emergency_stop(true);
        assert!(store.emergency_stop().await.unwrap());

        store.set_unavailable(true);
        assert!(store.emergency_stop().await.is_err());
        assert!(store.append(phase_record("y")).await.is_err());
        assert_eq!(store.records().len(), 1);
    }
}
