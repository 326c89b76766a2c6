//! Local report queues
//!
//! Two capped JSON arrays of [`StoredReport`] live in the persistent store:
//! - the pending queue keeps every persisted record (the local backstop)
//! - the failed queue keeps records whose delivery failed, for retry
//!
//! Both evict their oldest entry beyond the configured capacity and hold at
//! most one entry per `errorId`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use errguard_core::domain::{ErrorId, ReportRecord, ReportStatus, StoredReport};
use errguard_core::ports::{keys, read_json, remove_logged, write_json, IStateStore};

pub struct ReportQueue {
    store: Arc<dyn IStateStore>,
    max_size: usize,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl ReportQueue {
    pub fn new(store: Arc<dyn IStateStore>, max_size: usize) -> Self {
        Self {
            store,
            max_size: max_size.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub async fn pending(&self) -> Vec<StoredReport> {
        self.load(keys::PENDING_REPORTS).await
    }

    pub async fn failed(&self) -> Vec<StoredReport> {
        self.load(keys::FAILED_REPORTS).await
    }

    /// Looks `error_id` up in the pending queue, then the failed queue
    pub async fn find(&self, error_id: ErrorId) -> Option<StoredReport> {
        if let Some(found) = find_in(self.pending().await, error_id) {
            return Some(found);
        }
        find_in(self.failed().await, error_id)
    }

    /// Inserts or replaces a pending entry; returns false if the write failed
    pub async fn upsert_pending(&self, report: StoredReport) -> bool {
        let _guard = self.write_lock.lock().await;
        let mut pending = self.load(keys::PENDING_REPORTS).await;
        upsert(&mut pending, report, self.max_size);
        write_json(self.store.as_ref(), keys::PENDING_REPORTS, &pending).await
    }

    /// Records a successful delivery and drops the entry from the failed queue
    pub async fn mark_sent(&self, error_id: ErrorId, remote_id: Option<String>) -> bool {
        let _guard = self.write_lock.lock().await;

        let mut pending = self.load(keys::PENDING_REPORTS).await;
        if let Some(entry) = pending.iter_mut().find(|r| r.error_id() == error_id) {
            entry.status = ReportStatus::Sent;
            entry.attempts += 1;
            entry.last_error = None;
            entry.remote_id = remote_id;
        }
        let mut ok = write_json(self.store.as_ref(), keys::PENDING_REPORTS, &pending).await;

        let mut failed = self.load(keys::FAILED_REPORTS).await;
        let before = failed.len();
        failed.retain(|r| r.error_id() != error_id);
        if failed.len() != before {
            ok &= write_json(self.store.as_ref(), keys::FAILED_REPORTS, &failed).await;
        }
        ok
    }

    /// Records a failed delivery and files the record in the failed queue
    pub async fn mark_failed(&self, record: &ReportRecord, error: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();

        let mut pending = self.load(keys::PENDING_REPORTS).await;
        let mut attempts = 1;
        let mut stored_at = now;
        if let Some(entry) = pending
            .iter_mut()
            .find(|r| r.error_id() == record.error_id)
        {
            entry.status = ReportStatus::Failed;
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
            attempts = entry.attempts;
            stored_at = entry.stored_at;
        }
        let mut ok = write_json(self.store.as_ref(), keys::PENDING_REPORTS, &pending).await;

        let mut failed = self.load(keys::FAILED_REPORTS).await;
        if let Some(previous) = failed.iter().find(|r| r.error_id() == record.error_id) {
            attempts = attempts.max(previous.attempts + 1);
            stored_at = previous.stored_at;
        }
        let entry = StoredReport {
            record: record.clone(),
            status: ReportStatus::Failed,
            stored_at,
            attempts,
            last_error: Some(error.to_string()),
            remote_id: None,
        };
        upsert(&mut failed, entry, self.max_size);
        ok &= write_json(self.store.as_ref(), keys::FAILED_REPORTS, &failed).await;
        ok
    }

    /// Drops entries stored before `now - days`; returns how many went
    pub async fn purge_older_than(&self, days: u32, now: DateTime<Utc>) -> usize {
        let _guard = self.write_lock.lock().await;
        let cutoff = now - Duration::days(i64::from(days));
        let mut purged = 0;

        for key in [keys::PENDING_REPORTS, keys::FAILED_REPORTS] {
            let mut reports = self.load(key).await;
            let before = reports.len();
            reports.retain(|r| r.stored_at >= cutoff);
            if reports.len() != before {
                purged += before - reports.len();
                write_json(self.store.as_ref(), key, &reports).await;
            }
        }

        if purged > 0 {
            tracing::info!(purged, days, "Purged reports past their retention period");
        }
        purged
    }

    /// Removes both queues
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        let pending = remove_logged(self.store.as_ref(), keys::PENDING_REPORTS).await;
        let failed = remove_logged(self.store.as_ref(), keys::FAILED_REPORTS).await;
        pending && failed
    }

    async fn load(&self, key: &str) -> Vec<StoredReport> {
        read_json::<Vec<StoredReport>>(self.store.as_ref(), key).await
    }
}

fn find_in(reports: Vec<StoredReport>, error_id: ErrorId) -> Option<StoredReport> {
    reports.into_iter().find(|r| r.error_id() == error_id)
}

fn upsert(reports: &mut Vec<StoredReport>, report: StoredReport, max_size: usize) {
    match reports.iter_mut().find(|r| r.error_id() == report.error_id()) {
        Some(existing) => *existing = report,
        None => reports.push(report),
    }
    if reports.len() > max_size {
        let overflow = reports.len() - max_size;
        let evicted: Vec<_> = reports.drain(..overflow).map(|r| r.error_id()).collect();
        tracing::debug!(?evicted, "Evicted oldest queued reports");
    }
}
