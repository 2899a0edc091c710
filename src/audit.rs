use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(test)]
use std::io;

#[cfg(test)]
use crate::errors::AppError;
use crate::errors::AppResult;

pub const AUDIT_LOG_FILE: &str = "audit-log.jsonl";

/// Append-only record of every outbound submission payload.
#[derive(Clone)]
pub struct AuditLog {
    log_path: PathBuf,
    max_file_bytes: u64,
    write_lock: Arc<Mutex<()>>,
    #[cfg(test)]
    fault_injector: Option<Arc<TestFaultInjector>>,
}

#[derive(Debug, Serialize)]
pub struct AuditRecord<'a, P: Serialize> {
    pub timestamp: DateTime<Utc>,
    pub url: &'a str,
    pub payload: &'a P,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(data_dir: P, max_file_bytes: u64) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let log_path = data_dir.join(AUDIT_LOG_FILE);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            log_path,
            max_file_bytes,
            write_lock: Arc::new(Mutex::new(())),
            #[cfg(test)]
            fault_injector: None,
        })
    }

    /// Writes and flushes one record; returns only once it is on disk.
    pub fn record<P: Serialize>(&self, url: &str, payload: &P) -> AppResult<()> {
        let record = AuditRecord {
            timestamp: Utc::now(),
            url,
            payload,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock();
        self.rotate_if_needed(line.len() as u64)?;

        #[cfg(test)]
        if self
            .fault_injector
            .as_ref()
            .map(|hooks| hooks.take_disk_full())
            .unwrap_or(false)
        {
            return Err(AppError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "simulated disk full",
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(&line)?;
        file.flush()?;
        debug!(target: "audit", %url, "submission recorded");
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn rotate_if_needed(&self, incoming_bytes: u64) -> AppResult<()> {
        let current_size = fs::metadata(&self.log_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if current_size == 0 || current_size + incoming_bytes <= self.max_file_bytes {
            return Ok(());
        }

        let stamped = format!(
            "{}-{}",
            self.log_stem(),
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        let dir = self.log_path.parent().unwrap_or_else(|| Path::new("."));
        let mut rotated_path = dir.join(format!("{stamped}.jsonl"));
        let mut suffix = 1_u32;
        while rotated_path.exists() {
            rotated_path = dir.join(format!("{stamped}-{suffix}.jsonl"));
            suffix += 1;
        }

        fs::rename(&self.log_path, &rotated_path)?;
        info!(
            target: "audit",
            rotated = %rotated_path.display(),
            "audit log rotated"
        );
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)?;
        Ok(())
    }

    fn log_stem(&self) -> String {
        self.log_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audit-log".into())
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct TestFaultInjector {
    disk_full: AtomicBool,
}

#[cfg(test)]
impl TestFaultInjector {
    pub fn fail_next_disk_full(&self) {
        self.disk_full.store(true, Ordering::SeqCst);
    }

    fn take_disk_full(&self) -> bool {
        self.disk_full.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
impl AuditLog {
    pub fn enable_test_hooks(&mut self) -> Arc<TestFaultInjector> {
        let hooks = Arc::new(TestFaultInjector::default());
        self.fault_injector = Some(hooks.clone());
        hooks
    }
}
