//! Audit sinks for privileged API calls.
//!
//! Each line names the command and the caller's public key, never the
//! signature or the secret.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;

use repo_gate_core::store::AuditSink;

/// Emits audit lines as `tracing` events with target `audit`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "audit", "{}", message);
    }
}

/// Appends timestamped audit lines to a file.
///
/// Write failures are reported through `tracing` and otherwise ignored.
pub struct FileAuditSink {
    file: Mutex<File>,
}

impl FileAuditSink {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn log(&self, message: &str) {
        let line = format!("{} {}\n", Utc::now().format("%Y-%m-%dT%H:%M:%SZ"), message);
        let written = match self.file.lock() {
            Ok(mut file) => file.write_all(line.as_bytes()),
            Err(_) => Err(std::io::Error::other("audit log lock poisoned")),
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write audit line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_sink_appends_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs").join("api.log");

        let sink = FileAuditSink::open(&path).unwrap();
        sink.log("Valid signed repoList API call using publicKey=APIK-1");
        sink.log("Invalid signed repoAdd API call using publicKey=APIK-2");
        drop(sink);

        let reopened = FileAuditSink::open(&path).unwrap();
        reopened.log("third");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("Valid signed repoList API call using publicKey=APIK-1"));
        assert!(lines[2].ends_with("third"));
    }
}
