//! Append-only JSONL audit sink.
//!
//! One file per day (`audit-YYYY-MM-DD.jsonl`), one JSON object per line.
//! A failed write is logged and swallowed: audit never blocks a decision.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

/// Which tier produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidedBy {
    Rule,
    Llm,
    Telegram,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub tool_name: String,
    pub tool_input: Value,
    pub decision: Decision,
    pub reason: String,
    pub decided_by: DecidedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

/// Date-stamped JSONL writer.
pub struct AuditLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    /// Append an entry to today's file. Failures are logged, never raised.
    pub fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.try_record(entry) {
            warn!(error = %e, "failed to write audit entry");
        }
    }

    fn try_record(&self, entry: &AuditEntry) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating audit dir {}", self.dir.display()))?;
        let path = self.path_for(&Utc::now().format("%Y-%m-%d").to_string());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening audit file {}", path.display()))?;
        writeln!(file, "{}", serde_json::to_string(entry)?)?;
        file.flush()?;
        Ok(())
    }

    /// Entries for a given `YYYY-MM-DD` date, corrupt lines skipped.
    pub fn read_date(&self, date: &str) -> Vec<AuditEntry> {
        let file = match File::open(self.path_for(date)) {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };
        BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(&l).ok())
            .collect()
    }

    /// Today's entries.
    pub fn read_today(&self) -> Vec<AuditEntry> {
        self.read_date(&Utc::now().format("%Y-%m-%d").to_string())
    }

    fn path_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("audit-{date}.jsonl"))
    }
}
