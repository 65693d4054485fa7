//! Decision Audit Log
//!
//! Append-only JSONL record of every validation decision the CLI makes.
//!
//! - Concurrency-safe: writes take an exclusive lock, reads a shared one
//! - Size-bounded: the live file is gzip-rotated into numbered archives
//! - Tolerant: corrupt lines are skipped on read

use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::security::{Decision, ToolInvocation};

/// Rotate once the live file grows past this many bytes
pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Number of compressed archives kept next to the live file
pub const DEFAULT_KEEP_ARCHIVES: usize = 3;

/// Errors that can occur during audit log operations
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rotation settings for a decision log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    pub max_bytes: u64,
    pub keep_archives: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            keep_archives: DEFAULT_KEEP_ARCHIVES,
        }
    }
}

impl AuditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// At least one archive is always kept
    pub fn with_keep_archives(mut self, keep: usize) -> Self {
        self.keep_archives = keep.max(1);
        self
    }
}

/// A single logged decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    /// Seconds since the Unix epoch
    pub timestamp: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// `allow` or `block`
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEntry {
    pub fn new(invocation: &ToolInvocation, decision: &Decision) -> Self {
        Self {
            id: generate_id(),
            timestamp: current_timestamp(),
            tool_name: invocation.tool_name.clone(),
            command: invocation.tool_input.command.clone(),
            decision: decision.label().to_string(),
            reason: decision.reason().map(str::to_string),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == "block"
    }
}

/// Allow/block counts over the live log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub allowed: usize,
    pub blocked: usize,
}

/// Append-only decision log
#[derive(Debug)]
pub struct DecisionLog {
    path: PathBuf,
    config: AuditConfig,
}

impl DecisionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, AuditConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: AuditConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a decision for an invocation
    pub fn record(
        &self,
        invocation: &ToolInvocation,
        decision: &Decision,
    ) -> Result<AuditEntry, AuditError> {
        let entry = AuditEntry::new(invocation, decision);
        self.append(&entry)?;
        Ok(entry)
    }

    /// Append an entry, rotating first if the live file is over budget
    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(entry)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Held across rotation and write so concurrent agents never
        // interleave or lose lines.
        file.lock_exclusive()?;
        let result = self.rotate_if_needed(&file).and_then(|_| {
            let mut writer = BufWriter::new(&file);
            writeln!(writer, "{}", line)?;
            writer.flush()
        });
        file.unlock()?;

        result.map_err(AuditError::from)
    }

    /// Last `limit` readable entries, oldest first
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.read_all()?;
        let start = entries.len().saturating_sub(limit);
        Ok(entries[start..].to_vec())
    }

    pub fn summary(&self) -> Result<AuditSummary, AuditError> {
        let entries = self.read_all()?;
        let blocked = entries.iter().filter(|e| e.is_blocked()).count();
        Ok(AuditSummary {
            total: entries.len(),
            allowed: entries.len() - blocked,
            blocked,
        })
    }

    /// Path of the `n`th compressed archive (1 is the newest)
    pub fn archive_path(&self, n: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}.gz", n));
        PathBuf::from(name)
    }

    fn read_all(&self) -> Result<Vec<AuditEntry>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        file.lock_shared()?;

        // Raw bytes: a non-UTF-8 line is just another corrupt line
        let result = BufReader::new(&file)
            .split(b'\n')
            .map(|line| {
                line.map(|bytes| serde_json::from_slice::<AuditEntry>(&bytes).ok())
            })
            .filter_map(Result::transpose)
            .collect::<io::Result<Vec<AuditEntry>>>();

        file.unlock()?;
        Ok(result?)
    }

    /// Compress the live file into archive 1 and truncate it
    ///
    /// Caller holds the exclusive lock on `file`.
    fn rotate_if_needed(&self, file: &File) -> io::Result<()> {
        if file.metadata()?.len() < self.config.max_bytes {
            return Ok(());
        }

        for n in (1..self.config.keep_archives).rev() {
            let from = self.archive_path(n);
            if from.exists() {
                fs::rename(&from, self.archive_path(n + 1))?;
            }
        }

        let mut source = File::open(&self.path)?;
        let archive = File::create(self.archive_path(1))?;
        let mut encoder = GzEncoder::new(archive, Compression::default());
        io::copy(&mut source, &mut encoder)?;
        encoder.finish()?;

        file.set_len(0)
    }
}

fn generate_id() -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    format!("dec-{:x}", micros)
}

fn current_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    secs.to_string()
}
