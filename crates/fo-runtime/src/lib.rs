#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_PARALLEL_COLUMN_THRESHOLD: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    Strict,
    Hardened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
    Repair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    AlignmentCardinality,
    ParallelDispatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub ts_unix_ms: u64,
    pub mode: RuntimeMode,
    pub action: DecisionAction,
    pub issue: CompatibilityIssue,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceLedger {
    records: Vec<DecisionRecord>,
}

impl EvidenceLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: DecisionRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    #[must_use]
    pub fn last_action(&self) -> Option<DecisionAction> {
        self.records.last().map(|record| record.action)
    }
}

/// Execution policy for binary frame operations.
///
/// `aligned_row_cap` bounds the row count an alignment may produce (duplicate
/// row labels can multiply rows). Strict mode rejects an over-cap alignment;
/// hardened mode admits it and records a repair. `parallel_column_threshold`
/// is the column count at which per-column dispatch moves onto the rayon
/// pool; `None` keeps dispatch sequential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
    pub aligned_row_cap: Option<usize>,
    pub parallel_column_threshold: Option<usize>,
}

impl RuntimePolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
            aligned_row_cap: None,
            parallel_column_threshold: Some(DEFAULT_PARALLEL_COLUMN_THRESHOLD),
        }
    }

    #[must_use]
    pub fn hardened(aligned_row_cap: Option<usize>) -> Self {
        Self {
            mode: RuntimeMode::Hardened,
            aligned_row_cap,
            parallel_column_threshold: Some(DEFAULT_PARALLEL_COLUMN_THRESHOLD),
        }
    }

    #[must_use]
    pub fn with_aligned_row_cap(mut self, cap: Option<usize>) -> Self {
        self.aligned_row_cap = cap;
        self
    }

    #[must_use]
    pub fn with_parallel_column_threshold(mut self, threshold: Option<usize>) -> Self {
        self.parallel_column_threshold = threshold;
        self
    }

    pub fn from_json(raw: &str) -> Result<Self, RuntimeError> {
        serde_json::from_str(raw).map_err(|err| RuntimeError::InvalidConfig(err.to_string()))
    }

    pub fn decide_alignment_admission(
        &self,
        aligned_rows: usize,
        ledger: &mut EvidenceLedger,
    ) -> DecisionAction {
        let cap = self.aligned_row_cap.unwrap_or(usize::MAX);
        let action = match (aligned_rows <= cap, self.mode) {
            (true, _) => DecisionAction::Allow,
            (false, RuntimeMode::Strict) => DecisionAction::Reject,
            (false, RuntimeMode::Hardened) => {
                warn!(aligned_rows, cap, "admitting alignment over the row cap");
                DecisionAction::Repair
            }
        };
        debug!(aligned_rows, ?action, mode = ?self.mode, "alignment admission");

        ledger.push(DecisionRecord {
            ts_unix_ms: now_unix_ms().unwrap_or_default(),
            mode: self.mode,
            action,
            issue: CompatibilityIssue {
                kind: IssueKind::AlignmentCardinality,
                subject: "alignment".to_owned(),
                detail: format!("aligned_rows={aligned_rows}"),
            },
        });
        action
    }

    /// Whether `columns` independent column kernels should run in parallel.
    /// Only a parallel decision is recorded in the ledger.
    pub fn decide_column_parallelism(&self, columns: usize, ledger: &mut EvidenceLedger) -> bool {
        let parallel = self
            .parallel_column_threshold
            .is_some_and(|threshold| columns >= threshold.max(2));
        if parallel {
            ledger.push(DecisionRecord {
                ts_unix_ms: now_unix_ms().unwrap_or_default(),
                mode: self.mode,
                action: DecisionAction::Allow,
                issue: CompatibilityIssue {
                    kind: IssueKind::ParallelDispatch,
                    subject: "column_dispatch".to_owned(),
                    detail: format!("columns={columns}"),
                },
            });
        }
        parallel
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::strict()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
    #[error("invalid runtime policy config: {0}")]
    InvalidConfig(String),
}

fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}
