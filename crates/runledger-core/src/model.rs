//! Shared data model for the run pipeline: outcomes, case IDs, lifecycle
//! events and failure snippets.

use crate::sanitize::{redact_secrets, strip_ansi, truncate_chars};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Maximum characters kept from a raw failure body before it is queued.
pub const SNIPPET_MAX_CHARS: usize = 1200;

/// Terminal status of a single test, as delivered by the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Pattern for tracker-style case IDs embedded in test titles, e.g. `PHARMA-42`.
static CASE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][A-Z0-9]{1,15}-\d+)\b").expect("case id regex"));

/// Structured test-case identifier.
///
/// Titles are parsed exactly once, when a [`TestEndEvent`] is constructed;
/// everything downstream works with `CaseId` values rather than re-matching
/// free text. Ordering is prefix first, then the suffix: numeric suffixes of
/// any width compare as numbers (`PHARMA-9` < `PHARMA-42`), non-numeric ones
/// lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract every case ID present in a display title.
    pub fn extract_all(title: &str) -> Vec<CaseId> {
        CASE_ID_RE
            .find_iter(title)
            .map(|m| CaseId(m.as_str().to_string()))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `("PHARMA", "42")` for `PHARMA-42`; the suffix is empty when there is
    /// no dash.
    fn split(&self) -> (&str, &str) {
        self.0.rsplit_once('-').unwrap_or((self.0.as_str(), ""))
    }
}

/// Numeric suffixes compare as numbers of arbitrary width (leading zeros
/// stripped, then length, then digits) and sort before non-numeric suffixes
/// under the same prefix. Each arm is a total order in its own right, so the
/// composite stays transitive no matter how large the suffix gets.
fn cmp_suffix(a: &str, b: &str) -> Ordering {
    let a_numeric = !a.is_empty() && a.bytes().all(|c| c.is_ascii_digit());
    let b_numeric = !b.is_empty() && b.bytes().all(|c| c.is_ascii_digit());
    match (a_numeric, b_numeric) {
        (true, true) => {
            let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

impl Ord for CaseId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_prefix, a_suffix) = self.split();
        let (b_prefix, b_suffix) = other.split();
        a_prefix
            .cmp(b_prefix)
            .then_with(|| cmp_suffix(a_suffix, b_suffix))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for CaseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One test finishing, as seen by the orchestrator.
#[derive(Debug, Clone)]
pub struct TestEndEvent {
    pub title: String,
    /// IDs recovered from the title at construction. May be empty for tests
    /// that carry no tracker reference.
    pub case_ids: Vec<CaseId>,
    pub outcome: Outcome,
    /// Short failure text (stack/assertion excerpt) when `outcome == Failed`.
    pub failure: Option<String>,
}

impl TestEndEvent {
    pub fn new(title: impl Into<String>, outcome: Outcome, failure: Option<String>) -> Self {
        let title = title.into();
        let case_ids = CaseId::extract_all(&title);
        Self {
            title,
            case_ids,
            outcome,
            failure,
        }
    }
}

/// Position of this process inside a multi-batch run.
///
/// Derived from launch configuration and immutable afterwards. Governs whether
/// cumulative state is carried across processes and which process finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescriptor {
    /// 1-based batch number.
    pub index: u32,
    /// Total number of batches in the logical run.
    pub count: u32,
    pub reuse_across_batches: bool,
}

impl BatchDescriptor {
    pub fn single() -> Self {
        Self {
            index: 1,
            count: 1,
            reuse_across_batches: false,
        }
    }

    /// The finalizing batch merges artifacts, publishes and sends the summary.
    pub fn is_finalizing(&self) -> bool {
        !self.reuse_across_batches || self.index >= self.count
    }

    /// Whether this batch starts by folding in a prior cumulative snapshot.
    pub fn merges_prior(&self) -> bool {
        self.reuse_across_batches && self.index > 1
    }
}

impl Default for BatchDescriptor {
    fn default() -> Self {
        Self::single()
    }
}

/// A sanitized, truncated excerpt of one test failure, destined for the
/// external channel. Created once per failing test, consumed by one flush.
#[derive(Debug, Clone)]
pub struct FailureSnippet {
    pub title: String,
    pub body: String,
    pub enqueued_at: DateTime<Utc>,
}

impl FailureSnippet {
    /// Build a snippet from raw failure text: ANSI stripped, credentials
    /// masked, truncated to [`SNIPPET_MAX_CHARS`].
    pub fn new(title: impl Into<String>, raw_failure: &str) -> Self {
        let body = truncate_chars(&redact_secrets(&strip_ansi(raw_failure)), SNIPPET_MAX_CHARS);
        Self {
            title: title.into(),
            body,
            enqueued_at: Utc::now(),
        }
    }
}
