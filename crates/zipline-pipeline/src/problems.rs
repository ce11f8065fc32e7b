//! Append-only log of per-file failures.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, PoisonError};

use zipline_core::FsPath;

/// Pipeline stage a problem was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemStage {
    /// Listing a directory failed.
    Listing,
    /// Starting a transfer failed.
    Transfer,
    /// Relaying file content failed.
    Relay,
}

impl ProblemStage {
    /// Stable label used in metrics and manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Transfer => "transfer",
            Self::Relay => "relay",
        }
    }
}

/// One recorded failure. Diagnostic only; never drives control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    /// Stage that produced the failure.
    pub stage: ProblemStage,
    /// Path the failure relates to.
    pub path: FsPath,
    /// Human-readable description including the source chain.
    pub detail: String,
}

impl Problem {
    /// Describe `error` (and its sources) against `path`.
    #[must_use]
    pub fn from_error(stage: ProblemStage, path: FsPath, error: &(dyn Error + 'static)) -> Self {
        let mut detail = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            stage,
            path,
            detail,
        }
    }
}

impl Display for Problem {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {}: {}",
            self.stage.as_str(),
            self.path,
            self.detail
        )
    }
}

/// Thread-safe list of problems for one request.
#[derive(Debug, Default)]
pub struct ProblemLog {
    entries: Mutex<Vec<Problem>>,
}

impl ProblemLog {
    /// Append a problem.
    pub fn record(&self, problem: Problem) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(problem);
    }

    /// Copy of every problem recorded so far.
    pub fn snapshot(&self) -> Vec<Problem> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded problems.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
