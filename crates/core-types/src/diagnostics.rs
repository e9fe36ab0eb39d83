use serde::{Deserialize, Serialize};
use std::fmt;

/// A structured, non-fatal note attached to an analysis result.
///
/// These are how degraded-but-valid outcomes are reported: a caller can tell a
/// fully fitted model from one that fell back to a simpler estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An iterative fit stopped at its iteration budget; the best state reached was kept.
    ConvergenceWarning {
        stage: String,
        iterations: usize,
        detail: String,
    },
    /// The requested method could not be used and a simpler one was substituted.
    Fallback {
        requested: String,
        used: String,
        reason: String,
    },
    /// A method was left out of the result because the input cannot support it.
    MethodExcluded { method: String, reason: String },
}

impl Diagnostic {
    pub fn convergence(stage: impl Into<String>, iterations: usize, detail: impl Into<String>) -> Self {
        Diagnostic::ConvergenceWarning {
            stage: stage.into(),
            iterations,
            detail: detail.into(),
        }
    }

    pub fn fallback(
        requested: impl Into<String>,
        used: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Diagnostic::Fallback {
            requested: requested.into(),
            used: used.into(),
            reason: reason.into(),
        }
    }

    pub fn excluded(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Diagnostic::MethodExcluded {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn is_convergence_warning(&self) -> bool {
        matches!(self, Diagnostic::ConvergenceWarning { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ConvergenceWarning { stage, iterations, detail } => {
                write!(f, "{} did not converge after {} iterations: {}", stage, iterations, detail)
            }
            Diagnostic::Fallback { requested, used, reason } => {
                write!(f, "{} fell back to {}: {}", requested, used, reason)
            }
            Diagnostic::MethodExcluded { method, reason } => {
                write!(f, "{} excluded: {}", method, reason)
            }
        }
    }
}
