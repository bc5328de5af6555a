use std::fmt;

use serde::{Deserialize, Serialize};

/// Completion status reported by a policy run.
///
/// Exactly one variant means success; every other variant is a failure that
/// the dispatcher surfaces as a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Success,
    /// An assertion in the policy evaluated to false.
    Falsified,
    /// The policy failed for a reason it reported itself.
    Failed,
    /// The policy hit an unexpected internal error.
    ServerError,
    /// The policy changed between resolution and execution.
    PolicyVersionMismatch,
    AuthRequired,
    Unauthorized,
    BadRequest,
}

impl CompletionStatus {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Numeric status code, stable across releases.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::Falsified => 600,
            Self::Failed => 601,
            Self::ServerError => 500,
            Self::PolicyVersionMismatch => 602,
            Self::AuthRequired => 401,
            Self::Unauthorized => 403,
            Self::BadRequest => 400,
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "no error",
            Self::Falsified => "assertion falsified",
            Self::Failed => "policy failed",
            Self::ServerError => "internal server error",
            Self::PolicyVersionMismatch => "policy version mismatch",
            Self::AuthRequired => "authentication required",
            Self::Unauthorized => "not authorized",
            Self::BadRequest => "bad request",
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}
