//! Invocation, outcome and error types carried through the dispatch pipeline.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use polback_core::{
    CompletionStatus, ImplementationId, InterfaceId, PolicyId, TemplateError, Value, VariableMap,
};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One call of an interface operation, as it travels through the pipeline.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Process-unique id used to correlate log lines of one call.
    pub call_id: u64,
    pub interface_id: InterfaceId,
    /// Explicit implementation to target. `None` requires exactly one
    /// implementation to be registered for the interface.
    pub selector: Option<ImplementationId>,
    pub operation: String,
    /// Positional actual arguments; index `i` feeds the descriptor with ordinal `i + 1`.
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(
        interface_id: InterfaceId,
        selector: Option<ImplementationId>,
        operation: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            call_id: NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed),
            interface_id,
            selector,
            operation: operation.into(),
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Successful result of a call, shaped by the operation's result descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation declares no results.
    Void,
    /// The operation declares exactly one result.
    Single(Value),
    /// The operation declares several results, keyed by descriptor name.
    Named(VariableMap),
}

impl Outcome {
    /// The single result value, if this outcome has that shape.
    #[must_use]
    pub fn into_single(self) -> Option<Value> {
        match self {
            Self::Single(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_named(self) -> Option<VariableMap> {
        match self {
            Self::Named(vars) => Some(vars),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }
}

/// Boxed future returned by every service in the invocation pipeline.
pub type OutcomeFuture = Pin<Box<dyn Future<Output = Result<Outcome, PolicyBackedError>> + Send>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an operation could not be served.
///
/// All three cases surface as [`PolicyBackedError::OperationNotSupported`];
/// only the message tells them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsupportedReason {
    /// The interface template does not declare the operation.
    NotDeclared,
    /// The chosen implementation declares no binding for the operation.
    NotBound { implementation_id: ImplementationId },
    /// The bound policy could not be resolved when the call ran.
    PolicyNotFound { policy_id: PolicyId },
}

impl fmt::Display for UnsupportedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDeclared => f.write_str("not declared by the interface"),
            Self::NotBound { implementation_id } => {
                write!(f, "not bound by implementation {implementation_id}")
            }
            Self::PolicyNotFound { policy_id } => {
                write!(f, "configuration error: backing policy {policy_id} not found")
            }
        }
    }
}

/// Errors returned by registration and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum PolicyBackedError {
    #[error("template already registered for interface {interface_id}")]
    TemplateAlreadyRegistered { interface_id: InterfaceId },
    #[error("no template registered for interface {interface_id}")]
    TemplateNotFound { interface_id: InterfaceId },
    #[error("invalid template: {0}")]
    InvalidTemplate(#[from] TemplateError),
    #[error("implementation {implementation_id} already registered for interface {interface_id}")]
    DuplicateImplementation {
        interface_id: InterfaceId,
        implementation_id: ImplementationId,
    },
    #[error("implementation {implementation_id} binds operation {operation} more than once")]
    DuplicateBinding {
        implementation_id: ImplementationId,
        operation: String,
    },
    #[error("operation {operation} of interface {interface_id} is not supported: {reason}")]
    OperationNotSupported {
        interface_id: InterfaceId,
        operation: String,
        reason: UnsupportedReason,
    },
    #[error("{}", implementation_not_found_message(.interface_id, .selector.as_ref()))]
    ImplementationNotFound {
        interface_id: InterfaceId,
        selector: Option<ImplementationId>,
    },
    #[error("{count} implementations registered for interface {interface_id}; a selector is required")]
    AmbiguousImplementation {
        interface_id: InterfaceId,
        count: usize,
    },
    #[error("operation {operation}, argument {argument}: {detail}")]
    ArgumentTypeMismatch {
        operation: String,
        argument: String,
        detail: String,
    },
    #[error("operation {operation}, argument {argument}: null is not allowed")]
    NullNotAllowed { operation: String, argument: String },
    #[error("operation {operation}, argument {argument}: declared data type is unknown")]
    UnknownDataType { operation: String, argument: String },
    #[error("policy {policy_id} completed with status {status}")]
    PolicyExecutionFailed {
        policy_id: PolicyId,
        status: CompletionStatus,
    },
    #[error("operation {operation}: result cannot be returned as the requested type: {detail}")]
    ResultTypeMismatch { operation: String, detail: String },
    #[error("too many concurrent invocations, try again later")]
    Overloaded,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn implementation_not_found_message(
    interface_id: &InterfaceId,
    selector: Option<&ImplementationId>,
) -> String {
    match selector {
        Some(id) => format!("implementation {id} not found for interface {interface_id}"),
        None => format!("no implementation registered for interface {interface_id}"),
    }
}

impl PolicyBackedError {
    /// Short, stable label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TemplateAlreadyRegistered { .. } => "template_already_registered",
            Self::TemplateNotFound { .. } => "template_not_found",
            Self::InvalidTemplate(_) => "invalid_template",
            Self::DuplicateImplementation { .. } => "duplicate_implementation",
            Self::DuplicateBinding { .. } => "duplicate_binding",
            Self::OperationNotSupported { .. } => "operation_not_supported",
            Self::ImplementationNotFound { .. } => "implementation_not_found",
            Self::AmbiguousImplementation { .. } => "ambiguous_implementation",
            Self::ArgumentTypeMismatch { .. } => "argument_type_mismatch",
            Self::NullNotAllowed { .. } => "null_not_allowed",
            Self::UnknownDataType { .. } => "unknown_data_type",
            Self::PolicyExecutionFailed { .. } => "policy_execution_failed",
            Self::ResultTypeMismatch { .. } => "result_type_mismatch",
            Self::Overloaded => "overloaded",
            Self::Internal(_) => "internal",
        }
    }
}

/// Failure of the policy executor itself, as opposed to a non-success
/// [`CompletionStatus`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("policy {0} not found")]
    PolicyNotFound(PolicyId),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_ids_are_unique() {
        let a = Invocation::new(InterfaceId::from("i"), None, "op", vec![]);
        let b = Invocation::new(InterfaceId::from("i"), None, "op", vec![]);
        assert_ne!(a.call_id, b.call_id);
    }

    #[test]
    fn unsupported_reasons_differ_only_in_message() {
        let declared = PolicyBackedError::OperationNotSupported {
            interface_id: InterfaceId::from("svc.Echo"),
            operation: "shout".into(),
            reason: UnsupportedReason::NotDeclared,
        };
        let missing_policy = PolicyBackedError::OperationNotSupported {
            interface_id: InterfaceId::from("svc.Echo"),
            operation: "echo".into(),
            reason: UnsupportedReason::PolicyNotFound {
                policy_id: PolicyId::from_u128(3),
            },
        };
        assert_eq!(declared.kind(), missing_policy.kind());
        assert!(declared.to_string().ends_with("not declared by the interface"));
        assert!(missing_policy.to_string().contains("configuration error"));
    }

    #[test]
    fn implementation_not_found_mentions_selector() {
        let err = PolicyBackedError::ImplementationNotFound {
            interface_id: InterfaceId::from("svc.Echo"),
            selector: Some(ImplementationId::from_u128(9)),
        };
        assert!(err.to_string().contains("00000000-0000-0000-0000-000000000009"));

        let err = PolicyBackedError::ImplementationNotFound {
            interface_id: InterfaceId::from("svc.Echo"),
            selector: None,
        };
        assert_eq!(
            err.to_string(),
            "no implementation registered for interface svc.Echo"
        );
    }

    #[test]
    fn outcome_accessors() {
        assert_eq!(Outcome::Single(Value::Int(1)).into_single(), Some(Value::Int(1)));
        assert!(Outcome::Void.into_single().is_none());
        assert!(Outcome::Void.is_void());
        assert!(Outcome::Named(VariableMap::new()).into_named().is_some());
    }
}
