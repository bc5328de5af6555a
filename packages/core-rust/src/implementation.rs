//! Concrete service implementations: bindings of operations to backing policies.

use serde::{Deserialize, Serialize};

use crate::ids::{ImplementationId, InterfaceId, PolicyId};
use crate::variables::names_match;

/// Binds one operation name to the policy that realises it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBinding {
    pub operation_name: String,
    pub policy_id: PolicyId,
}

impl OperationBinding {
    pub fn new(operation_name: impl Into<String>, policy_id: PolicyId) -> Self {
        Self {
            operation_name: operation_name.into(),
            policy_id,
        }
    }
}

/// A named, identified bundle of operation bindings for one interface.
///
/// Implementations are never mutated once registered; a reload replaces them
/// wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceImplementation {
    pub id: ImplementationId,
    pub display_name: String,
    pub interface_id: InterfaceId,
    pub bindings: Vec<OperationBinding>,
}

impl ServiceImplementation {
    pub fn new(
        id: ImplementationId,
        display_name: impl Into<String>,
        interface_id: InterfaceId,
        bindings: Vec<OperationBinding>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            interface_id,
            bindings,
        }
    }

    /// Case-insensitive binding lookup.
    #[must_use]
    pub fn binding(&self, operation_name: &str) -> Option<&OperationBinding> {
        self.bindings
            .iter()
            .find(|b| names_match(&b.operation_name, operation_name))
    }

    /// First binding name that occurs more than once (case-insensitively).
    #[must_use]
    pub fn duplicate_binding(&self) -> Option<&str> {
        self.bindings.iter().enumerate().find_map(|(i, b)| {
            self.bindings[..i]
                .iter()
                .any(|earlier| names_match(&earlier.operation_name, &b.operation_name))
                .then_some(b.operation_name.as_str())
        })
    }
}

// ---------------------------------------------------------------------------
// Persisted form
// ---------------------------------------------------------------------------

/// One operation row of a persisted implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedOperation {
    pub name: String,
    pub policy_id: PolicyId,
}

/// An implementation as stored by the configuration store.
///
/// Carries the same information as [`ServiceImplementation`] but in storage
/// vocabulary; conversion does no validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedImplementation {
    pub id: ImplementationId,
    pub name: String,
    pub interface_name: String,
    #[serde(default)]
    pub operations: Vec<PersistedOperation>,
}

impl From<PersistedImplementation> for ServiceImplementation {
    fn from(record: PersistedImplementation) -> Self {
        Self {
            id: record.id,
            display_name: record.name,
            interface_id: InterfaceId::new(record.interface_name),
            bindings: record
                .operations
                .into_iter()
                .map(|op| OperationBinding::new(op.name, op.policy_id))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn implementation() -> ServiceImplementation {
        ServiceImplementation::new(
            ImplementationId::from_u128(1),
            "Nightly cleanup",
            InterfaceId::from("polback.BackgroundTask"),
            vec![OperationBinding::new("run", PolicyId::from_u128(7))],
        )
    }

    #[test]
    fn binding_lookup_ignores_case() {
        let imp = implementation();
        assert_eq!(imp.binding("RUN").map(|b| b.policy_id), Some(PolicyId::from_u128(7)));
        assert!(imp.binding("stop").is_none());
    }

    #[test]
    fn duplicate_binding_detected() {
        let mut imp = implementation();
        assert!(imp.duplicate_binding().is_none());
        imp.bindings.push(OperationBinding::new("Run", PolicyId::from_u128(8)));
        assert_eq!(imp.duplicate_binding(), Some("Run"));
    }

    #[test]
    fn persisted_record_converts() {
        let record: PersistedImplementation = serde_json::from_str(
            r#"{
                "id": "00000000-0000-0000-0000-000000000001",
                "name": "Nightly cleanup",
                "interface_name": "polback.BackgroundTask",
                "operations": [
                    {"name": "run", "policy_id": "00000000-0000-0000-0000-000000000007"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(ServiceImplementation::from(record), implementation());
    }
}
