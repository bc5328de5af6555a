//! Operation and service templates: the declared shape of a service interface.
//!
//! Templates are immutable once built. All structural checks (ordinal
//! sequence, name uniqueness) happen here, at construction, so the registry
//! and the dispatcher can assume well-formed templates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::data_type::DataType;
use crate::ids::InterfaceId;
use crate::types::ValueClass;
use crate::variables::{fold_name, names_match};

/// Structural problem found while building a template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("interface id must not be empty")]
    EmptyInterfaceId,
    #[error("operation name must not be empty")]
    EmptyOperationName,
    #[error("operation {operation}: argument or result name must not be empty")]
    EmptyDescriptorName { operation: String },
    #[error("operation {operation}: argument ordinals must be 1..={count}, found {found:?}")]
    InvalidOrdinals {
        operation: String,
        count: usize,
        found: Vec<u32>,
    },
    #[error("operation {operation}: duplicate argument name {name}")]
    DuplicateArgument { operation: String, name: String },
    #[error("operation {operation}: duplicate result name {name}")]
    DuplicateResult { operation: String, name: String },
    #[error("interface {interface_id}: duplicate operation {operation}")]
    DuplicateOperation {
        interface_id: String,
        operation: String,
    },
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// One declared argument of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    /// Variable name the argument is bound to in the execution context.
    pub name: String,
    /// 1-based position of the formal parameter in the interface signature.
    pub ordinal: u32,
    pub data_type: DataType,
    /// Formal parameter class declared by the interface signature.
    #[serde(default = "any_class")]
    pub param_class: ValueClass,
    /// Whether a `Null` actual value is permitted.
    #[serde(default)]
    pub nullable: bool,
}

fn any_class() -> ValueClass {
    ValueClass::Any
}

impl ArgumentDescriptor {
    /// A non-nullable argument with an untyped (`Any`) formal parameter.
    pub fn new(name: impl Into<String>, ordinal: u32, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            ordinal,
            data_type,
            param_class: ValueClass::Any,
            nullable: false,
        }
    }

    #[must_use]
    pub fn with_param_class(mut self, param_class: ValueClass) -> Self {
        self.param_class = param_class;
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// One declared result of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub name: String,
    pub data_type: DataType,
}

impl ResultDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

// ---------------------------------------------------------------------------
// OperationTemplate
// ---------------------------------------------------------------------------

/// Declared shape of one operation: its name, arguments and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationTemplate {
    name: String,
    /// Sorted by ordinal; ordinals are exactly `1..=arguments.len()`.
    arguments: Vec<ArgumentDescriptor>,
    results: Vec<ResultDescriptor>,
}

impl OperationTemplate {
    /// Builds a template, validating ordinals and name uniqueness.
    ///
    /// # Errors
    ///
    /// Returns a [`TemplateError`] when the name is empty, the ordinals are not
    /// exactly `1..=n`, or two arguments (or two results) share a name
    /// case-insensitively.
    pub fn new(
        name: impl Into<String>,
        mut arguments: Vec<ArgumentDescriptor>,
        results: Vec<ResultDescriptor>,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TemplateError::EmptyOperationName);
        }

        arguments.sort_by_key(|a| a.ordinal);
        let sequential = arguments
            .iter()
            .zip(1u32..)
            .all(|(arg, expected)| arg.ordinal == expected);
        if !sequential {
            return Err(TemplateError::InvalidOrdinals {
                operation: name,
                count: arguments.len(),
                found: arguments.iter().map(|a| a.ordinal).collect(),
            });
        }

        let mut seen = HashSet::new();
        for arg in &arguments {
            if arg.name.is_empty() {
                return Err(TemplateError::EmptyDescriptorName { operation: name });
            }
            if !seen.insert(fold_name(&arg.name)) {
                return Err(TemplateError::DuplicateArgument {
                    operation: name,
                    name: arg.name.clone(),
                });
            }
        }

        seen.clear();
        for result in &results {
            if result.name.is_empty() {
                return Err(TemplateError::EmptyDescriptorName { operation: name });
            }
            if !seen.insert(fold_name(&result.name)) {
                return Err(TemplateError::DuplicateResult {
                    operation: name,
                    name: result.name.clone(),
                });
            }
        }

        Ok(Self {
            name,
            arguments,
            results,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments in ordinal order.
    #[must_use]
    pub fn arguments(&self) -> &[ArgumentDescriptor] {
        &self.arguments
    }

    #[must_use]
    pub fn results(&self) -> &[ResultDescriptor] {
        &self.results
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        names_match(&self.name, name)
    }
}

// ---------------------------------------------------------------------------
// ServiceTemplate
// ---------------------------------------------------------------------------

/// All declared operations of one service interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTemplate {
    interface_id: InterfaceId,
    operations: Vec<OperationTemplate>,
}

impl ServiceTemplate {
    /// # Errors
    ///
    /// Returns [`TemplateError::EmptyInterfaceId`] for a blank id and
    /// [`TemplateError::DuplicateOperation`] when two operations share a name
    /// case-insensitively.
    pub fn new(
        interface_id: InterfaceId,
        operations: Vec<OperationTemplate>,
    ) -> Result<Self, TemplateError> {
        if interface_id.as_str().trim().is_empty() {
            return Err(TemplateError::EmptyInterfaceId);
        }
        let mut seen = HashSet::new();
        for op in &operations {
            if !seen.insert(fold_name(op.name())) {
                return Err(TemplateError::DuplicateOperation {
                    interface_id: interface_id.to_string(),
                    operation: op.name().to_string(),
                });
            }
        }
        Ok(Self {
            interface_id,
            operations,
        })
    }

    #[must_use]
    pub fn interface_id(&self) -> &InterfaceId {
        &self.interface_id
    }

    #[must_use]
    pub fn operations(&self) -> &[OperationTemplate] {
        &self.operations
    }

    /// Case-insensitive operation lookup.
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&OperationTemplate> {
        self.operations.iter().find(|op| op.matches_name(name))
    }

    #[must_use]
    pub fn has_operation(&self, name: &str) -> bool {
        self.operation(name).is_some()
    }
}
