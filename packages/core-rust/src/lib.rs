//! `polback` core: descriptors, data types and runtime values for policy-backed services.

pub mod context;
pub mod data_type;
pub mod descriptor;
pub mod ids;
pub mod implementation;
pub mod status;
pub mod types;
pub mod variables;

pub use context::{ExecutionContext, VariableScope};
pub use data_type::DataType;
pub use descriptor::{
    ArgumentDescriptor, OperationTemplate, ResultDescriptor, ServiceTemplate, TemplateError,
};
pub use ids::{ImplementationId, InterfaceId, PolicyId};
pub use implementation::{
    OperationBinding, PersistedImplementation, PersistedOperation, ServiceImplementation,
};
pub use status::CompletionStatus;
pub use types::{Value, ValueClass, ValueConversionError};
pub use variables::{fold_name, names_match, VariableMap};
