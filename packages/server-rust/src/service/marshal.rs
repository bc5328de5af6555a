//! Argument marshalling and result unmarshalling.
//!
//! Positional actuals are checked against the operation's argument
//! descriptors and turned into a name-keyed [`VariableMap`] before anything
//! runs. After the run, the declared results are read back and shaped into an
//! [`Outcome`].

use polback_core::{
    ArgumentDescriptor, ExecutionContext, OperationTemplate, ResultDescriptor, Value, VariableMap,
};

use super::operation::{Outcome, PolicyBackedError};

/// Checks `args` against `op` and binds them by descriptor name.
///
/// For each descriptor, in ordinal order:
/// 1. the declared data type must be known
/// 2. the data type must accept the formal parameter class
/// 3. `Null` is only allowed for nullable descriptors
/// 4. the actual class must be assignable to the formal class
/// 5. the data type must accept the actual class
///
/// # Errors
///
/// [`PolicyBackedError::ArgumentTypeMismatch`] (including a wrong argument
/// count), [`PolicyBackedError::NullNotAllowed`] or
/// [`PolicyBackedError::UnknownDataType`]. Nothing is bound on error.
pub fn marshal_arguments(
    op: &OperationTemplate,
    args: Vec<Value>,
) -> Result<VariableMap, PolicyBackedError> {
    if args.len() != op.arity() {
        return Err(PolicyBackedError::ArgumentTypeMismatch {
            operation: op.name().to_string(),
            argument: "*".to_string(),
            detail: format!("expected {} arguments, got {}", op.arity(), args.len()),
        });
    }

    let mut bound = VariableMap::new();
    for (descriptor, value) in op.arguments().iter().zip(args) {
        check_argument(op, descriptor, &value)?;
        bound.insert(descriptor.name.clone(), value);
    }
    Ok(bound)
}

fn check_argument(
    op: &OperationTemplate,
    descriptor: &ArgumentDescriptor,
    value: &Value,
) -> Result<(), PolicyBackedError> {
    let mismatch = |detail: String| PolicyBackedError::ArgumentTypeMismatch {
        operation: op.name().to_string(),
        argument: descriptor.name.clone(),
        detail,
    };

    if descriptor.data_type.is_unknown() {
        return Err(PolicyBackedError::UnknownDataType {
            operation: op.name().to_string(),
            argument: descriptor.name.clone(),
        });
    }
    if !descriptor.data_type.accepts(descriptor.param_class) {
        return Err(mismatch(format!(
            "data type {} cannot carry a {} parameter",
            descriptor.data_type, descriptor.param_class
        )));
    }

    let Some(actual) = value.class() else {
        return if descriptor.nullable {
            Ok(())
        } else {
            Err(PolicyBackedError::NullNotAllowed {
                operation: op.name().to_string(),
                argument: descriptor.name.clone(),
            })
        };
    };

    if !descriptor.param_class.is_assignable_from(actual) {
        return Err(mismatch(format!(
            "{actual} value is not assignable to a {} parameter",
            descriptor.param_class
        )));
    }
    if !descriptor.data_type.accepts(actual) {
        return Err(mismatch(format!(
            "data type {} does not accept a {actual} value",
            descriptor.data_type
        )));
    }
    Ok(())
}

/// Reads the declared results of `op` out of `ctx`.
///
/// Results the policy left unset come back as [`Value::Null`]. Every other
/// value must be accepted by its descriptor's data type.
///
/// # Errors
///
/// [`PolicyBackedError::ResultTypeMismatch`] for the first result whose
/// value the declared data type does not accept.
pub fn unmarshal_results(
    op: &OperationTemplate,
    ctx: &dyn ExecutionContext,
) -> Result<Outcome, PolicyBackedError> {
    let descriptors = op.results();
    if descriptors.is_empty() {
        return Ok(Outcome::Void);
    }

    let names: Vec<&str> = descriptors.iter().map(|r| r.name.as_str()).collect();
    let mut found = ctx.get_variables(&names);
    let mut values = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let value = found.remove(&descriptor.name).unwrap_or(Value::Null);
        check_result(op, descriptor, &value)?;
        values.push((descriptor.name.as_str(), value));
    }

    match values.len() {
        1 => Ok(Outcome::Single(values.swap_remove(0).1)),
        _ => Ok(Outcome::Named(values.into_iter().collect())),
    }
}

fn check_result(
    op: &OperationTemplate,
    descriptor: &ResultDescriptor,
    value: &Value,
) -> Result<(), PolicyBackedError> {
    match value.class() {
        Some(class) if !descriptor.data_type.accepts(class) => {
            Err(PolicyBackedError::ResultTypeMismatch {
                operation: op.name().to_string(),
                detail: format!(
                    "result {}: data type {} does not accept a {class} value",
                    descriptor.name, descriptor.data_type
                ),
            })
        }
        _ => Ok(()),
    }
}
