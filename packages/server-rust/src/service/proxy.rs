//! Callable handles bound to one interface (and optionally one operation).

use std::fmt::Display;
use std::sync::Arc;

use polback_core::{ImplementationId, InterfaceId, Value};
use tower::util::BoxCloneSyncService;
use tower::ServiceExt;

use super::operation::{Invocation, Outcome, PolicyBackedError, UnsupportedReason};
use super::templates::TemplateRegistry;

/// The dispatch pipeline as a type-erased tower service.
pub type InvocationService = BoxCloneSyncService<Invocation, Outcome, PolicyBackedError>;

/// Callable bound to one interface and an optional implementation selector.
///
/// Every call goes through the pipeline it was built with and resolves the
/// implementation afresh, so a proxy keeps working across reloads.
#[derive(Clone)]
pub struct ServiceProxy {
    service: InvocationService,
    templates: Arc<TemplateRegistry>,
    interface_id: InterfaceId,
    selector: Option<ImplementationId>,
}

impl ServiceProxy {
    pub(crate) fn new(
        service: InvocationService,
        templates: Arc<TemplateRegistry>,
        interface_id: InterfaceId,
        selector: Option<ImplementationId>,
    ) -> Self {
        Self {
            service,
            templates,
            interface_id,
            selector,
        }
    }

    #[must_use]
    pub fn interface_id(&self) -> &InterfaceId {
        &self.interface_id
    }

    #[must_use]
    pub fn selector(&self) -> Option<ImplementationId> {
        self.selector
    }

    /// Calls `operation` with positional `args`.
    ///
    /// # Errors
    ///
    /// Any dispatch error.
    pub async fn invoke(
        &self,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<Outcome, PolicyBackedError> {
        let invocation = Invocation::new(self.interface_id.clone(), self.selector, operation, args);
        self.service.clone().oneshot(invocation).await
    }

    /// Calls an operation with a single result and converts it to `T`.
    ///
    /// # Errors
    ///
    /// Any dispatch error, or [`PolicyBackedError::ResultTypeMismatch`] when
    /// the operation does not return exactly one value or the value does not
    /// convert.
    pub async fn call<T>(&self, operation: &str, args: Vec<Value>) -> Result<T, PolicyBackedError>
    where
        T: TryFrom<Value>,
        T::Error: Display,
    {
        let outcome = self.invoke(operation, args).await?;
        convert_single(operation, outcome)
    }

    /// Narrows this proxy to one operation.
    ///
    /// # Errors
    ///
    /// [`PolicyBackedError::TemplateNotFound`] for an unknown interface and
    /// [`PolicyBackedError::OperationNotSupported`] for an undeclared operation.
    pub fn operation(&self, operation: &str) -> Result<OperationProxy, PolicyBackedError> {
        let template = self.templates.template(&self.interface_id).ok_or_else(|| {
            PolicyBackedError::TemplateNotFound {
                interface_id: self.interface_id.clone(),
            }
        })?;
        let declared = template.operation(operation).ok_or_else(|| {
            PolicyBackedError::OperationNotSupported {
                interface_id: self.interface_id.clone(),
                operation: operation.to_string(),
                reason: UnsupportedReason::NotDeclared,
            }
        })?;
        Ok(OperationProxy {
            operation: declared.name().to_string(),
            proxy: self.clone(),
        })
    }
}

/// Callable bound to a single declared operation.
#[derive(Clone)]
pub struct OperationProxy {
    proxy: ServiceProxy,
    operation: String,
}

impl OperationProxy {
    /// Declared spelling of the operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn interface_id(&self) -> &InterfaceId {
        self.proxy.interface_id()
    }

    /// # Errors
    ///
    /// Any dispatch error.
    pub async fn invoke(&self, args: Vec<Value>) -> Result<Outcome, PolicyBackedError> {
        self.proxy.invoke(&self.operation, args).await
    }

    /// # Errors
    ///
    /// See [`ServiceProxy::call`].
    pub async fn call<T>(&self, args: Vec<Value>) -> Result<T, PolicyBackedError>
    where
        T: TryFrom<Value>,
        T::Error: Display,
    {
        self.proxy.call(&self.operation, args).await
    }
}

fn convert_single<T>(operation: &str, outcome: Outcome) -> Result<T, PolicyBackedError>
where
    T: TryFrom<Value>,
    T::Error: Display,
{
    let mismatch = |detail: String| PolicyBackedError::ResultTypeMismatch {
        operation: operation.to_string(),
        detail,
    };
    match outcome {
        Outcome::Single(value) => T::try_from(value).map_err(|e| mismatch(e.to_string())),
        Outcome::Void => Err(mismatch("operation returns no value".to_string())),
        Outcome::Named(vars) => Err(mismatch(format!(
            "operation returns {} named values",
            vars.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use polback_core::VariableMap;

    use super::*;
    use crate::test_support::{echo_dispatcher, implementation, policy_id, ECHO};

    #[test]
    fn single_value_converts() {
        let n: i64 = convert_single("op", Outcome::Single(Value::Int(42))).unwrap();
        assert_eq!(n, 42);
        let v: Value = convert_single("op", Outcome::Single(Value::Null)).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn wrong_shape_or_class_is_result_type_mismatch() {
        let err = convert_single::<String>("op", Outcome::Single(Value::Int(1))).unwrap_err();
        assert!(matches!(err, PolicyBackedError::ResultTypeMismatch { .. }));
        assert!(err.to_string().contains("expected string, found int"));

        let err = convert_single::<i64>("op", Outcome::Void).unwrap_err();
        assert!(matches!(err, PolicyBackedError::ResultTypeMismatch { .. }));

        let err = convert_single::<i64>("op", Outcome::Named(VariableMap::new())).unwrap_err();
        assert!(matches!(err, PolicyBackedError::ResultTypeMismatch { .. }));
    }

    #[tokio::test]
    async fn typed_call_through_proxy() {
        let (dispatcher, executor) = echo_dispatcher();
        dispatcher
            .implementations()
            .register(implementation(1, ECHO, &["echo"]))
            .unwrap();
        executor.echo(policy_id(1, 0), "x", "out");

        let proxy = dispatcher.proxy(ECHO, None);
        let echoed: String = proxy.call("echo", vec!["hi".into()]).await.unwrap();
        assert_eq!(echoed, "hi");
    }

    #[tokio::test]
    async fn operation_proxy_validates_eagerly() {
        let (dispatcher, _) = echo_dispatcher();
        assert!(matches!(
            dispatcher.operation_proxy(ECHO, "shout", None),
            Err(PolicyBackedError::OperationNotSupported { .. })
        ));
        assert!(matches!(
            dispatcher.operation_proxy("svc.Missing", "echo", None),
            Err(PolicyBackedError::TemplateNotFound { .. })
        ));

        // Declared but nothing registered yet: fine until it is called.
        let echo = dispatcher.operation_proxy(ECHO, "ECHO", None).unwrap();
        assert_eq!(echo.operation(), "echo");
        assert!(matches!(
            echo.invoke(vec!["hi".into()]).await,
            Err(PolicyBackedError::ImplementationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn operation_proxy_sees_later_registrations() {
        let (dispatcher, executor) = echo_dispatcher();
        let echo = dispatcher.operation_proxy(ECHO, "echo", None).unwrap();

        dispatcher
            .implementations()
            .register(implementation(1, ECHO, &["echo"]))
            .unwrap();
        executor.echo(policy_id(1, 0), "x", "out");

        let out: String = echo.call(vec!["later".into()]).await.unwrap();
        assert_eq!(out, "later");
    }
}
