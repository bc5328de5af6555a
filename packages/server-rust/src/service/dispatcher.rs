//! Dispatch of interface operations to backing policies.

use std::sync::Arc;
use std::task::{Context, Poll};

use polback_core::{
    ImplementationId, InterfaceId, OperationTemplate, PolicyId, ServiceTemplate, Value,
};
use tower::util::BoxCloneSyncService;
use tower::Service;
use tracing::debug;

use super::implementations::ImplementationRegistry;
use super::lease::ContextLease;
use super::marshal::{marshal_arguments, unmarshal_results};
use super::operation::{
    Invocation, Outcome, OutcomeFuture, PolicyBackedError, RunError, UnsupportedReason,
};
use super::proxy::{InvocationService, OperationProxy, ServiceProxy};
use super::templates::TemplateRegistry;
use crate::traits::PolicyExecutor;

/// Everything a call needs, copied out of the registries before the run.
struct ResolvedCall {
    template: Arc<ServiceTemplate>,
    op_index: usize,
    implementation_id: ImplementationId,
    policy_id: PolicyId,
}

impl ResolvedCall {
    fn operation(&self) -> &OperationTemplate {
        &self.template.operations()[self.op_index]
    }
}

/// Routes invocations to the policy bound by the resolved implementation.
///
/// Resolution reads one registry snapshot and takes no lock, so a reload
/// that runs while a policy executes neither waits for the call nor changes
/// what the call already resolved.
pub struct Dispatcher {
    templates: Arc<TemplateRegistry>,
    implementations: Arc<ImplementationRegistry>,
    executor: Arc<dyn PolicyExecutor>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        implementations: Arc<ImplementationRegistry>,
        executor: Arc<dyn PolicyExecutor>,
    ) -> Self {
        Self {
            templates: Arc::clone(implementations.templates()),
            implementations,
            executor,
        }
    }

    /// Generic entry point: calls `operation` of `interface_id` with
    /// positional `args`.
    ///
    /// # Errors
    ///
    /// Any dispatch error; see [`execute`](Self::execute).
    pub async fn invoke(
        &self,
        interface_id: impl Into<InterfaceId>,
        selector: Option<ImplementationId>,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<Outcome, PolicyBackedError> {
        self.execute(Invocation::new(interface_id.into(), selector, operation, args))
            .await
    }

    /// Runs one invocation end to end: resolve, marshal, run, unmarshal.
    ///
    /// # Errors
    ///
    /// - [`PolicyBackedError::TemplateNotFound`] for an unknown interface
    /// - [`PolicyBackedError::OperationNotSupported`] if the operation is not
    ///   declared, not bound, or bound to a policy the executor cannot find
    /// - [`PolicyBackedError::ImplementationNotFound`] /
    ///   [`PolicyBackedError::AmbiguousImplementation`] from resolution
    /// - argument errors from marshalling
    /// - [`PolicyBackedError::PolicyExecutionFailed`] for a non-success status
    /// - [`PolicyBackedError::Internal`] for executor infrastructure failures
    pub async fn execute(&self, invocation: Invocation) -> Result<Outcome, PolicyBackedError> {
        let call = self.resolve(&invocation)?;
        let op = call.operation();
        let vars = marshal_arguments(op, invocation.args)?;

        debug!(
            call_id = invocation.call_id,
            interface = %invocation.interface_id,
            operation = op.name(),
            implementation = %call.implementation_id,
            policy = %call.policy_id,
            "running backing policy"
        );

        let mut lease = ContextLease::acquire(self.executor.as_ref())?;
        for (name, value) in vars {
            lease.set_variable(&name, value);
        }

        match self.executor.run(call.policy_id, &mut *lease).await {
            Ok(status) if status.is_success() => {}
            Ok(status) => {
                debug!(call_id = invocation.call_id, %status, "backing policy did not succeed");
                return Err(PolicyBackedError::PolicyExecutionFailed {
                    policy_id: call.policy_id,
                    status,
                });
            }
            Err(RunError::PolicyNotFound(policy_id)) => {
                return Err(PolicyBackedError::OperationNotSupported {
                    interface_id: invocation.interface_id,
                    operation: op.name().to_string(),
                    reason: UnsupportedReason::PolicyNotFound { policy_id },
                });
            }
            Err(RunError::Other(err)) => return Err(PolicyBackedError::Internal(err)),
        }

        unmarshal_results(op, &*lease)
    }

    /// Template lookup, implementation resolution and binding lookup, all
    /// against a single snapshot.
    fn resolve(&self, invocation: &Invocation) -> Result<ResolvedCall, PolicyBackedError> {
        let interface_id = &invocation.interface_id;
        let template = self.template(interface_id)?;
        let op_index = template
            .operations()
            .iter()
            .position(|op| op.matches_name(&invocation.operation))
            .ok_or_else(|| PolicyBackedError::OperationNotSupported {
                interface_id: interface_id.clone(),
                operation: invocation.operation.clone(),
                reason: UnsupportedReason::NotDeclared,
            })?;

        let implementation = self
            .implementations
            .snapshot()
            .resolve(interface_id, invocation.selector)?;
        let binding = implementation
            .binding(&invocation.operation)
            .ok_or_else(|| PolicyBackedError::OperationNotSupported {
                interface_id: interface_id.clone(),
                operation: invocation.operation.clone(),
                reason: UnsupportedReason::NotBound {
                    implementation_id: implementation.id,
                },
            })?;

        Ok(ResolvedCall {
            policy_id: binding.policy_id,
            implementation_id: implementation.id,
            template,
            op_index,
        })
    }

    fn template(&self, interface_id: &InterfaceId) -> Result<Arc<ServiceTemplate>, PolicyBackedError> {
        self.templates
            .template(interface_id)
            .ok_or_else(|| PolicyBackedError::TemplateNotFound {
                interface_id: interface_id.clone(),
            })
    }

    /// Proxy bound to `interface_id` that calls this dispatcher directly,
    /// without middleware.
    #[must_use]
    pub fn proxy(
        self: &Arc<Self>,
        interface_id: impl Into<InterfaceId>,
        selector: Option<ImplementationId>,
    ) -> ServiceProxy {
        ServiceProxy::new(
            self.service(),
            Arc::clone(&self.templates),
            interface_id.into(),
            selector,
        )
    }

    /// Proxy bound to a single operation.
    ///
    /// # Errors
    ///
    /// [`PolicyBackedError::TemplateNotFound`] or
    /// [`PolicyBackedError::OperationNotSupported`] if the operation is not
    /// declared. Implementation resolution still happens per call.
    pub fn operation_proxy(
        self: &Arc<Self>,
        interface_id: impl Into<InterfaceId>,
        operation: &str,
        selector: Option<ImplementationId>,
    ) -> Result<OperationProxy, PolicyBackedError> {
        self.proxy(interface_id, selector).operation(operation)
    }

    /// This dispatcher as a boxed tower service.
    #[must_use]
    pub fn service(self: &Arc<Self>) -> InvocationService {
        BoxCloneSyncService::new(Arc::clone(self))
    }

    #[must_use]
    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    #[must_use]
    pub fn implementations(&self) -> &Arc<ImplementationRegistry> {
        &self.implementations
    }
}

impl Service<Invocation> for Arc<Dispatcher> {
    type Response = Outcome;
    type Error = PolicyBackedError;
    type Future = OutcomeFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let dispatcher = Arc::clone(self);
        Box::pin(async move { dispatcher.execute(invocation).await })
    }
}
