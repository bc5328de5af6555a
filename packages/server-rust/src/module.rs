//! Policy-backed service module with deferred startup lifecycle.
//!
//! `new()` allocates the registries, the dispatcher and the reload
//! controller; `start()` spawns the reload worker and performs the initial
//! reload; `shutdown()` stops the worker. Templates are registered between
//! `new()` and `start()` so the initial reload can validate against them.

use std::sync::Arc;

use polback_core::{ImplementationId, InterfaceId, OperationTemplate, ServiceTemplate, Value};
use tower::ServiceExt;
use tracing::{info, warn};

use crate::reload::controller::{ReloadController, ReloadError, ReloadOutcome, ReloadRunnable};
use crate::service::config::PolbackConfig;
use crate::service::dispatcher::Dispatcher;
use crate::service::implementations::ImplementationRegistry;
use crate::service::middleware::build_invocation_pipeline;
use crate::service::operation::{Invocation, Outcome, PolicyBackedError};
use crate::service::proxy::{InvocationService, OperationProxy, ServiceProxy};
use crate::service::templates::TemplateRegistry;
use crate::service::worker::BackgroundWorker;
use crate::traits::{ChangeNotifier, ImplementationStore, PolicyExecutor};

/// Owns every component of the policy-backed service layer.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state and subscribes to change events
/// 2. `start()` -- starts reacting to events and loads persisted implementations
/// 3. `shutdown()` -- stops reacting to events
///
/// Calls made before `start()` see only explicitly registered implementations.
pub struct PolicyBackedModule {
    config: PolbackConfig,
    templates: Arc<TemplateRegistry>,
    implementations: Arc<ImplementationRegistry>,
    dispatcher: Arc<Dispatcher>,
    pipeline: InvocationService,
    controller: Arc<ReloadController>,
    worker: Option<BackgroundWorker<ReloadRunnable>>,
}

impl PolicyBackedModule {
    /// Creates the module with the built-in templates registered.
    ///
    /// # Errors
    ///
    /// Fails only if a built-in template is malformed.
    pub fn new(
        config: PolbackConfig,
        executor: Arc<dyn PolicyExecutor>,
        store: Arc<dyn ImplementationStore>,
        notifier: &dyn ChangeNotifier,
    ) -> Result<Self, PolicyBackedError> {
        let templates = Arc::new(TemplateRegistry::new());
        templates.register_builtin_templates()?;

        let implementations = Arc::new(ImplementationRegistry::new(
            Arc::clone(&templates),
            config.require_complete_bindings,
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&implementations), executor));
        let pipeline = build_invocation_pipeline(&dispatcher, &config);
        let controller = Arc::new(ReloadController::new(
            Arc::clone(&implementations),
            store,
            notifier,
        ));

        Ok(Self {
            config,
            templates,
            implementations,
            dispatcher,
            pipeline,
            controller,
            worker: None,
        })
    }

    /// Registers an interface template. Normally called before `start()`.
    ///
    /// # Errors
    ///
    /// See [`TemplateRegistry::register`].
    pub fn register_template(
        &self,
        interface_id: impl Into<InterfaceId>,
        operations: Vec<OperationTemplate>,
    ) -> Result<Arc<ServiceTemplate>, PolicyBackedError> {
        self.templates.register(interface_id, operations)
    }

    /// Starts the reload worker and, with `reload_on_start`, loads the
    /// persisted implementations before returning.
    ///
    /// Returns `Ok(None)` when no reload was performed. Calling `start()` on a
    /// running module does nothing.
    ///
    /// # Errors
    ///
    /// [`ReloadError::Fetch`] if the initial reload could not reach the store.
    /// The worker is running regardless, so a later change event retries.
    pub async fn start(&mut self) -> Result<Option<ReloadOutcome>, ReloadError> {
        if self.worker.is_some() {
            warn!(node_id = %self.config.node_id, "policy-backed module already started");
            return Ok(None);
        }
        self.worker = self.controller.start();
        info!(
            node_id = %self.config.node_id,
            templates = self.templates.len(),
            "policy-backed module started"
        );

        if !self.config.reload_on_start {
            return Ok(None);
        }
        self.controller.reload().await.map(Some)
    }

    /// Stops the reload worker. Dispatch keeps working with the last snapshot.
    pub async fn shutdown(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop().await;
            info!(node_id = %self.config.node_id, "policy-backed module stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(BackgroundWorker::is_running)
    }

    /// Proxy bound to `interface_id`, calling through the configured middleware.
    #[must_use]
    pub fn proxy(
        &self,
        interface_id: impl Into<InterfaceId>,
        selector: Option<ImplementationId>,
    ) -> ServiceProxy {
        ServiceProxy::new(
            self.pipeline.clone(),
            Arc::clone(&self.templates),
            interface_id.into(),
            selector,
        )
    }

    /// # Errors
    ///
    /// See [`ServiceProxy::operation`].
    pub fn operation_proxy(
        &self,
        interface_id: impl Into<InterfaceId>,
        operation: &str,
        selector: Option<ImplementationId>,
    ) -> Result<OperationProxy, PolicyBackedError> {
        self.proxy(interface_id, selector).operation(operation)
    }

    /// Calls an operation through the configured middleware.
    ///
    /// # Errors
    ///
    /// Any dispatch error.
    pub async fn invoke(
        &self,
        interface_id: impl Into<InterfaceId>,
        selector: Option<ImplementationId>,
        operation: &str,
        args: Vec<Value>,
    ) -> Result<Outcome, PolicyBackedError> {
        let invocation = Invocation::new(interface_id.into(), selector, operation, args);
        self.pipeline.clone().oneshot(invocation).await
    }

    #[must_use]
    pub fn config(&self) -> &PolbackConfig {
        &self.config
    }

    #[must_use]
    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    #[must_use]
    pub fn implementations(&self) -> &Arc<ImplementationRegistry> {
        &self.implementations
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn reload_controller(&self) -> &Arc<ReloadController> {
        &self.controller
    }
}
