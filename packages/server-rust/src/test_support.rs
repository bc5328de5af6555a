//! In-memory collaborators and fixtures for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use polback_core::{
    ArgumentDescriptor, CompletionStatus, DataType, ExecutionContext, ImplementationId,
    InterfaceId, OperationBinding, OperationTemplate, PersistedImplementation,
    PersistedOperation, PolicyId, ResultDescriptor, ServiceImplementation, ValueClass,
    VariableScope,
};

use crate::service::dispatcher::Dispatcher;
use crate::service::implementations::ImplementationRegistry;
use crate::service::operation::RunError;
use crate::service::templates::TemplateRegistry;
use crate::traits::{ImplementationStore, PolicyExecutor};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Interface registered by [`echo_registry`]:
///
/// - `echo(x: String) -> out: String`
/// - `reverse(x: String) -> out: String`
/// - `stats() -> (count: Integer, last: String)`
pub const ECHO: &str = "svc.Echo";

fn string_arg(name: &str) -> ArgumentDescriptor {
    ArgumentDescriptor::new(name, 1, DataType::String).with_param_class(ValueClass::String)
}

/// # Panics
///
/// Never; the fixture templates are well-formed.
#[must_use]
pub fn echo_operations() -> Vec<OperationTemplate> {
    let out = || vec![ResultDescriptor::new("out", DataType::String)];
    vec![
        OperationTemplate::new("echo", vec![string_arg("x")], out()).unwrap(),
        OperationTemplate::new("reverse", vec![string_arg("x")], out()).unwrap(),
        OperationTemplate::new(
            "stats",
            vec![],
            vec![
                ResultDescriptor::new("count", DataType::Integer),
                ResultDescriptor::new("last", DataType::String),
            ],
        )
        .unwrap(),
    ]
}

/// Template registry holding [`ECHO`].
#[must_use]
pub fn echo_registry() -> TemplateRegistry {
    let registry = TemplateRegistry::new();
    registry.register(ECHO, echo_operations()).unwrap();
    registry
}

/// Policy bound to the `index`-th operation of fixture implementation `n`.
#[must_use]
pub fn policy_id(n: u128, index: usize) -> PolicyId {
    PolicyId::from_u128(n * 1000 + index as u128)
}

/// Implementation `n` of `interface`, binding `operations` in order to
/// [`policy_id`]`(n, i)`.
#[must_use]
pub fn implementation(n: u128, interface: &str, operations: &[&str]) -> ServiceImplementation {
    ServiceImplementation::new(
        ImplementationId::from_u128(n),
        format!("impl-{n}"),
        InterfaceId::from(interface),
        operations
            .iter()
            .enumerate()
            .map(|(i, op)| OperationBinding::new(*op, policy_id(n, i)))
            .collect(),
    )
}

/// Persisted form of [`implementation`].
#[must_use]
pub fn persisted(n: u128, interface: &str, operations: &[&str]) -> PersistedImplementation {
    PersistedImplementation {
        id: ImplementationId::from_u128(n),
        name: format!("impl-{n}"),
        interface_name: interface.to_string(),
        operations: operations
            .iter()
            .enumerate()
            .map(|(i, op)| PersistedOperation {
                name: (*op).to_string(),
                policy_id: policy_id(n, i),
            })
            .collect(),
    }
}

/// Dispatcher over [`echo_registry`] with no implementations, and its executor.
#[must_use]
pub fn echo_dispatcher() -> (Arc<Dispatcher>, Arc<ScriptedExecutor>) {
    let implementations = Arc::new(ImplementationRegistry::new(Arc::new(echo_registry()), false));
    let executor = Arc::new(ScriptedExecutor::new());
    let dispatcher = Arc::new(Dispatcher::new(implementations, executor.clone()));
    (dispatcher, executor)
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

type Script = Arc<dyn Fn(&mut dyn ExecutionContext) -> CompletionStatus + Send + Sync>;

/// Policy executor whose policies are closures over the execution context.
///
/// Unscripted policy ids are reported as not found. Every handed-out context
/// is counted so tests can check that all of them came back.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<PolicyId, Script>>,
    run_delay: Mutex<Option<Duration>>,
    fail_acquire: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
    runs: AtomicUsize,
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script<F>(&self, policy_id: PolicyId, script: F)
    where
        F: Fn(&mut dyn ExecutionContext) -> CompletionStatus + Send + Sync + 'static,
    {
        self.scripts.lock().insert(policy_id, Arc::new(script));
    }

    /// Copies variable `from` to variable `to` and succeeds.
    pub fn echo(&self, policy_id: PolicyId, from: &str, to: &str) {
        let (from, to) = (from.to_string(), to.to_string());
        self.script(policy_id, move |ctx| {
            let value = ctx.get_variables(&[from.as_str()]).remove(&from);
            if let Some(value) = value {
                ctx.set_variable(&to, value);
            }
            CompletionStatus::Success
        });
    }

    /// Completes with `status` without touching the context.
    pub fn fail(&self, policy_id: PolicyId, status: CompletionStatus) {
        self.script(policy_id, move |_| status);
    }

    /// Every run sleeps this long before its script executes.
    pub fn set_run_delay(&self, delay: Duration) {
        *self.run_delay.lock() = Some(delay);
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn acquired_contexts(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn released_contexts(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn outstanding_contexts(&self) -> usize {
        self.acquired_contexts() - self.released_contexts()
    }

    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyExecutor for ScriptedExecutor {
    fn acquire_context(&self) -> anyhow::Result<Box<dyn ExecutionContext>> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            anyhow::bail!("no execution context available");
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VariableScope::new()))
    }

    async fn run(
        &self,
        policy_id: PolicyId,
        ctx: &mut dyn ExecutionContext,
    ) -> Result<CompletionStatus, RunError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().get(&policy_id).cloned();
        let Some(script) = script else {
            return Err(RunError::PolicyNotFound(policy_id));
        };
        let delay = *self.run_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(script(ctx))
    }

    fn release_context(&self, _ctx: Box<dyn ExecutionContext>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Implementation store backed by a vector.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PersistedImplementation>>,
    load_delay: Mutex<Option<Duration>>,
    fail: AtomicBool,
    loads: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(records: Vec<PersistedImplementation>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    pub fn set_records(&self, records: Vec<PersistedImplementation>) {
        *self.records.lock() = records;
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        *self.load_delay.lock() = Some(delay);
    }

    /// Number of load attempts, failed ones included.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImplementationStore for MemoryStore {
    async fn load_all_implementations(&self) -> anyhow::Result<Vec<PersistedImplementation>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.load_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("implementation store unavailable");
        }
        Ok(self.records.lock().clone())
    }
}
