//! Shared collaborators and fixtures for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use polback_core::{
    ArgumentDescriptor, CompletionStatus, DataType, ExecutionContext, ImplementationId,
    OperationTemplate, PersistedImplementation, PersistedOperation, PolicyId, ResultDescriptor,
    ValueClass, VariableScope,
};
use polback_server::reload::EventBus;
use polback_server::service::{PolbackConfig, RunError};
use polback_server::{ImplementationStore, PolicyBackedModule, PolicyExecutor};

/// - `greet(name: String, times: Integer) -> greeting: String`
/// - `ping()`
/// - `whoami() -> (implementation: String, calls: Integer)`
pub const GREETER: &str = "test.Greeter";

#[must_use]
pub fn greeter_operations() -> Vec<OperationTemplate> {
    vec![
        OperationTemplate::new(
            "greet",
            vec![
                ArgumentDescriptor::new("name", 1, DataType::String)
                    .with_param_class(ValueClass::String),
                ArgumentDescriptor::new("times", 2, DataType::Integer),
            ],
            vec![ResultDescriptor::new("greeting", DataType::String)],
        )
        .unwrap(),
        OperationTemplate::new("ping", vec![], vec![]).unwrap(),
        OperationTemplate::new(
            "whoami",
            vec![],
            vec![
                ResultDescriptor::new("implementation", DataType::String),
                ResultDescriptor::new("calls", DataType::Integer),
            ],
        )
        .unwrap(),
    ]
}

#[must_use]
pub fn record(id: u128, interface: &str, bindings: &[(&str, u128)]) -> PersistedImplementation {
    PersistedImplementation {
        id: ImplementationId::from_u128(id),
        name: format!("greeter-{id}"),
        interface_name: interface.to_string(),
        operations: bindings
            .iter()
            .map(|(name, policy)| PersistedOperation {
                name: (*name).to_string(),
                policy_id: PolicyId::from_u128(*policy),
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

type Policy = Arc<dyn Fn(&mut dyn ExecutionContext) -> CompletionStatus + Send + Sync>;

#[derive(Default)]
pub struct Executor {
    policies: Mutex<HashMap<PolicyId, Policy>>,
    delay: Mutex<Option<Duration>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl Executor {
    pub fn policy<F>(&self, id: u128, policy: F)
    where
        F: Fn(&mut dyn ExecutionContext) -> CompletionStatus + Send + Sync + 'static,
    {
        self.policies.lock().insert(PolicyId::from_u128(id), Arc::new(policy));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn outstanding(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyExecutor for Executor {
    fn acquire_context(&self) -> anyhow::Result<Box<dyn ExecutionContext>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(VariableScope::new()))
    }

    async fn run(
        &self,
        policy_id: PolicyId,
        ctx: &mut dyn ExecutionContext,
    ) -> Result<CompletionStatus, RunError> {
        let policy = self.policies.lock().get(&policy_id).cloned();
        let Some(policy) = policy else {
            return Err(RunError::PolicyNotFound(policy_id));
        };
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(policy(ctx))
    }

    fn release_context(&self, _ctx: Box<dyn ExecutionContext>) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Store {
    records: Mutex<Vec<PersistedImplementation>>,
    fail: AtomicBool,
}

impl Store {
    pub fn new(records: Vec<PersistedImplementation>) -> Self {
        Self {
            records: Mutex::new(records),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set(&self, records: Vec<PersistedImplementation>) {
        *self.records.lock() = records;
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImplementationStore for Store {
    async fn load_all_implementations(&self) -> anyhow::Result<Vec<PersistedImplementation>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("store offline");
        }
        Ok(self.records.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub module: PolicyBackedModule,
    pub executor: Arc<Executor>,
    pub store: Arc<Store>,
    pub bus: EventBus,
}

/// Module with [`GREETER`] registered, not started.
pub fn harness(records: Vec<PersistedImplementation>) -> Harness {
    harness_with(PolbackConfig::default(), records)
}

pub fn harness_with(config: PolbackConfig, records: Vec<PersistedImplementation>) -> Harness {
    let executor = Arc::new(Executor::default());
    let store = Arc::new(Store::new(records));
    let bus = EventBus::new(config.event_channel_capacity);
    let module = PolicyBackedModule::new(config, executor.clone(), store.clone(), &bus).unwrap();
    module.register_template(GREETER, greeter_operations()).unwrap();
    Harness {
        module,
        executor,
        store,
        bus,
    }
}
