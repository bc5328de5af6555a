use async_trait::async_trait;
use polback_core::{CompletionStatus, ExecutionContext, PersistedImplementation, PolicyId};
use tokio::sync::broadcast;

use crate::reload::events::SystemEvent;
use crate::service::operation::RunError;

/// Runs backing policies.
///
/// Each call gets its own context: the dispatcher acquires one, binds the
/// arguments, runs the policy, reads the results back and always returns the
/// context through [`release_context`](PolicyExecutor::release_context),
/// whatever the outcome. Deadlines and cancellation, if any, belong to the
/// executor.
#[async_trait]
pub trait PolicyExecutor: Send + Sync {
    /// Hands out a fresh, empty, single-use context.
    fn acquire_context(&self) -> anyhow::Result<Box<dyn ExecutionContext>>;

    /// Runs `policy_id` against `ctx`. A policy that cannot be resolved is
    /// reported as [`RunError::PolicyNotFound`].
    async fn run(
        &self,
        policy_id: PolicyId,
        ctx: &mut dyn ExecutionContext,
    ) -> Result<CompletionStatus, RunError>;

    /// Takes back a context handed out by `acquire_context`.
    fn release_context(&self, ctx: Box<dyn ExecutionContext>);
}

/// Persistent store of configured implementations.
#[async_trait]
pub trait ImplementationStore: Send + Sync {
    /// Loads every persisted implementation, valid or not.
    async fn load_all_implementations(&self) -> anyhow::Result<Vec<PersistedImplementation>>;
}

/// Source of lifecycle and configuration-change signals.
pub trait ChangeNotifier: Send + Sync {
    /// Opens a new subscription. Only events sent after this call are received.
    fn subscribe(&self) -> broadcast::Receiver<SystemEvent>;
}
