//! Registries and the dispatch pipeline.
//!
//! A call flows through:
//!
//! 1. **Middleware** (`middleware`): Tower layers (load shedding, metrics)
//! 2. **Dispatch** (`dispatcher`): template and implementation resolution
//!    against the registries (`templates`, `implementations`)
//! 3. **Marshalling** (`marshal`): positional arguments to named variables
//!    and back
//! 4. **Execution**: the backing policy runs in a leased context (`lease`)

pub mod config;
pub mod dispatcher;
pub mod implementations;
pub mod lease;
pub mod marshal;
pub mod middleware;
pub mod operation;
pub mod proxy;
pub mod templates;
pub mod worker;

// Re-export key types for convenient access.
pub use config::{LoggingConfig, PolbackConfig};
pub use dispatcher::Dispatcher;
pub use implementations::{ImplementationRegistry, ImplementationSnapshot, RegistryStats};
pub use operation::{Invocation, Outcome, PolicyBackedError, RunError, UnsupportedReason};
pub use proxy::{InvocationService, OperationProxy, ServiceProxy};
pub use templates::TemplateRegistry;
pub use worker::{BackgroundRunnable, BackgroundWorker};
