//! `polback` server: registry and dispatch of policy-backed services.

pub mod logging;
pub mod module;
pub mod reload;
pub mod service;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use module::PolicyBackedModule;
pub use traits::{ChangeNotifier, ImplementationStore, PolicyExecutor};
