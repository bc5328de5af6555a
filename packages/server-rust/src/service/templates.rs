use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use polback_core::{InterfaceId, OperationTemplate, ServiceTemplate};
use tracing::info;

use super::operation::PolicyBackedError;

// ---------------------------------------------------------------------------
// TemplateRegistry
// ---------------------------------------------------------------------------

/// Registry of interface shapes, keyed by interface id.
///
/// Each id is registered exactly once, normally at startup, and the stored
/// template is never modified afterwards. Lookups are lock-free for readers
/// of different shards and safe from any number of threads.
pub struct TemplateRegistry {
    templates: DashMap<InterfaceId, Arc<ServiceTemplate>>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Registers the operations of `interface_id`.
    ///
    /// # Errors
    ///
    /// - [`PolicyBackedError::InvalidTemplate`] if the operations do not form a valid template
    /// - [`PolicyBackedError::TemplateAlreadyRegistered`] if the id is taken; the
    ///   existing template is left untouched
    pub fn register(
        &self,
        interface_id: impl Into<InterfaceId>,
        operations: Vec<OperationTemplate>,
    ) -> Result<Arc<ServiceTemplate>, PolicyBackedError> {
        let template = ServiceTemplate::new(interface_id.into(), operations)?;
        self.register_template(template)
    }

    /// Registers an already-built template.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyBackedError::TemplateAlreadyRegistered`] if the id is taken.
    pub fn register_template(
        &self,
        template: ServiceTemplate,
    ) -> Result<Arc<ServiceTemplate>, PolicyBackedError> {
        match self.templates.entry(template.interface_id().clone()) {
            Entry::Occupied(entry) => Err(PolicyBackedError::TemplateAlreadyRegistered {
                interface_id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let template = Arc::new(template);
                info!(
                    interface = %template.interface_id(),
                    operations = template.operations().len(),
                    "registered service template"
                );
                entry.insert(Arc::clone(&template));
                Ok(template)
            }
        }
    }

    /// Registers the templates every deployment ships with.
    ///
    /// # Errors
    ///
    /// Fails if one of them is already registered.
    pub fn register_builtin_templates(&self) -> Result<(), PolicyBackedError> {
        self.register_template(builtin::background_task()?)?;
        Ok(())
    }

    /// Snapshot of every registered interface id.
    #[must_use]
    pub fn template_ids(&self) -> BTreeSet<InterfaceId> {
        self.templates.iter().map(|e| e.key().clone()).collect()
    }

    #[must_use]
    pub fn template(&self, interface_id: &InterfaceId) -> Option<Arc<ServiceTemplate>> {
        self.templates.get(interface_id).map(|e| Arc::clone(e.value()))
    }

    /// Operations declared by `interface_id`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyBackedError::TemplateNotFound`] for an unknown id.
    pub fn operations(
        &self,
        interface_id: &InterfaceId,
    ) -> Result<Vec<OperationTemplate>, PolicyBackedError> {
        self.template(interface_id)
            .map(|t| t.operations().to_vec())
            .ok_or_else(|| PolicyBackedError::TemplateNotFound {
                interface_id: interface_id.clone(),
            })
    }

    #[must_use]
    pub fn contains(&self, interface_id: &InterfaceId) -> bool {
        self.templates.contains_key(interface_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Built-in templates
// ---------------------------------------------------------------------------

/// Interfaces registered by [`TemplateRegistry::register_builtin_templates`].
pub mod builtin {
    use polback_core::{
        ArgumentDescriptor, DataType, InterfaceId, OperationTemplate, ServiceTemplate,
        TemplateError, ValueClass,
    };

    /// Scheduled background work implemented by a policy.
    pub const BACKGROUND_TASK: &str = "polback.BackgroundTask";

    /// `run(taskName: String?)` with no results.
    ///
    /// # Errors
    ///
    /// Never fails in practice; construction goes through the validating constructors.
    pub fn background_task() -> Result<ServiceTemplate, TemplateError> {
        let run = OperationTemplate::new(
            "run",
            vec![ArgumentDescriptor::new("taskName", 1, DataType::String)
                .with_param_class(ValueClass::String)
                .nullable()],
            vec![],
        )?;
        ServiceTemplate::new(InterfaceId::from(BACKGROUND_TASK), vec![run])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
