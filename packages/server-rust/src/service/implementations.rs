//! Implementation registry: the set of service implementations per interface.
//!
//! The whole set lives in an immutable [`ImplementationSnapshot`] behind an
//! `ArcSwap`. Readers take the current snapshot without locking and keep using
//! it for as long as they hold the `Arc`; writers build a new snapshot and
//! publish it with a single store, so a reader never observes a half-applied
//! change. Writers serialise on a mutex that is only held while the new
//! snapshot is assembled, never across policy execution.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use polback_core::{ImplementationId, InterfaceId, ServiceImplementation, ServiceTemplate};
use tracing::{debug, info};

use super::operation::{PolicyBackedError, UnsupportedReason};
use super::templates::TemplateRegistry;

// ---------------------------------------------------------------------------
// ImplementationSnapshot
// ---------------------------------------------------------------------------

/// Immutable view of every registered implementation.
///
/// Every interface key has a registered template, and implementation ids are
/// unique per interface. Both hold by construction: snapshots are only built
/// through validated inserts.
#[derive(Debug, Clone, Default)]
pub struct ImplementationSnapshot {
    generation: u64,
    by_interface: HashMap<InterfaceId, Vec<Arc<ServiceImplementation>>>,
}

impl ImplementationSnapshot {
    /// Incremented on every published change.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn implementations(&self, interface_id: &InterfaceId) -> &[Arc<ServiceImplementation>] {
        self.by_interface
            .get(interface_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Picks the implementation a call should target.
    ///
    /// With a selector, the implementation with that id. Without one, the
    /// only implementation registered for the interface.
    ///
    /// # Errors
    ///
    /// - [`PolicyBackedError::ImplementationNotFound`] if the selector matches
    ///   nothing, or nothing is registered
    /// - [`PolicyBackedError::AmbiguousImplementation`] if no selector is given
    ///   and more than one implementation is registered
    pub fn resolve(
        &self,
        interface_id: &InterfaceId,
        selector: Option<ImplementationId>,
    ) -> Result<Arc<ServiceImplementation>, PolicyBackedError> {
        let candidates = self.implementations(interface_id);
        let not_found = || PolicyBackedError::ImplementationNotFound {
            interface_id: interface_id.clone(),
            selector,
        };

        match selector {
            Some(id) => candidates
                .iter()
                .find(|imp| imp.id == id)
                .cloned()
                .ok_or_else(not_found),
            None => match candidates {
                [] => Err(not_found()),
                [only] => Ok(Arc::clone(only)),
                many => Err(PolicyBackedError::AmbiguousImplementation {
                    interface_id: interface_id.clone(),
                    count: many.len(),
                }),
            },
        }
    }

    #[must_use]
    pub fn interface_count(&self) -> usize {
        self.by_interface.len()
    }

    #[must_use]
    pub fn implementation_count(&self) -> usize {
        self.by_interface.values().map(Vec::len).sum()
    }

    /// Iterates every implementation, grouped by interface in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceImplementation>> {
        self.by_interface.values().flatten()
    }

    fn contains(&self, interface_id: &InterfaceId, id: ImplementationId) -> bool {
        self.implementations(interface_id).iter().any(|imp| imp.id == id)
    }

    fn insert_unchecked(&mut self, implementation: ServiceImplementation) {
        self.by_interface
            .entry(implementation.interface_id.clone())
            .or_default()
            .push(Arc::new(implementation));
    }
}

/// Counters describing the current snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub generation: u64,
    pub interfaces: usize,
    pub implementations: usize,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks `implementation` against its interface template.
///
/// Every binding must name a declared operation, no operation may be bound
/// twice, and with `require_complete` every declared operation must be bound.
fn validate_bindings(
    template: &ServiceTemplate,
    implementation: &ServiceImplementation,
    require_complete: bool,
) -> Result<(), PolicyBackedError> {
    if let Some(op) = implementation.duplicate_binding() {
        return Err(PolicyBackedError::DuplicateBinding {
            implementation_id: implementation.id,
            operation: op.to_string(),
        });
    }

    if let Some(binding) = implementation
        .bindings
        .iter()
        .find(|b| !template.has_operation(&b.operation_name))
    {
        return Err(PolicyBackedError::OperationNotSupported {
            interface_id: implementation.interface_id.clone(),
            operation: binding.operation_name.clone(),
            reason: UnsupportedReason::NotDeclared,
        });
    }

    if require_complete {
        if let Some(op) = template
            .operations()
            .iter()
            .find(|op| implementation.binding(op.name()).is_none())
        {
            return Err(PolicyBackedError::OperationNotSupported {
                interface_id: implementation.interface_id.clone(),
                operation: op.name().to_string(),
                reason: UnsupportedReason::NotBound {
                    implementation_id: implementation.id,
                },
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// SnapshotBuilder
// ---------------------------------------------------------------------------

/// Accumulates a complete replacement snapshot, validating each insert.
///
/// Rejected inserts leave the builder unchanged, so callers can skip bad
/// entries and keep going.
pub struct SnapshotBuilder<'a> {
    templates: &'a TemplateRegistry,
    require_complete: bool,
    snapshot: ImplementationSnapshot,
}

impl SnapshotBuilder<'_> {
    /// Adds `implementation` if it is valid.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`ImplementationRegistry::register`].
    pub fn insert(&mut self, implementation: ServiceImplementation) -> Result<(), PolicyBackedError> {
        let template = self
            .templates
            .template(&implementation.interface_id)
            .ok_or_else(|| PolicyBackedError::TemplateNotFound {
                interface_id: implementation.interface_id.clone(),
            })?;
        validate_bindings(&template, &implementation, self.require_complete)?;
        if self
            .snapshot
            .contains(&implementation.interface_id, implementation.id)
        {
            return Err(PolicyBackedError::DuplicateImplementation {
                interface_id: implementation.interface_id.clone(),
                implementation_id: implementation.id,
            });
        }
        self.snapshot.insert_unchecked(implementation);
        Ok(())
    }

    /// Number of implementations accepted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.implementation_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// ImplementationRegistry
// ---------------------------------------------------------------------------

/// Registry of service implementations, validated against the template registry.
pub struct ImplementationRegistry {
    templates: Arc<TemplateRegistry>,
    snapshot: ArcSwap<ImplementationSnapshot>,
    write_lock: Mutex<()>,
    require_complete_bindings: bool,
}

impl ImplementationRegistry {
    #[must_use]
    pub fn new(templates: Arc<TemplateRegistry>, require_complete_bindings: bool) -> Self {
        Self {
            templates,
            snapshot: ArcSwap::from_pointee(ImplementationSnapshot::default()),
            write_lock: Mutex::new(()),
            require_complete_bindings,
        }
    }

    /// Current snapshot via lock-free `ArcSwap` load.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ImplementationSnapshot> {
        self.snapshot.load_full()
    }

    /// Adds one implementation. Nothing is added unless every check passes.
    ///
    /// # Errors
    ///
    /// - [`PolicyBackedError::TemplateNotFound`] if the interface has no template
    /// - [`PolicyBackedError::OperationNotSupported`] if a binding names an
    ///   undeclared operation (or, with complete bindings required, an
    ///   operation is left unbound)
    /// - [`PolicyBackedError::DuplicateBinding`] if an operation is bound twice
    /// - [`PolicyBackedError::DuplicateImplementation`] if the id is already
    ///   registered for the interface
    pub fn register(&self, implementation: ServiceImplementation) -> Result<(), PolicyBackedError> {
        let template = self
            .templates
            .template(&implementation.interface_id)
            .ok_or_else(|| PolicyBackedError::TemplateNotFound {
                interface_id: implementation.interface_id.clone(),
            })?;
        validate_bindings(&template, &implementation, self.require_complete_bindings)?;

        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();
        if current.contains(&implementation.interface_id, implementation.id) {
            return Err(PolicyBackedError::DuplicateImplementation {
                interface_id: implementation.interface_id.clone(),
                implementation_id: implementation.id,
            });
        }

        let mut next = ImplementationSnapshot::clone(&current);
        next.generation = current.generation + 1;
        info!(
            interface = %implementation.interface_id,
            implementation = %implementation.id,
            name = %implementation.display_name,
            generation = next.generation,
            "registered service implementation"
        );
        next.insert_unchecked(implementation);
        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    /// Removes one implementation.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyBackedError::ImplementationNotFound`] if it is not registered.
    pub fn unregister(
        &self,
        interface_id: &InterfaceId,
        id: ImplementationId,
    ) -> Result<(), PolicyBackedError> {
        let _guard = self.write_lock.lock();
        let current = self.snapshot.load();
        if !current.contains(interface_id, id) {
            return Err(PolicyBackedError::ImplementationNotFound {
                interface_id: interface_id.clone(),
                selector: Some(id),
            });
        }

        let mut next = ImplementationSnapshot::clone(&current);
        next.generation = current.generation + 1;
        if let Some(list) = next.by_interface.get_mut(interface_id) {
            list.retain(|imp| imp.id != id);
            if list.is_empty() {
                next.by_interface.remove(interface_id);
            }
        }
        self.snapshot.store(Arc::new(next));
        debug!(interface = %interface_id, implementation = %id, "unregistered service implementation");
        Ok(())
    }

    /// Starts an empty replacement snapshot for [`replace_all`](Self::replace_all).
    #[must_use]
    pub fn builder(&self) -> SnapshotBuilder<'_> {
        SnapshotBuilder {
            templates: &self.templates,
            require_complete: self.require_complete_bindings,
            snapshot: ImplementationSnapshot::default(),
        }
    }

    /// Atomically replaces every registered implementation with the contents
    /// of `builder`. Returns the generation of the published snapshot.
    pub fn replace_all(&self, builder: SnapshotBuilder<'_>) -> u64 {
        let mut next = builder.snapshot;
        let _guard = self.write_lock.lock();
        next.generation = self.snapshot.load().generation + 1;
        let generation = next.generation;
        self.snapshot.store(Arc::new(next));
        generation
    }

    /// See [`ImplementationSnapshot::resolve`].
    ///
    /// # Errors
    ///
    /// See [`ImplementationSnapshot::resolve`].
    pub fn resolve(
        &self,
        interface_id: &InterfaceId,
        selector: Option<ImplementationId>,
    ) -> Result<Arc<ServiceImplementation>, PolicyBackedError> {
        self.snapshot.load().resolve(interface_id, selector)
    }

    /// Implementations currently registered for `interface_id`.
    #[must_use]
    pub fn implementations(&self, interface_id: &InterfaceId) -> Vec<Arc<ServiceImplementation>> {
        self.snapshot.load().implementations(interface_id).to_vec()
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let snap = self.snapshot.load();
        RegistryStats {
            generation: snap.generation,
            interfaces: snap.interface_count(),
            implementations: snap.implementation_count(),
        }
    }

    #[must_use]
    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
