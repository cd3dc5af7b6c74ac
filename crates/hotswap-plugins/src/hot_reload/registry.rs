//! Descriptor registry
//!
//! Ordered record of every live synthesized type, owned by the orchestrator.

use super::instance::{ActivationGuardViolation, InstanceError, InstanceSlot, PluginInstance};
use super::substitution::SubstitutionTable;
use super::synthesizer::SynthesizedType;
use hotswap_kernel::{ActivationMeta, Generation, ModuleSource, Stage, SynthesizedTypeId};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry-assigned descriptor identity, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DescriptorId(u64);

impl DescriptorId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    TopLevel,
    Dependent,
}

#[derive(Debug)]
enum DescriptorRole {
    TopLevel {
        activation: ActivationMeta,
        slot: InstanceSlot,
    },
    Dependent,
}

/// A synthesized type waiting to be registered
#[derive(Debug)]
pub struct DescriptorDraft {
    synthesized: SynthesizedType,
    activation: Option<ActivationMeta>,
}

impl DescriptorDraft {
    pub fn top_level(synthesized: SynthesizedType, activation: ActivationMeta) -> Self {
        Self {
            synthesized,
            activation: Some(activation),
        }
    }

    pub fn dependent(synthesized: SynthesizedType) -> Self {
        Self {
            synthesized,
            activation: None,
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.activation.is_some()
    }
}

/// One synthesized type known to the engine
#[derive(Debug)]
pub struct TypeDescriptor {
    id: DescriptorId,
    source: Arc<ModuleSource>,
    synthesized: SynthesizedType,
    generation: Generation,
    role: DescriptorRole,
    substitutions: Arc<SubstitutionTable>,
}

impl TypeDescriptor {
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    pub fn source_name(&self) -> &str {
        &self.source.name
    }

    pub fn synthesized(&self) -> &SynthesizedType {
        &self.synthesized
    }

    pub fn type_id(&self) -> &SynthesizedTypeId {
        self.synthesized.id()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn role(&self) -> Role {
        role_of(&self.role)
    }

    pub fn is_top_level(&self) -> bool {
        self.role() == Role::TopLevel
    }

    pub fn activation(&self) -> Option<&ActivationMeta> {
        match &self.role {
            DescriptorRole::TopLevel { activation, .. } => Some(activation),
            DescriptorRole::Dependent => None,
        }
    }

    /// Table of the module and generation this descriptor came from
    pub fn substitutions(&self) -> &Arc<SubstitutionTable> {
        &self.substitutions
    }

    pub fn is_alive(&self) -> bool {
        self.slot().is_some_and(InstanceSlot::is_alive)
    }

    pub fn fired(&self) -> bool {
        self.slot().is_some_and(InstanceSlot::fired)
    }

    pub fn instance(&self) -> Option<&PluginInstance> {
        self.slot().and_then(InstanceSlot::instance)
    }

    pub fn instance_mut(&mut self) -> Option<&mut PluginInstance> {
        match &mut self.role {
            DescriptorRole::TopLevel { slot, .. } => slot.instance_mut(),
            DescriptorRole::Dependent => None,
        }
    }

    fn slot(&self) -> Option<&InstanceSlot> {
        match &self.role {
            DescriptorRole::TopLevel { slot, .. } => Some(slot),
            DescriptorRole::Dependent => None,
        }
    }

    /// Create the single live instance of this top-level type
    pub fn create_instance(&mut self, stage: &Stage) -> Result<&PluginInstance, InstanceError> {
        match &mut self.role {
            DescriptorRole::TopLevel { slot, .. } => {
                slot.create(&self.synthesized, &self.substitutions, stage)
            }
            DescriptorRole::Dependent => {
                Err(InstanceError::NotTopLevel(self.synthesized.id().to_string()))
            }
        }
    }

    /// Destroy the live instance of this top-level type
    pub fn delete_instance(&mut self) -> Result<(), ActivationGuardViolation> {
        match &mut self.role {
            DescriptorRole::TopLevel { slot, .. } => slot.delete(self.synthesized.id()),
            DescriptorRole::Dependent => Err(ActivationGuardViolation::NotAlive(
                self.synthesized.id().to_string(),
            )),
        }
    }
}

/// Snapshot counts over the registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub top_level: usize,
    pub dependent: usize,
    pub alive: usize,
    pub sources: usize,
}

/// Descriptors in insertion order
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    descriptors: Vec<TypeDescriptor>,
    next_id: u64,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one module's descriptors, sharing `substitutions`
    pub fn register_batch(
        &mut self,
        source: &Arc<ModuleSource>,
        generation: Generation,
        drafts: Vec<DescriptorDraft>,
        substitutions: Arc<SubstitutionTable>,
    ) -> Vec<DescriptorId> {
        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            self.next_id += 1;
            let id = DescriptorId(self.next_id);
            let role = match draft.activation {
                Some(activation) => DescriptorRole::TopLevel {
                    activation,
                    slot: InstanceSlot::new(),
                },
                None => DescriptorRole::Dependent,
            };
            debug!(
                "Registered {} as {} ({:?})",
                draft.synthesized.id(),
                id,
                role_of(&role)
            );
            self.descriptors.push(TypeDescriptor {
                id,
                source: source.clone(),
                synthesized: draft.synthesized,
                generation,
                role,
                substitutions: substitutions.clone(),
            });
            ids.push(id);
        }
        ids
    }

    /// Destroy every live instance created from `source`
    ///
    /// Returns the identities of the destroyed instances' types.
    pub fn teardown_source(&mut self, source: &str) -> Vec<SynthesizedTypeId> {
        let mut destroyed = Vec::new();
        for descriptor in self
            .descriptors
            .iter_mut()
            .filter(|d| d.source_name() == source && d.is_alive())
        {
            match descriptor.delete_instance() {
                Ok(()) => destroyed.push(descriptor.type_id().clone()),
                Err(e) => warn!("Teardown of {} skipped: {}", descriptor.type_id(), e),
            }
        }
        destroyed
    }

    /// Drop all descriptors of `source`, returns how many were removed
    ///
    /// Live instances must be torn down first; any left are released without
    /// their teardown hook.
    pub fn discard_source(&mut self, source: &str) -> usize {
        let before = self.descriptors.len();
        self.descriptors.retain(|d| {
            if d.source_name() != source {
                return true;
            }
            if d.is_alive() {
                warn!("Discarding {} with a live instance", d.type_id());
            }
            false
        });
        before - self.descriptors.len()
    }

    /// Destroy every live instance, in registration order
    pub fn teardown_all(&mut self) -> Vec<SynthesizedTypeId> {
        let sources: Vec<String> = self.source_names();
        sources
            .iter()
            .flat_map(|source| self.teardown_source(source))
            .collect()
    }

    /// Drop every descriptor; ids keep counting up
    pub fn clear(&mut self) -> usize {
        let discarded = self.descriptors.len();
        self.descriptors.clear();
        discarded
    }

    pub fn get(&self, id: DescriptorId) -> Option<&TypeDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn get_mut(&mut self, id: DescriptorId) -> Option<&mut TypeDescriptor> {
        self.descriptors.iter_mut().find(|d| d.id == id)
    }

    pub fn find(&self, type_id: &SynthesizedTypeId) -> Option<&TypeDescriptor> {
        self.descriptors.iter().find(|d| d.type_id() == type_id)
    }

    /// Latest descriptor of `type_name` declared by `source`
    pub fn find_by_name(&self, source: &str, type_name: &str) -> Option<&TypeDescriptor> {
        self.descriptors
            .iter()
            .rev()
            .find(|d| d.source_name() == source && d.type_id().original().name == type_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter()
    }

    pub fn by_source<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a TypeDescriptor> {
        self.descriptors
            .iter()
            .filter(move |d| d.source_name() == source)
    }

    pub fn top_level(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.descriptors.iter().filter(|d| d.is_top_level())
    }

    pub(crate) fn top_level_mut(&mut self) -> impl Iterator<Item = &mut TypeDescriptor> {
        self.descriptors.iter_mut().filter(|d| d.is_top_level())
    }

    /// Source names in first-registration order
    pub fn source_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.descriptors
            .iter()
            .filter(|d| seen.insert(d.source_name()))
            .map(|d| d.source_name().to_string())
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_alive()).count()
    }

    pub fn alive_count_for(&self, source: &str) -> usize {
        self.by_source(source).filter(|d| d.is_alive()).count()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let top_level = self.top_level().count();
        RegistryStats {
            total: self.descriptors.len(),
            top_level,
            dependent: self.descriptors.len() - top_level,
            alive: self.alive_count(),
            sources: self.source_names().len(),
        }
    }
}

fn role_of(role: &DescriptorRole) -> Role {
    match role {
        DescriptorRole::TopLevel { .. } => Role::TopLevel,
        DescriptorRole::Dependent => Role::Dependent,
    }
}
