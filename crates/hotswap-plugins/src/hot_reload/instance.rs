//! Live component instances
//!
//! Each top-level descriptor owns one [`InstanceSlot`]. The slot enforces the
//! at-most-one-alive rule and remembers whether it ever produced an instance,
//! which the activation gate consults for `once` types.

use super::substitution::SubstitutionTable;
use super::synthesizer::SynthesizedType;
use hotswap_kernel::{
    ComponentError, ComponentFactory, ComponentResult, ComponentScope, OriginalTypeId,
    ReloadableComponent, Stage, SynthesizedTypeId, TypeRef,
};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// A create or delete request that does not match the slot's state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationGuardViolation {
    #[error("Object {0} already alive")]
    AlreadyAlive(String),

    #[error("Object {0} is not alive")]
    NotAlive(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error(transparent)]
    Guard(#[from] ActivationGuardViolation),

    #[error("Awake of {type_id} failed: {source}")]
    Awake {
        type_id: String,
        #[source]
        source: ComponentError,
    },

    #[error("{0} is not a top-level type")]
    NotTopLevel(String),
}

/// Construction scope handed to `awake`
///
/// Resolves type names through the module's substitution table, so dependents
/// come from the same generation as the object being built.
pub struct ComponentContext<'a> {
    identity: &'a SynthesizedTypeId,
    substitutions: &'a SubstitutionTable,
    stage: &'a Stage,
}

impl<'a> ComponentContext<'a> {
    pub fn new(
        identity: &'a SynthesizedTypeId,
        substitutions: &'a SubstitutionTable,
        stage: &'a Stage,
    ) -> Self {
        Self {
            identity,
            substitutions,
            stage,
        }
    }

    fn original_of(&self, type_name: &str) -> OriginalTypeId {
        OriginalTypeId::new(&self.identity.original().module, type_name)
    }
}

impl ComponentScope for ComponentContext<'_> {
    fn identity(&self) -> &SynthesizedTypeId {
        self.identity
    }

    fn stage(&self) -> &Stage {
        self.stage
    }

    fn resolve(&self, type_name: &str) -> TypeRef {
        self.substitutions.resolve(&self.original_of(type_name))
    }

    fn construct(&self, type_name: &str) -> ComponentResult<Box<dyn ReloadableComponent>> {
        let original = self.original_of(type_name);
        let ty = self
            .substitutions
            .lookup(&original)
            .ok_or_else(|| ComponentError::UnresolvedType(original.to_string()))?;

        debug!("{} constructs {}", self.identity.name(), ty.id().name());
        let mut component = ty.instantiate();
        let child = ComponentContext::new(ty.id(), self.substitutions, self.stage);
        component.awake(&child)?;
        Ok(component)
    }
}

/// A live top-level object
pub struct PluginInstance {
    // dropped before the factory keeping its code loaded
    component: Box<dyn ReloadableComponent>,
    instance_id: String,
    type_id: SynthesizedTypeId,
    created_at: Instant,
    _factory: Arc<dyn ComponentFactory>,
}

impl PluginInstance {
    fn new(component: Box<dyn ReloadableComponent>, ty: &SynthesizedType) -> Self {
        Self {
            component,
            instance_id: Uuid::now_v7().to_string(),
            type_id: ty.id().clone(),
            created_at: Instant::now(),
            _factory: ty.factory().clone(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn type_id(&self) -> &SynthesizedTypeId {
        &self.type_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn component(&self) -> &dyn ReloadableComponent {
        self.component.as_ref()
    }

    pub fn component_mut(&mut self) -> &mut dyn ReloadableComponent {
        self.component.as_mut()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.component.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("instance_id", &self.instance_id)
            .field("type_id", &self.type_id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Holder of at most one live instance
#[derive(Debug, Default)]
pub struct InstanceSlot {
    instance: Option<PluginInstance>,
    fired: bool,
}

impl InstanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.instance.is_some()
    }

    /// An instance was created through this slot at least once
    pub fn fired(&self) -> bool {
        self.fired
    }

    pub fn instance(&self) -> Option<&PluginInstance> {
        self.instance.as_ref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut PluginInstance> {
        self.instance.as_mut()
    }

    /// Build, awake and keep a new instance of `ty`
    ///
    /// If `awake` fails the object is dropped and the slot stays empty and
    /// un-fired.
    pub fn create(
        &mut self,
        ty: &SynthesizedType,
        substitutions: &SubstitutionTable,
        stage: &Stage,
    ) -> Result<&PluginInstance, InstanceError> {
        if self.instance.is_some() {
            debug!("CreateInstance: object {} already alive", ty.id().name());
            return Err(ActivationGuardViolation::AlreadyAlive(ty.id().to_string()).into());
        }

        debug!("CreateInstance: create object {}", ty.id().name());
        let mut component = ty.instantiate();
        let scope = ComponentContext::new(ty.id(), substitutions, stage);
        component
            .awake(&scope)
            .map_err(|source| InstanceError::Awake {
                type_id: ty.id().to_string(),
                source,
            })?;

        self.fired = true;
        Ok(self.instance.insert(PluginInstance::new(component, ty)))
    }

    /// Run `on_destroy` and release the live instance
    ///
    /// `fired` is kept, a deleted `once` type stays spent.
    pub fn delete(&mut self, type_id: &SynthesizedTypeId) -> Result<(), ActivationGuardViolation> {
        match self.instance.take() {
            Some(mut instance) => {
                debug!("DeleteInstance: {} being destroyed", type_id.name());
                instance.component.on_destroy();
                Ok(())
            }
            None => {
                debug!("DeleteInstance: object {} not alive", type_id.name());
                Err(ActivationGuardViolation::NotAlive(type_id.to_string()))
            }
        }
    }
}
