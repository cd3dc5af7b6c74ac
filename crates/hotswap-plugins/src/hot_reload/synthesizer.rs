//! Type synthesis
//!
//! Every reloadable type gets a fresh identity per generation. Identities are
//! collected in a per-generation [`SynthesisScope`]; a scope is never reused,
//! so names from different generations can not collide.

use super::module::TypeDefinition;
use hotswap_kernel::{
    ComponentFactory, Generation, OriginalTypeId, ReloadableComponent, SynthesizedTypeId,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("Type {0} is sealed and can not be derived")]
    Sealed(String),

    #[error("No implementation backs type {0}")]
    MissingImplementation(String),

    #[error("Type {0} lacks the reloadable capability")]
    NotReloadable(String),

    #[error("{name} was already synthesized in generation {generation}")]
    AlreadySynthesized { name: String, generation: Generation },

    #[error("Synthesis scope is open for generation {open}, not {requested}")]
    StaleGeneration {
        open: Generation,
        requested: Generation,
    },
}

/// A generation-unique stand-in for an original type
#[derive(Clone)]
pub struct SynthesizedType {
    id: SynthesizedTypeId,
    factory: Arc<dyn ComponentFactory>,
}

impl SynthesizedType {
    pub fn id(&self) -> &SynthesizedTypeId {
        &self.id
    }

    pub fn original(&self) -> &OriginalTypeId {
        self.id.original()
    }

    pub fn generation(&self) -> Generation {
        self.id.generation()
    }

    pub fn factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.factory
    }

    /// Fresh, not yet awoken object of this type
    pub fn instantiate(&self) -> Box<dyn ReloadableComponent> {
        self.factory.create()
    }
}

impl fmt::Debug for SynthesizedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizedType")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Container for one generation's synthesized types
#[derive(Debug)]
pub struct SynthesisScope {
    generation: Generation,
    name: String,
    types: HashMap<String, SynthesizedTypeId>,
}

impl SynthesisScope {
    fn new(generation: Generation) -> Self {
        Self {
            name: format!("HotswapScope_{}", generation),
            generation,
            types: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.types.contains_key(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Derives generation-unique types from module definitions
#[derive(Debug)]
pub struct TypeSynthesizer {
    scope: SynthesisScope,
}

impl Default for TypeSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeSynthesizer {
    pub fn new() -> Self {
        Self {
            scope: SynthesisScope::new(Generation::INITIAL),
        }
    }

    /// Replace the open scope with an empty one for `generation`
    pub fn begin_generation(&mut self, generation: Generation) {
        debug!(
            "Retiring {} with {} type(s)",
            self.scope.name,
            self.scope.len()
        );
        self.scope = SynthesisScope::new(generation);
    }

    pub fn scope(&self) -> &SynthesisScope {
        &self.scope
    }

    /// Synthesize the stand-in for `definition` declared by `module`
    pub fn synthesize(
        &mut self,
        module: &str,
        definition: &TypeDefinition,
        generation: Generation,
    ) -> Result<SynthesizedType, SynthesisError> {
        if generation != self.scope.generation {
            return Err(SynthesisError::StaleGeneration {
                open: self.scope.generation,
                requested: generation,
            });
        }

        let original = OriginalTypeId::new(module, &definition.name);
        if !definition.is_reloadable() {
            return Err(SynthesisError::NotReloadable(original.to_string()));
        }
        if definition.sealed {
            return Err(SynthesisError::Sealed(original.to_string()));
        }
        let factory = definition
            .factory()
            .cloned()
            .ok_or_else(|| SynthesisError::MissingImplementation(original.to_string()))?;

        let id = SynthesizedTypeId::derive(&original, generation);
        let key = id.qualified_name();
        if self.scope.contains(&key) {
            return Err(SynthesisError::AlreadySynthesized {
                name: key,
                generation,
            });
        }

        debug!("new type name for {} is {}", original, id.name());
        self.scope.types.insert(key, id.clone());
        Ok(SynthesizedType { id, factory })
    }
}
