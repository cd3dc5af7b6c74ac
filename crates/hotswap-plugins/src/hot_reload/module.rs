//! Loaded modules and their type definitions
//!
//! A module declares its exported types explicitly: which ones are reloadable,
//! which ones are top-level (with their activation marker) and which concrete
//! factory backs each of them.

use hotswap_kernel::{ActivationMeta, ComponentFactory, ReloadableComponent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Base capability a declared type claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Implements [`ReloadableComponent`]
    #[default]
    Reloadable,
    /// A host component that is not reloadable
    Plain,
}

/// One type exported by a module
#[derive(Clone)]
pub struct TypeDefinition {
    pub name: String,
    pub capability: Capability,
    /// Present for top-level types only
    pub activation: Option<ActivationMeta>,
    /// Sealed types can not be derived
    pub sealed: bool,
    factory: Option<Arc<dyn ComponentFactory>>,
}

impl TypeDefinition {
    /// A reloadable type instantiated by the activation gate
    pub fn top_level<F>(name: &str, activation: ActivationMeta, factory: F) -> Self
    where
        F: ComponentFactory + 'static,
    {
        Self::declared(name, Some(Arc::new(factory))).with_activation(Some(activation))
    }

    /// A reloadable type only ever constructed by other components
    pub fn dependent<F>(name: &str, factory: F) -> Self
    where
        F: ComponentFactory + 'static,
    {
        Self::declared(name, Some(Arc::new(factory)))
    }

    /// A non-reloadable export
    pub fn plain(name: &str) -> Self {
        Self::declared(name, None).with_capability(Capability::Plain)
    }

    /// A reloadable type with an optional backing factory
    pub fn declared(name: &str, factory: Option<Arc<dyn ComponentFactory>>) -> Self {
        Self {
            name: name.to_string(),
            capability: Capability::Reloadable,
            activation: None,
            sealed: false,
            factory,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_activation(mut self, activation: Option<ActivationMeta>) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_sealed(mut self, sealed: bool) -> Self {
        self.sealed = sealed;
        self
    }

    pub fn is_reloadable(&self) -> bool {
        self.capability == Capability::Reloadable
    }

    pub fn is_top_level(&self) -> bool {
        self.activation.is_some()
    }

    pub fn factory(&self) -> Option<&Arc<dyn ComponentFactory>> {
        self.factory.as_ref()
    }

    pub(crate) fn map_factory<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Arc<dyn ComponentFactory>) -> Arc<dyn ComponentFactory>,
    {
        self.factory = self.factory.map(wrap);
        self
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("name", &self.name)
            .field("capability", &self.capability)
            .field("activation", &self.activation)
            .field("sealed", &self.sealed)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Factory building `T::default()`
pub fn factory_for<T>() -> impl ComponentFactory
where
    T: ReloadableComponent + Default + 'static,
{
    || -> Box<dyn ReloadableComponent> { Box::new(T::default()) }
}

/// Collects the types a module exports, in declaration order
#[derive(Debug, Default)]
pub struct ModuleRegistrar {
    definitions: Vec<TypeDefinition>,
}

impl ModuleRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, definition: TypeDefinition) -> &mut Self {
        self.definitions.push(definition);
        self
    }

    pub fn top_level<F>(&mut self, name: &str, activation: ActivationMeta, factory: F) -> &mut Self
    where
        F: ComponentFactory + 'static,
    {
        self.define(TypeDefinition::top_level(name, activation, factory))
    }

    pub fn dependent<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: ComponentFactory + 'static,
    {
        self.define(TypeDefinition::dependent(name, factory))
    }

    pub fn plain(&mut self, name: &str) -> &mut Self {
        self.define(TypeDefinition::plain(name))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn into_definitions(self) -> Vec<TypeDefinition> {
        self.definitions
    }
}

/// A module after loading and linking
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Name the module declares for itself
    name: String,
    /// SHA-256 of the loaded bytes
    digest: String,
    definitions: Vec<TypeDefinition>,
}

impl LoadedModule {
    pub fn new(name: &str, bytes: &[u8], definitions: Vec<TypeDefinition>) -> Self {
        Self {
            name: name.to_string(),
            digest: Self::calculate_hash(bytes),
            definitions,
        }
    }

    fn calculate_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Definitions in enumeration order
    pub fn definitions(&self) -> &[TypeDefinition] {
        &self.definitions
    }
}
