//! Module linkers
//!
//! Turn loaded bytes into a [`LoadedModule`]: the module's self-declared name
//! and the ordered list of types it exports.

use super::loader::ModuleLoadError;
use super::module::{Capability, LoadedModule, ModuleRegistrar, TypeDefinition};
use hotswap_kernel::{
    ActivationMeta, ComponentFactory, Generation, ModuleSource, ReloadableComponent,
};
use libloading::{Library, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Turns module bytes into type definitions
pub trait ModuleLinker: Send + Sync {
    fn link(
        &self,
        source: &ModuleSource,
        bytes: Vec<u8>,
        generation: Generation,
    ) -> Result<LoadedModule, ModuleLoadError>;
}

// ============================================================================
// Manifest linker
// ============================================================================

/// Factories the host compiled in, keyed by implementation name
#[derive(Default, Clone)]
pub struct ComponentCatalog {
    factories: HashMap<String, Arc<dyn ComponentFactory>>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, key: &str, factory: F) -> &mut Self
    where
        F: ComponentFactory + 'static,
    {
        self.factories.insert(key.to_string(), Arc::new(factory));
        self
    }

    pub fn with<F>(mut self, key: &str, factory: F) -> Self
    where
        F: ComponentFactory + 'static,
    {
        self.register(key, factory);
        self
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ComponentFactory>> {
        self.factories.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ComponentCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.factories.keys().collect();
        keys.sort();
        f.debug_struct("ComponentCatalog").field("keys", &keys).finish()
    }
}

/// Declarative module description (TOML or JSON)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Self-declared module name, defaults to the source name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub types: Vec<ManifestType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestType {
    pub name: String,
    #[serde(default)]
    pub base: Capability,
    #[serde(default)]
    pub sealed: bool,
    /// Catalog key of the backing factory, defaults to `name`
    #[serde(default)]
    pub implementation: Option<String>,
    /// Marks the type top-level
    #[serde(default)]
    pub activation: Option<ActivationMeta>,
}

impl ModuleManifest {
    pub fn parse(bytes: &[u8]) -> Result<Self, ModuleLoadError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ModuleLoadError::InvalidManifest(e.to_string()))?;

        if text.trim_start().starts_with('{') {
            serde_json::from_str(text).map_err(|e| ModuleLoadError::InvalidManifest(e.to_string()))
        } else {
            toml::from_str(text).map_err(|e| ModuleLoadError::InvalidManifest(e.to_string()))
        }
    }
}

/// Links manifest modules against a [`ComponentCatalog`]
#[derive(Debug, Clone, Default)]
pub struct ManifestLinker {
    catalog: ComponentCatalog,
}

impl ManifestLinker {
    pub fn new(catalog: ComponentCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }
}

impl ModuleLinker for ManifestLinker {
    fn link(
        &self,
        source: &ModuleSource,
        bytes: Vec<u8>,
        generation: Generation,
    ) -> Result<LoadedModule, ModuleLoadError> {
        let manifest = ModuleManifest::parse(&bytes)?;
        let name = manifest.name.clone().unwrap_or_else(|| source.name.clone());
        debug!("from module {}, generation {}", name, generation);

        let definitions = manifest
            .types
            .into_iter()
            .map(|ty| {
                let factory = match ty.base {
                    Capability::Reloadable => {
                        let key = ty.implementation.as_deref().unwrap_or(&ty.name);
                        let factory = self.catalog.get(key);
                        if factory.is_none() {
                            warn!("No implementation `{}` in catalog for type {}", key, ty.name);
                        }
                        factory
                    }
                    Capability::Plain => None,
                };

                TypeDefinition::declared(&ty.name, factory)
                    .with_capability(ty.base)
                    .with_activation(ty.activation)
                    .with_sealed(ty.sealed)
            })
            .collect();

        Ok(LoadedModule::new(&name, &bytes, definitions))
    }
}

// ============================================================================
// Native linker
// ============================================================================

/// Loads compiled modules through `libloading`
///
/// The module must export the symbols written by [`declare_module!`](crate::declare_module)
/// and be built with the same compiler and `hotswap-plugins` version as the host.
#[derive(Debug, Clone)]
pub struct NativeLinker {
    api_version: u32,
    unsafe_mode: bool,
}

impl NativeLinker {
    pub const CURRENT_API_VERSION: u32 = 1;
    pub const API_VERSION_SYMBOL: &'static [u8] = b"_hotswap_api_version";
    pub const REGISTER_SYMBOL: &'static [u8] = b"_hotswap_register";

    pub fn new() -> Self {
        Self {
            api_version: Self::CURRENT_API_VERSION,
            unsafe_mode: false,
        }
    }

    /// Skip the API version check
    pub fn set_unsafe_mode(&mut self, enabled: bool) {
        self.unsafe_mode = enabled;
    }
}

impl Default for NativeLinker {
    fn default() -> Self {
        Self::new()
    }
}

/// A library copy kept open for as long as anything it created is alive
struct NativeLibrary {
    library: Library,
    path: PathBuf,
    // removed after the library is closed
    _workdir: TempDir,
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        debug!("Unloading module library {:?}", self.path);
    }
}

/// Factory pinning its library
struct LibraryBoundFactory {
    factory: Arc<dyn ComponentFactory>,
    _library: Arc<NativeLibrary>,
}

impl ComponentFactory for LibraryBoundFactory {
    fn create(&self) -> Box<dyn ReloadableComponent> {
        self.factory.create()
    }
}

impl ModuleLinker for NativeLinker {
    fn link(
        &self,
        source: &ModuleSource,
        bytes: Vec<u8>,
        generation: Generation,
    ) -> Result<LoadedModule, ModuleLoadError> {
        let stem = source
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.name.clone());
        let extension = source
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| std::env::consts::DLL_EXTENSION.to_string());

        // A fresh file per generation, the platform loader caches by path
        let workdir = tempfile::Builder::new().prefix("hotswap-native-").tempdir()?;
        let path = workdir
            .path()
            .join(format!("{}_g{}.{}", stem, generation, extension));
        fs::write(&path, &bytes)?;

        // Loading dynamic libraries is inherently unsafe
        let library = unsafe {
            Library::new(&path).map_err(|e| ModuleLoadError::LibraryLoad(e.to_string()))?
        };

        let api_version = unsafe {
            let version_fn: Result<Symbol<unsafe extern "C" fn() -> u32>, _> =
                library.get(Self::API_VERSION_SYMBOL);
            match version_fn {
                Ok(f) => f(),
                Err(_) => 1,
            }
        };

        if !self.unsafe_mode && api_version != self.api_version {
            return Err(ModuleLoadError::VersionMismatch {
                expected: self.api_version,
                actual: api_version,
            });
        }

        let register: fn(&mut ModuleRegistrar) = unsafe {
            *library
                .get::<fn(&mut ModuleRegistrar)>(Self::REGISTER_SYMBOL)
                .map_err(|e| ModuleLoadError::SymbolNotFound(format!("_hotswap_register: {}", e)))?
        };

        let mut registrar = ModuleRegistrar::new();
        register(&mut registrar);
        debug!(
            "Module {} registered {} type(s), generation {}",
            source.name,
            registrar.len(),
            generation
        );

        let pinned = Arc::new(NativeLibrary {
            library,
            path,
            _workdir: workdir,
        });
        let definitions = registrar
            .into_definitions()
            .into_iter()
            .map(|definition| {
                definition.map_factory(|factory| {
                    Arc::new(LibraryBoundFactory {
                        factory,
                        _library: pinned.clone(),
                    }) as Arc<dyn ComponentFactory>
                })
            })
            .collect();

        Ok(LoadedModule::new(&stem, &bytes, definitions))
    }
}

/// Export the entry points [`NativeLinker`] looks up
///
/// ```rust,ignore
/// fn register(registrar: &mut ModuleRegistrar) {
///     registrar.top_level("Ctrl", ActivationMeta::new(Startup::Flight), factory_for::<Ctrl>());
/// }
///
/// hotswap_plugins::declare_module!(register);
/// ```
#[macro_export]
macro_rules! declare_module {
    ($register:path) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _hotswap_api_version() -> u32 {
            $crate::hot_reload::NativeLinker::CURRENT_API_VERSION
        }

        #[unsafe(no_mangle)]
        pub fn _hotswap_register(registrar: &mut $crate::hot_reload::ModuleRegistrar) {
            $register(registrar)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_kernel::Startup;
    use std::any::Any;

    #[derive(Default)]
    struct Beacon;

    impl ReloadableComponent for Beacon {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn catalog() -> ComponentCatalog {
        ComponentCatalog::new()
            .with("Ctrl", crate::hot_reload::factory_for::<Beacon>())
            .with("HelperImpl", crate::hot_reload::factory_for::<Beacon>())
    }

    #[test]
    fn test_manifest_parse_toml() {
        let manifest = ModuleManifest::parse(
            br#"
name = "FooModule"

[[types]]
name = "Ctrl"
activation = { startup = "flight", once = true }

[[types]]
name = "Widget"
base = "plain"
"#,
        )
        .unwrap();

        assert_eq!(manifest.name.as_deref(), Some("FooModule"));
        assert_eq!(manifest.types.len(), 2);
        assert_eq!(
            manifest.types[0].activation,
            Some(ActivationMeta::new(Startup::Flight).with_once(true))
        );
        assert_eq!(manifest.types[0].base, Capability::Reloadable);
        assert_eq!(manifest.types[1].base, Capability::Plain);
    }

    #[test]
    fn test_manifest_parse_json() {
        let manifest = ModuleManifest::parse(
            br#"{ "types": [ { "name": "Helper", "sealed": true } ] }"#,
        )
        .unwrap();
        assert!(manifest.name.is_none());
        assert!(manifest.types[0].sealed);
        assert!(manifest.types[0].activation.is_none());
    }

    #[test]
    fn test_manifest_parse_rejects_garbage() {
        let err = ModuleManifest::parse(b"[[types]\nname =").unwrap_err();
        assert!(matches!(err, ModuleLoadError::InvalidManifest(_)));

        let err = ModuleManifest::parse(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ModuleLoadError::InvalidManifest(_)));
    }

    #[test]
    fn test_manifest_linker_resolves_catalog() {
        let linker = ManifestLinker::new(catalog());
        let source = ModuleSource::new("Foo", "/plugins/Foo.toml");
        let bytes = br#"
[[types]]
name = "Ctrl"
activation = { startup = "instantly" }

[[types]]
name = "Helper"
implementation = "HelperImpl"

[[types]]
name = "Ghost"

[[types]]
name = "Widget"
base = "plain"
"#
        .to_vec();

        let module = linker.link(&source, bytes, Generation::new(1)).unwrap();
        assert_eq!(module.name(), "Foo");

        let defs = module.definitions();
        assert_eq!(defs.len(), 4);
        assert!(defs[0].is_top_level() && defs[0].factory().is_some());
        assert!(!defs[1].is_top_level() && defs[1].factory().is_some());
        assert!(defs[2].factory().is_none());
        assert!(!defs[3].is_reloadable());
    }

    #[test]
    fn test_native_linker_rejects_non_library() {
        let linker = NativeLinker::new();
        let source = ModuleSource::new("Foo", "/plugins/libfoo.so");
        let err = linker
            .link(&source, b"definitely not a shared object".to_vec(), Generation::new(1))
            .unwrap_err();
        assert!(matches!(err, ModuleLoadError::LibraryLoad(_)));
    }
}
