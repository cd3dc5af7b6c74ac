//! Hotswap plugins
//!
//! The reload engine. A host lists its module sources in
//! [`ReloadSettings`](hotswap_kernel::config::ReloadSettings), builds a
//! [`ReloadOrchestrator`](hot_reload::ReloadOrchestrator) with a linker and
//! calls `reload()` whenever it wants the modules replaced.

pub mod hot_reload;

pub use hot_reload::{
    ComponentCatalog, DescriptorRegistry, ManifestLinker, ModuleRegistrar, NativeLinker,
    ReloadOrchestrator, ReloadReport, SharedStage, TypeDefinition, factory_for,
};
