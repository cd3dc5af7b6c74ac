//! In-place module reload support
//!
//! Reloads modules inside a running host without restarting it:
//! - Per-generation module loading, optionally renamed through external tools
//! - Generation-unique type synthesis and dependent-type substitution
//! - Descriptor registry with at-most-one live instance per top-level type
//! - Stage-gated activation honoring `once` semantics

mod activation;
mod instance;
mod linker;
mod loader;
mod manager;
mod module;
mod registry;
mod report;
mod substitution;
mod synthesizer;

pub use activation::{ActivationGate, ActivationRecord, GateDecision, SharedStage};
pub use instance::{
    ActivationGuardViolation, ComponentContext, InstanceError, InstanceSlot, PluginInstance,
};
pub use linker::{
    ComponentCatalog, ManifestLinker, ManifestType, ModuleLinker, ModuleManifest, NativeLinker,
};
pub use loader::{DirectLoader, ModuleLoadError, ModuleLoader, RenamePipelineLoader, loader_for};
pub use manager::{ReloadError, ReloadOrchestrator};
pub use module::{Capability, LoadedModule, ModuleRegistrar, TypeDefinition, factory_for};
pub use registry::{
    DescriptorDraft, DescriptorId, DescriptorRegistry, RegistryStats, Role, TypeDescriptor,
};
pub use report::{Diagnostic, DiagnosticKind, ReloadReport, SourceOutcome, SourceReport};
pub use substitution::SubstitutionTable;
pub use synthesizer::{SynthesisError, SynthesisScope, SynthesizedType, TypeSynthesizer};

// Re-export kernel definitions modules and hosts need alongside the engine
pub use hotswap_kernel::{
    ActivationMeta, ComponentScope, Generation, ReloadEvent, ReloadableComponent, Stage,
    StageContext, Startup,
};
