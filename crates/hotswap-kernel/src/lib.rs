//! Hotswap kernel
//!
//! Shared vocabulary of the reload engine and the modules it loads:
//! - Generation counter and generation-tagged type identities
//! - Stage policy (`Startup` markers, `StagePredicate`)
//! - The `ReloadableComponent` contract and construction scope
//! - Reload settings and error types

pub mod config;
pub mod error;
pub mod plugin;

pub use error::{HotswapError, HotswapResult};
pub use plugin::{
    ActivationMeta, ComponentError, ComponentFactory, ComponentResult, ComponentScope, Generation,
    ModuleSource, OriginalTypeId, ReloadEvent, ReloadableComponent, Stage, StageContext,
    StagePredicate, Startup, SynthesizedTypeId, TypeRef,
};
