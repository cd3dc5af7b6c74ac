use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub mod error;
pub use error::ComponentError;

/// Component operation result type using the typed [`ComponentError`].
pub type ComponentResult<T> = Result<T, ComponentError>;

// ============================================================================
// Generation
// ============================================================================

/// Reload-cycle counter
///
/// Starts at [`Generation::INITIAL`] before the first cycle and is bumped by
/// exactly one per cycle. Everything synthesized during a cycle is tagged with it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Generation before any reload cycle has run
    pub const INITIAL: Generation = Generation(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The generation of the following cycle
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this is the first cycle the engine ever runs
    pub fn is_first_cycle(self) -> bool {
        self.0 == 1
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Type identities
// ============================================================================

/// Identity of a type as declared by its module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OriginalTypeId {
    /// Declaring module name
    pub module: String,
    /// Type name inside the module
    pub name: String,
}

impl OriginalTypeId {
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for OriginalTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Generation-unique identity standing in for an [`OriginalTypeId`]
///
/// The synthesized name (`{Type}_{generation}_`) never repeats across
/// generations, so a name-keyed cache in the host can not hand back a previous
/// generation's definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SynthesizedTypeId {
    original: OriginalTypeId,
    generation: Generation,
    name: String,
}

impl SynthesizedTypeId {
    /// Derive the identity of `original` for `generation`
    pub fn derive(original: &OriginalTypeId, generation: Generation) -> Self {
        Self {
            name: format!("{}_{}_", original.name, generation),
            original: original.clone(),
            generation,
        }
    }

    pub fn original(&self) -> &OriginalTypeId {
        &self.original
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Synthesized (unqualified) type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module-qualified synthesized name
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.original.module, self.name)
    }
}

impl fmt::Display for SynthesizedTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.original.module, self.name)
    }
}

/// Outcome of resolving a type name through a substitution table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    /// Replaced by the current generation's synthesized type
    Synthesized(SynthesizedTypeId),
    /// No substitution exists; the original identity is used as-is
    Original(OriginalTypeId),
}

impl TypeRef {
    pub fn is_synthesized(&self) -> bool {
        matches!(self, TypeRef::Synthesized(_))
    }

    /// Name the host sees for this type
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Synthesized(id) => id.name(),
            TypeRef::Original(id) => &id.name,
        }
    }
}

// ============================================================================
// Stage policy
// ============================================================================

/// Operating phase of the host process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Stage {
    #[default]
    Loading,
    MainMenu,
    Settings,
    Credits,
    SpaceCenter,
    Editor,
    Flight,
    TrackingStation,
    /// Host-specific stage not covered above
    Custom(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Loading => write!(f, "loading"),
            Stage::MainMenu => write!(f, "main_menu"),
            Stage::Settings => write!(f, "settings"),
            Stage::Credits => write!(f, "credits"),
            Stage::SpaceCenter => write!(f, "space_center"),
            Stage::Editor => write!(f, "editor"),
            Stage::Flight => write!(f, "flight"),
            Stage::TrackingStation => write!(f, "tracking_station"),
            Stage::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for Stage {
    type Err = std::convert::Infallible;

    /// Case-insensitive; `-` and `_` are ignored. Unknown names become [`Stage::Custom`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();

        Ok(match normalized.as_str() {
            "loading" => Stage::Loading,
            "mainmenu" => Stage::MainMenu,
            "settings" => Stage::Settings,
            "credits" => Stage::Credits,
            "spacecenter" | "spacecentre" => Stage::SpaceCenter,
            "editor" => Stage::Editor,
            "flight" => Stage::Flight,
            "trackingstation" => Stage::TrackingStation,
            _ => Stage::Custom(s.trim().to_string()),
        })
    }
}

/// Read-only view of the host's current stage
pub trait StageContext: Send + Sync {
    fn current_stage(&self) -> Stage;
}

impl StageContext for Stage {
    fn current_stage(&self) -> Stage {
        self.clone()
    }
}

/// Host-recognized "auto-register with stage X" marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Startup {
    Instantly,
    EveryScene,
    FirstSpawn,
    MainMenu,
    Settings,
    Credits,
    SpaceCenter,
    Editor,
    Flight,
    TrackingStation,
}

impl Startup {
    /// Stage predicate this marker activates under
    pub fn predicate(self) -> StagePredicate {
        match self {
            Startup::Instantly | Startup::EveryScene | Startup::FirstSpawn => StagePredicate::Always,
            Startup::MainMenu => StagePredicate::StageEquals(Stage::MainMenu),
            Startup::Settings => StagePredicate::StageEquals(Stage::Settings),
            Startup::Credits => StagePredicate::StageEquals(Stage::Credits),
            Startup::SpaceCenter => StagePredicate::StageEquals(Stage::SpaceCenter),
            Startup::Editor => StagePredicate::StageEquals(Stage::Editor),
            Startup::Flight => StagePredicate::StageEquals(Stage::Flight),
            Startup::TrackingStation => StagePredicate::StageEquals(Stage::TrackingStation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePredicate {
    Always,
    StageEquals(Stage),
}

impl StagePredicate {
    pub fn evaluate(&self, current: &Stage) -> bool {
        match self {
            StagePredicate::Always => true,
            StagePredicate::StageEquals(stage) => stage == current,
        }
    }
}

/// Activation metadata carried by top-level types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationMeta {
    pub startup: Startup,
    /// Create at most once across all generations
    #[serde(default)]
    pub once: bool,
}

impl ActivationMeta {
    pub fn new(startup: Startup) -> Self {
        Self {
            startup,
            once: false,
        }
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn predicate(&self) -> StagePredicate {
        self.startup.predicate()
    }
}

// ============================================================================
// Module sources
// ============================================================================

/// A named, on-disk unit of dynamically loadable code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    pub name: String,
    pub path: PathBuf,
    /// Loaded on the first cycle only, never torn down or replaced
    #[serde(default)]
    pub load_once: bool,
    /// Skip types that fail synthesis instead of aborting the whole source
    #[serde(default)]
    pub allow_partial_failure: bool,
}

impl ModuleSource {
    pub fn new<P: AsRef<Path>>(name: &str, path: P) -> Self {
        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            load_once: false,
            allow_partial_failure: false,
        }
    }

    pub fn with_load_once(mut self, load_once: bool) -> Self {
        self.load_once = load_once;
        self
    }

    pub fn with_partial_failure(mut self, allowed: bool) -> Self {
        self.allow_partial_failure = allowed;
        self
    }
}

// ============================================================================
// Component contract
// ============================================================================

/// The base capability every reloadable type must implement
pub trait ReloadableComponent: Send {
    /// Runs once right after construction
    fn awake(&mut self, scope: &dyn ComponentScope) -> ComponentResult<()> {
        let _ = scope;
        Ok(())
    }

    /// Teardown hook, runs before the instance is released
    fn on_destroy(&mut self) {}

    fn as_any(&self) -> &dyn Any;
}

/// Construction scope handed to a component while it is being built
///
/// Dependent objects must be constructed through [`ComponentScope::construct`]
/// so they come from the same generation as the component building them.
pub trait ComponentScope {
    /// Synthesized identity of the object under construction
    fn identity(&self) -> &SynthesizedTypeId;

    fn generation(&self) -> Generation {
        self.identity().generation()
    }

    fn stage(&self) -> &Stage;

    /// Resolve a type declared by the same module
    fn resolve(&self, type_name: &str) -> TypeRef;

    /// Build (and awake) a dependent object of the same module
    fn construct(&self, type_name: &str) -> ComponentResult<Box<dyn ReloadableComponent>>;
}

/// Creates fresh component objects for one concrete type
pub trait ComponentFactory: Send + Sync {
    fn create(&self) -> Box<dyn ReloadableComponent>;
}

impl<F> ComponentFactory for F
where
    F: Fn() -> Box<dyn ReloadableComponent> + Send + Sync,
{
    fn create(&self) -> Box<dyn ReloadableComponent> {
        self()
    }
}

// ============================================================================
// Reload events
// ============================================================================

/// Progress of a reload cycle, published to subscribers
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ReloadEvent {
    CycleStarted {
        generation: Generation,
    },
    /// A load-once source was left untouched
    SourceSkipped {
        source: String,
    },
    InstanceDestroyed {
        source: String,
        type_id: SynthesizedTypeId,
    },
    SourceLoaded {
        source: String,
        generation: Generation,
        top_level: usize,
        dependent: usize,
    },
    SourceFailed {
        source: String,
        error: String,
    },
    TypeSkipped {
        source: String,
        type_name: String,
        reason: String,
    },
    InstanceCreated {
        source: String,
        type_id: SynthesizedTypeId,
        instance_id: String,
    },
    CycleCompleted {
        generation: Generation,
        duration: Duration,
        alive: usize,
    },
}
