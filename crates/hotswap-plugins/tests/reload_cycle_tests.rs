//! Reload cycle tests
//!
//! Drive the orchestrator end to end over manifest modules written to a
//! temporary directory and record component lifecycle calls in a shared log.

use std::any::Any;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use hotswap_kernel::config::{HotReloadOptions, ReloadSettings};
use hotswap_kernel::{
    ComponentError, ComponentResult, ComponentScope, ModuleSource, ReloadEvent,
    ReloadableComponent, Stage,
};
use hotswap_plugins::hot_reload::{
    ComponentCatalog, DiagnosticKind, ManifestLinker, ReloadError, ReloadOrchestrator,
    SharedStage, SourceOutcome,
};
use parking_lot::Mutex;
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

// ============================================================================
// Test components
// ============================================================================

struct Ctrl {
    log: Log,
    name: String,
    helper: Option<Box<dyn ReloadableComponent>>,
    helper_type: String,
    vector_substituted: bool,
}

impl ReloadableComponent for Ctrl {
    fn awake(&mut self, scope: &dyn ComponentScope) -> ComponentResult<()> {
        self.name = scope.identity().name().to_string();
        self.log.lock().push(format!("awake {}", self.name));
        self.helper = Some(scope.construct("Helper")?);
        self.helper_type = scope.resolve("Helper").name().to_string();
        self.vector_substituted = scope.resolve("Vector3").is_synthesized();
        Ok(())
    }

    fn on_destroy(&mut self) {
        self.log.lock().push(format!("destroy {}", self.name));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Beacon {
    log: Log,
    name: String,
}

impl ReloadableComponent for Beacon {
    fn awake(&mut self, scope: &dyn ComponentScope) -> ComponentResult<()> {
        self.name = scope.identity().name().to_string();
        self.log.lock().push(format!("awake {}", self.name));
        Ok(())
    }

    fn on_destroy(&mut self) {
        self.log.lock().push(format!("destroy {}", self.name));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Grumpy;

impl ReloadableComponent for Grumpy {
    fn awake(&mut self, _scope: &dyn ComponentScope) -> ComponentResult<()> {
        Err(ComponentError::AwakeFailed("not in the mood".into()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn catalog(log: &Log) -> ComponentCatalog {
    let mut catalog = ComponentCatalog::new();

    let ctrl_log = log.clone();
    catalog.register("Ctrl", move || -> Box<dyn ReloadableComponent> {
        Box::new(Ctrl {
            log: ctrl_log.clone(),
            name: String::new(),
            helper: None,
            helper_type: String::new(),
            vector_substituted: false,
        })
    });

    let beacon_log = log.clone();
    catalog.register("Beacon", move || -> Box<dyn ReloadableComponent> {
        Box::new(Beacon {
            log: beacon_log.clone(),
            name: String::new(),
        })
    });

    catalog.register("Grumpy", || -> Box<dyn ReloadableComponent> { Box::new(Grumpy) });
    catalog
}

// ============================================================================
// Harness
// ============================================================================

const FOO: &str = r#"
[[types]]
name = "Ctrl"
activation = { startup = "instantly" }

[[types]]
name = "Helper"
implementation = "Beacon"
"#;

struct Harness {
    dir: TempDir,
    log: Log,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            log: Log::default(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.toml"))
    }

    fn module(&self, name: &str, manifest: &str) -> ModuleSource {
        fs::write(self.path(name), manifest).unwrap();
        ModuleSource::new(name, self.path(name))
    }

    fn settings(&self, sources: Vec<ModuleSource>) -> ReloadSettings {
        sources
            .into_iter()
            .fold(ReloadSettings::new(), ReloadSettings::with_source)
    }

    fn orchestrator(&self, sources: Vec<ModuleSource>) -> ReloadOrchestrator {
        ReloadOrchestrator::new(
            self.settings(sources),
            ManifestLinker::new(catalog(&self.log)),
        )
    }

    fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry} not logged"))
    }
}

fn names(ids: &[hotswap_kernel::SynthesizedTypeId]) -> Vec<&str> {
    ids.iter().map(|id| id.name()).collect()
}

// ============================================================================
// Generations and replacement
// ============================================================================

#[test]
fn test_generation_advances_by_one_per_cycle() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);

    let generations: Vec<u64> = (0..3)
        .map(|_| orchestrator.reload().generation.value())
        .collect();
    assert_eq!(generations, vec![1, 2, 3]);
    assert_eq!(orchestrator.generation().value(), 3);
}

#[test]
fn test_reload_replaces_instances_with_next_generation() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);

    let first = orchestrator.reload();
    assert_eq!(names(&first.created), vec!["Ctrl_1_"]);
    assert_eq!(harness.entries(), vec!["awake Ctrl_1_", "awake Helper_1_"]);

    let second = orchestrator.reload();
    assert_eq!(names(&second.destroyed), vec!["Ctrl_1_"]);
    assert_eq!(names(&second.created), vec!["Ctrl_2_"]);
    assert!(harness.position("destroy Ctrl_1_") < harness.position("awake Ctrl_2_"));
    assert!(harness.entries().contains(&"awake Helper_2_".to_string()));

    let foo = second.source("Foo").unwrap();
    assert_eq!(foo.torn_down, 1);
    assert_eq!(foo.discarded, 2);
    assert_eq!(
        foo.outcome,
        SourceOutcome::Loaded {
            top_level: 1,
            dependent: 1,
            skipped: 0
        }
    );

    // nothing from generation 1 survives
    let registry = orchestrator.registry();
    assert_eq!(registry.len(), 2);
    assert!(registry.iter().all(|d| d.generation().value() == 2));
    assert_eq!(registry.alive_count(), 1);
}

#[test]
fn test_dependents_come_from_the_same_generation() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);
    orchestrator.reload();
    orchestrator.reload();

    let descriptor = orchestrator.registry().find_by_name("Foo", "Ctrl").unwrap();
    let ctrl = descriptor.instance().unwrap().downcast_ref::<Ctrl>().unwrap();
    assert_eq!(ctrl.name, "Ctrl_2_");
    assert_eq!(ctrl.helper_type, "Helper_2_");
    assert!(ctrl.helper.is_some());
    assert!(!ctrl.vector_substituted);

    let table = descriptor.substitutions();
    assert_eq!(table.generation().value(), 2);
    assert_eq!(table.len(), 1);
}

// ============================================================================
// Load-once sources and once types
// ============================================================================

const KEEPER: &str = r#"
[[types]]
name = "Keeper"
implementation = "Beacon"
activation = { startup = "instantly" }
"#;

#[test]
fn test_load_once_source_is_never_replaced() {
    let harness = Harness::new();
    let bar = harness.module("Bar", KEEPER).with_load_once(true);
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO), bar]);

    orchestrator.reload();
    let first_id = orchestrator
        .registry()
        .find_by_name("Bar", "Keeper")
        .and_then(|d| d.instance())
        .map(|i| i.instance_id().to_string())
        .unwrap();

    let report = orchestrator.reload();
    assert_eq!(report.source("Bar").unwrap().outcome, SourceOutcome::Skipped);
    assert_eq!(names(&report.created), vec!["Ctrl_2_"]);

    let keeper = orchestrator.registry().find_by_name("Bar", "Keeper").unwrap();
    assert_eq!(keeper.generation().value(), 1);
    assert_eq!(keeper.instance().unwrap().instance_id(), first_id);
    assert!(!harness.entries().contains(&"destroy Keeper_1_".to_string()));

    // the gate saw the alive instance and refused a second one
    assert_eq!(report.diagnostics_of(DiagnosticKind::ActivationGuard).count(), 1);
    assert_eq!(orchestrator.registry().alive_count_for("Bar"), 1);
}

#[test]
fn test_once_types_are_not_recreated_after_deletion() {
    let harness = Harness::new();
    let bar = harness
        .module(
            "Bar",
            r#"
[[types]]
name = "Solo"
implementation = "Beacon"
activation = { startup = "instantly", once = true }

[[types]]
name = "Again"
implementation = "Beacon"
activation = { startup = "instantly" }
"#,
        )
        .with_load_once(true);
    let mut orchestrator = harness.orchestrator(vec![bar]);

    let first = orchestrator.reload();
    assert_eq!(names(&first.created), vec!["Solo_1_", "Again_1_"]);

    let ids: Vec<_> = orchestrator.registry().iter().map(|d| d.id()).collect();
    for id in &ids {
        orchestrator.delete_instance(*id).unwrap();
    }
    assert!(matches!(
        orchestrator.delete_instance(ids[0]),
        Err(ReloadError::Guard(_))
    ));

    let second = orchestrator.reload();
    assert_eq!(names(&second.created), vec!["Again_1_"]);

    let solo = orchestrator.registry().find_by_name("Bar", "Solo").unwrap();
    assert!(!solo.is_alive());
    assert!(solo.fired());
}

/// Log sink for asserting on emitted warnings
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_rejected_delete_is_logged_as_warning() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);
    orchestrator.reload();
    let id = orchestrator.registry().top_level().next().unwrap().id();

    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        orchestrator.delete_instance(id).unwrap();
        assert!(matches!(
            orchestrator.delete_instance(id),
            Err(ReloadError::Guard(_))
        ));
    });

    let logged = String::from_utf8(buffer.0.lock().clone()).unwrap();
    assert!(logged.contains("WARN"));
    assert!(logged.contains("Rejected delete of Foo::Ctrl_1_"));
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_failed_source_does_not_block_others() {
    let harness = Harness::new();
    let missing = ModuleSource::new("Foo", harness.path("Foo"));
    let bar = harness.module("Bar", KEEPER);
    let mut orchestrator = harness.orchestrator(vec![missing, bar]);

    let report = orchestrator.reload();
    match &report.source("Foo").unwrap().outcome {
        SourceOutcome::Failed { error } => assert!(error.contains("File does not exist")),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.diagnostics_of(DiagnosticKind::ModuleLoad).count(), 1);
    assert_eq!(names(&report.created), vec!["Keeper_1_"]);
}

#[test]
fn test_source_that_stops_loading_is_removed() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);
    orchestrator.reload();

    fs::remove_file(harness.path("Foo")).unwrap();
    let report = orchestrator.reload();

    let foo = report.source("Foo").unwrap();
    assert!(matches!(foo.outcome, SourceOutcome::Failed { .. }));
    assert_eq!(foo.torn_down, 1);
    assert_eq!(orchestrator.registry().by_source("Foo").count(), 0);
    assert!(harness.entries().contains(&"destroy Ctrl_1_".to_string()));
}

const MIXED: &str = r#"
[[types]]
name = "Ctrl"
activation = { startup = "instantly" }

[[types]]
name = "Helper"
implementation = "Beacon"

[[types]]
name = "Locked"
implementation = "Beacon"
sealed = true
activation = { startup = "instantly" }
"#;

#[test]
fn test_partial_failure_skips_the_bad_type() {
    let harness = Harness::new();
    let source = harness.module("Foo", MIXED).with_partial_failure(true);
    let mut orchestrator = harness.orchestrator(vec![source]);

    let report = orchestrator.reload();
    assert_eq!(
        report.source("Foo").unwrap().outcome,
        SourceOutcome::Loaded {
            top_level: 1,
            dependent: 1,
            skipped: 1
        }
    );
    let synthesis: Vec<_> = report.diagnostics_of(DiagnosticKind::Synthesis).collect();
    assert_eq!(synthesis.len(), 1);
    assert!(synthesis[0].message.contains("sealed"));
    assert_eq!(names(&report.created), vec!["Ctrl_1_"]);
}

#[test]
fn test_synthesis_failure_aborts_the_source() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![
        harness.module("Foo", MIXED),
        harness.module("Bar", KEEPER),
    ]);

    let report = orchestrator.reload();
    assert!(matches!(
        report.source("Foo").unwrap().outcome,
        SourceOutcome::Aborted { .. }
    ));
    assert_eq!(orchestrator.registry().by_source("Foo").count(), 0);
    assert_eq!(names(&report.created), vec!["Keeper_1_"]);
}

#[test]
fn test_missing_implementation_aborts_the_source() {
    let harness = Harness::new();
    let ghost = harness.module("Ghost", "[[types]]\nname = \"Phantom\"\n");
    let mut orchestrator = harness.orchestrator(vec![ghost]);

    let report = orchestrator.reload();
    match &report.source("Ghost").unwrap().outcome {
        SourceOutcome::Aborted { error } => assert!(error.contains("No implementation")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn test_capability_mismatch_is_never_fatal() {
    let harness = Harness::new();
    let source = harness.module(
        "Foo",
        &format!("{FOO}\n[[types]]\nname = \"Widget\"\nbase = \"plain\"\n"),
    );
    let mut orchestrator = harness.orchestrator(vec![source]);

    let report = orchestrator.reload();
    assert!(matches!(
        report.source("Foo").unwrap().outcome,
        SourceOutcome::Loaded { skipped: 1, .. }
    ));
    assert_eq!(
        report
            .diagnostics_of(DiagnosticKind::CapabilityMismatch)
            .count(),
        1
    );
    assert_eq!(report.diagnostics_of(DiagnosticKind::Synthesis).count(), 0);
    assert_eq!(names(&report.created), vec!["Ctrl_1_"]);
}

#[test]
fn test_failed_awake_leaves_type_unfired() {
    let harness = Harness::new();
    let source = harness.module(
        "Foo",
        "[[types]]\nname = \"Grumpy\"\nactivation = { startup = \"instantly\", once = true }\n",
    );
    let mut orchestrator = harness.orchestrator(vec![source]);

    let report = orchestrator.reload();
    assert!(report.created.is_empty());
    assert_eq!(report.diagnostics_of(DiagnosticKind::Activation).count(), 1);

    let grumpy = orchestrator.registry().find_by_name("Foo", "Grumpy").unwrap();
    assert!(!grumpy.is_alive());
    assert!(!grumpy.fired());
}

// ============================================================================
// Stage gating
// ============================================================================

const FLIGHT: &str = r#"
[[types]]
name = "Autopilot"
implementation = "Beacon"
activation = { startup = "flight" }
"#;

#[test]
fn test_stage_gated_type_waits_for_next_cycle() {
    let harness = Harness::new();
    let stage = SharedStage::new(Stage::MainMenu);
    let mut orchestrator = harness
        .orchestrator(vec![harness.module("Foo", FLIGHT)])
        .with_stage_context(Arc::new(stage.clone()));

    let first = orchestrator.reload();
    assert!(first.created.is_empty());

    stage.set(Stage::Flight);
    assert!(orchestrator.on_stage_changed().is_none());
    assert_eq!(orchestrator.registry().alive_count(), 0);

    let second = orchestrator.reload();
    assert_eq!(names(&second.created), vec!["Autopilot_2_"]);
}

#[test]
fn test_stage_recheck_activates_between_cycles() {
    let harness = Harness::new();
    let stage = SharedStage::new(Stage::MainMenu);
    let options = HotReloadOptions {
        recheck_on_stage_change: true,
        ..HotReloadOptions::default()
    };
    let settings = harness
        .settings(vec![harness.module("Foo", FLIGHT)])
        .with_options(options);
    let mut orchestrator =
        ReloadOrchestrator::new(settings, ManifestLinker::new(catalog(&harness.log)))
            .with_stage_context(Arc::new(stage.clone()));

    orchestrator.reload();
    stage.set(Stage::Flight);

    let report = orchestrator.on_stage_changed().unwrap();
    assert_eq!(report.generation.value(), 1);
    assert_eq!(names(&report.created), vec!["Autopilot_1_"]);
    assert_eq!(orchestrator.generation().value(), 1);
}

// ============================================================================
// Shutdown, events and settings files
// ============================================================================

#[test]
fn test_shutdown_destroys_live_instances_once() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![
        harness.module("Foo", FOO),
        harness.module("Bar", KEEPER),
    ]);
    orchestrator.reload();

    assert_eq!(orchestrator.shutdown(), 2);
    assert_eq!(orchestrator.registry().alive_count(), 0);
    assert!(orchestrator.registry().is_empty());
    drop(orchestrator);

    let destroys = harness
        .entries()
        .iter()
        .filter(|e| e.starts_with("destroy"))
        .count();
    assert_eq!(destroys, 2);
}

#[test]
fn test_drop_tears_down() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);
    orchestrator.reload();
    drop(orchestrator);

    assert!(harness.entries().contains(&"destroy Ctrl_1_".to_string()));
}

#[tokio::test]
async fn test_cycle_events_are_published_in_order() {
    let harness = Harness::new();
    let mut orchestrator = harness.orchestrator(vec![harness.module("Foo", FOO)]);
    let mut rx = orchestrator.subscribe();

    orchestrator.reload();

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, ReloadEvent::CycleStarted { generation } if generation.value() == 1));

    let mut rest = Vec::new();
    while let Ok(event) = rx.try_recv() {
        rest.push(event);
    }
    assert!(matches!(
        rest.first(),
        Some(ReloadEvent::SourceLoaded { top_level: 1, dependent: 1, .. })
    ));
    assert!(rest.iter().any(|e| matches!(
        e,
        ReloadEvent::InstanceCreated { type_id, .. } if type_id.name() == "Ctrl_1_"
    )));
    assert!(matches!(
        rest.last(),
        Some(ReloadEvent::CycleCompleted { alive: 1, .. })
    ));
}

#[test]
fn test_from_settings_file() {
    let harness = Harness::new();
    harness.module("Foo", FOO);
    let settings_path = harness.dir.path().join("hotswap.toml");
    fs::write(
        &settings_path,
        "[[sources]]\nname = \"Foo\"\npath = \"Foo.toml\"\n",
    )
    .unwrap();

    let mut orchestrator = ReloadOrchestrator::from_settings_file(
        &settings_path,
        ManifestLinker::new(catalog(&harness.log)),
    );
    assert_eq!(orchestrator.loader_name(), "direct");
    assert_eq!(names(&orchestrator.reload().created), vec!["Ctrl_1_"]);
}

#[test]
fn test_unusable_settings_file_runs_with_zero_sources() {
    let harness = Harness::new();
    let empty = harness.dir.path().join("empty.toml");
    fs::write(&empty, "").unwrap();
    let missing = harness.dir.path().join("missing.toml");

    for path in [empty, missing] {
        let mut orchestrator =
            ReloadOrchestrator::from_settings_file(&path, ManifestLinker::default());
        assert!(orchestrator.sources().is_empty());

        let report = orchestrator.reload();
        assert_eq!(report.generation.value(), 1);
        assert!(report.sources.is_empty());
        assert_eq!(report.alive, 0);
        assert_eq!(orchestrator.reload().generation.value(), 2);
    }
}
