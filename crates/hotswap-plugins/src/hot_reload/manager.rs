//! Reload orchestrator
//!
//! Runs reload cycles: bump the generation, then per source tear down, load,
//! synthesize and register, then run the activation gate over all top-level
//! descriptors. Cycles are synchronous and only run when the host asks.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use hotswap_kernel::config::{HotReloadOptions, ReloadSettings};
use hotswap_kernel::{Generation, ModuleSource, OriginalTypeId, ReloadEvent, StageContext};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::activation::{ActivationGate, ActivationRecord};
use super::instance::ActivationGuardViolation;
use super::linker::ModuleLinker;
use super::loader::{ModuleLoadError, ModuleLoader, loader_for};
use super::module::LoadedModule;
use super::registry::{DescriptorDraft, DescriptorId, DescriptorRegistry};
use super::report::{Diagnostic, DiagnosticKind, ReloadReport, SourceOutcome, SourceReport};
use super::substitution::SubstitutionTable;
use super::synthesizer::{SynthesisError, TypeSynthesizer};

/// Orchestrator error types
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("Descriptor not found: {0}")]
    DescriptorNotFound(DescriptorId),

    #[error(transparent)]
    Guard(#[from] ActivationGuardViolation),
}

/// A module's synthesized types, ready for registration
struct ModuleBatch {
    drafts: Vec<DescriptorDraft>,
    substitutions: SubstitutionTable,
    skipped: usize,
}

/// Drives reload cycles over an ordered list of module sources
pub struct ReloadOrchestrator {
    sources: Vec<Arc<ModuleSource>>,
    options: HotReloadOptions,
    loader: Box<dyn ModuleLoader>,
    linker: Box<dyn ModuleLinker>,
    synthesizer: TypeSynthesizer,
    registry: DescriptorRegistry,
    generation: Generation,
    stage: Arc<dyn StageContext>,
    event_tx: broadcast::Sender<ReloadEvent>,
    last_report: Option<ReloadReport>,
}

impl ReloadOrchestrator {
    pub fn new<L>(settings: ReloadSettings, linker: L) -> Self
    where
        L: ModuleLinker + 'static,
    {
        let (event_tx, _) = broadcast::channel(1024);
        let settings = settings.normalized();
        let loader = loader_for(&settings.tools);

        Self {
            sources: settings.sources.into_iter().map(Arc::new).collect(),
            stage: Arc::new(settings.hot_reload.initial_stage.clone()),
            options: settings.hot_reload,
            loader,
            linker: Box::new(linker),
            synthesizer: TypeSynthesizer::new(),
            registry: DescriptorRegistry::new(),
            generation: Generation::INITIAL,
            event_tx,
            last_report: None,
        }
    }

    /// Build from a settings file
    ///
    /// A missing or malformed file is logged and leaves the orchestrator with
    /// zero sources; cycles still run and bump the generation.
    pub fn from_settings_file<L>(path: &Path, linker: L) -> Self
    where
        L: ModuleLinker + 'static,
    {
        let settings = ReloadSettings::load_or_default(path);
        if settings.sources.is_empty() {
            warn!("No module sources listed in {}", path.display());
        }
        Self::new(settings, linker)
    }

    pub fn with_loader<L>(mut self, loader: L) -> Self
    where
        L: ModuleLoader + 'static,
    {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_stage_context(mut self, stage: Arc<dyn StageContext>) -> Self {
        self.stage = stage;
        self
    }

    /// Subscribe to cycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.event_tx.subscribe()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    pub fn sources(&self) -> &[Arc<ModuleSource>] {
        &self.sources
    }

    pub fn options(&self) -> &HotReloadOptions {
        &self.options
    }

    pub fn loader_name(&self) -> &'static str {
        self.loader.name()
    }

    pub fn last_report(&self) -> Option<&ReloadReport> {
        self.last_report.as_ref()
    }

    fn emit(&self, event: ReloadEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Run one full reload cycle
    pub fn reload(&mut self) -> ReloadReport {
        let started = Instant::now();
        self.generation = self.generation.next();
        let generation = self.generation;
        info!("(Re)loading modules, generation {}", generation);

        self.synthesizer.begin_generation(generation);
        self.emit(ReloadEvent::CycleStarted { generation });

        let mut report = ReloadReport::new(generation);
        for source in self.sources.clone() {
            let source_report = self.process_source(&source, generation, &mut report);
            report.sources.push(source_report);
        }

        self.run_activation(&mut report);

        report.alive = self.registry.alive_count();
        report.duration = started.elapsed();
        info!(
            "Generation {} ready in {:?}: {} created, {} destroyed, {} alive, {} diagnostic(s)",
            generation,
            report.duration,
            report.created.len(),
            report.destroyed.len(),
            report.alive,
            report.diagnostics.len()
        );
        self.emit(ReloadEvent::CycleCompleted {
            generation,
            duration: report.duration,
            alive: report.alive,
        });

        self.last_report = Some(report.clone());
        report
    }

    fn process_source(
        &mut self,
        source: &Arc<ModuleSource>,
        generation: Generation,
        report: &mut ReloadReport,
    ) -> SourceReport {
        let mut torn_down = 0;
        let mut discarded = 0;

        if source.load_once {
            if !generation.is_first_cycle() {
                debug!("Skipping load-once module {}", source.name);
                self.emit(ReloadEvent::SourceSkipped {
                    source: source.name.clone(),
                });
                return SourceReport::new(&source.name, SourceOutcome::Skipped);
            }
        } else {
            let destroyed = self.registry.teardown_source(&source.name);
            for type_id in &destroyed {
                self.emit(ReloadEvent::InstanceDestroyed {
                    source: source.name.clone(),
                    type_id: type_id.clone(),
                });
            }
            torn_down = destroyed.len();
            discarded = self.registry.discard_source(&source.name);
            report.destroyed.extend(destroyed);
        }

        let module = match self.load_module(source, generation) {
            Ok(module) => module,
            Err(e) => {
                error!("Failed to load module {} from {:?}: {}", source.name, source.path, e);
                report.diagnostics.push(Diagnostic::new(
                    generation,
                    Some(&source.name),
                    DiagnosticKind::ModuleLoad,
                    e.to_string(),
                ));
                self.emit(ReloadEvent::SourceFailed {
                    source: source.name.clone(),
                    error: e.to_string(),
                });
                return SourceReport {
                    torn_down,
                    discarded,
                    ..SourceReport::new(
                        &source.name,
                        SourceOutcome::Failed {
                            error: e.to_string(),
                        },
                    )
                };
            }
        };

        let digest = Some(module.digest().to_string());
        let outcome = match self.synthesize_module(source, &module, generation, report) {
            Ok(batch) => {
                let top_level = batch.drafts.iter().filter(|d| d.is_top_level()).count();
                let dependent = batch.drafts.len() - top_level;
                self.registry.register_batch(
                    source,
                    generation,
                    batch.drafts,
                    Arc::new(batch.substitutions),
                );
                info!(
                    "Module {} ready: {} top-level, {} dependent type(s)",
                    source.name, top_level, dependent
                );
                self.emit(ReloadEvent::SourceLoaded {
                    source: source.name.clone(),
                    generation,
                    top_level,
                    dependent,
                });
                SourceOutcome::Loaded {
                    top_level,
                    dependent,
                    skipped: batch.skipped,
                }
            }
            Err(e) => {
                error!("Module {} aborted: {}", source.name, e);
                self.emit(ReloadEvent::SourceFailed {
                    source: source.name.clone(),
                    error: e.to_string(),
                });
                SourceOutcome::Aborted {
                    error: e.to_string(),
                }
            }
        };

        SourceReport {
            name: source.name.clone(),
            outcome,
            torn_down,
            discarded,
            digest,
        }
    }

    fn load_module(
        &self,
        source: &ModuleSource,
        generation: Generation,
    ) -> Result<LoadedModule, ModuleLoadError> {
        debug!(
            "Loading module {} with the {} loader",
            source.name,
            self.loader.name()
        );
        let bytes = self.loader.load(&source.path, generation)?;
        let module = self.linker.link(source, bytes, generation)?;
        info!(
            "Loaded module {} as {} (sha256 {})",
            source.name,
            module.name(),
            module.digest()
        );
        Ok(module)
    }

    /// Synthesize every reloadable type of `module`
    ///
    /// Nothing is registered here; an abort leaves no partial registration.
    fn synthesize_module(
        &mut self,
        source: &ModuleSource,
        module: &LoadedModule,
        generation: Generation,
        report: &mut ReloadReport,
    ) -> Result<ModuleBatch, SynthesisError> {
        let mut substitutions = SubstitutionTable::new(&source.name, generation);
        let mut drafts = Vec::new();
        let mut skipped = 0;

        for definition in module.definitions() {
            debug!("got type {}", definition.name);

            if !definition.is_reloadable() {
                warn!(
                    "Type {} is not a reloadable component, skipped",
                    definition.name
                );
                let reason = format!("{} lacks the reloadable capability", definition.name);
                report.diagnostics.push(Diagnostic::new(
                    generation,
                    Some(&source.name),
                    DiagnosticKind::CapabilityMismatch,
                    reason.clone(),
                ));
                self.emit(ReloadEvent::TypeSkipped {
                    source: source.name.clone(),
                    type_name: definition.name.clone(),
                    reason,
                });
                skipped += 1;
                continue;
            }

            let synthesized = match self.synthesizer.synthesize(&source.name, definition, generation)
            {
                Ok(synthesized) => synthesized,
                Err(e) => {
                    error!("Synthesis of {} failed: {}", definition.name, e);
                    report.diagnostics.push(Diagnostic::new(
                        generation,
                        Some(&source.name),
                        DiagnosticKind::Synthesis,
                        e.to_string(),
                    ));
                    if !source.allow_partial_failure {
                        return Err(e);
                    }
                    self.emit(ReloadEvent::TypeSkipped {
                        source: source.name.clone(),
                        type_name: definition.name.clone(),
                        reason: e.to_string(),
                    });
                    skipped += 1;
                    continue;
                }
            };

            match definition.activation {
                Some(activation) => {
                    info!("type {} will be a top-level component", definition.name);
                    drafts.push(DescriptorDraft::top_level(synthesized, activation));
                }
                None => {
                    info!("type {} will be a dependent component", definition.name);
                    substitutions.record(
                        OriginalTypeId::new(&source.name, &definition.name),
                        synthesized.clone(),
                    );
                    drafts.push(DescriptorDraft::dependent(synthesized));
                }
            }
        }

        Ok(ModuleBatch {
            drafts,
            substitutions,
            skipped,
        })
    }

    fn run_activation(&mut self, report: &mut ReloadReport) {
        let generation = report.generation;
        let records = ActivationGate::run(&mut self.registry, self.stage.as_ref());

        for record in records {
            match record {
                ActivationRecord::Created {
                    source,
                    type_id,
                    instance_id,
                    ..
                } => {
                    report.created.push(type_id.clone());
                    self.emit(ReloadEvent::InstanceCreated {
                        source,
                        type_id,
                        instance_id,
                    });
                }
                ActivationRecord::AlreadyAlive {
                    source, type_id, ..
                } => {
                    report.diagnostics.push(Diagnostic::new(
                        generation,
                        Some(&source),
                        DiagnosticKind::ActivationGuard,
                        ActivationGuardViolation::AlreadyAlive(type_id.to_string()).to_string(),
                    ));
                }
                ActivationRecord::Failed {
                    source,
                    error,
                    ..
                } => {
                    report.diagnostics.push(Diagnostic::new(
                        generation,
                        Some(&source),
                        DiagnosticKind::Activation,
                        error.to_string(),
                    ));
                }
                ActivationRecord::Dormant { .. } | ActivationRecord::Spent { .. } => {}
            }
        }
    }

    /// Run the activation gate outside a reload cycle
    ///
    /// Creates instances for descriptors that became eligible, e.g. after a
    /// stage change. The generation does not change.
    pub fn activate_pending(&mut self) -> ReloadReport {
        let started = Instant::now();
        let mut report = ReloadReport::new(self.generation);
        self.run_activation(&mut report);
        report.alive = self.registry.alive_count();
        report.duration = started.elapsed();
        report
    }

    /// Notify the engine of a stage change
    ///
    /// Only re-runs the gate when `recheck_on_stage_change` is set.
    pub fn on_stage_changed(&mut self) -> Option<ReloadReport> {
        if !self.options.recheck_on_stage_change {
            debug!("Stage changed, activation re-check disabled");
            return None;
        }
        Some(self.activate_pending())
    }

    /// Destroy one live instance on the host's behalf
    pub fn delete_instance(&mut self, id: DescriptorId) -> Result<(), ReloadError> {
        let descriptor = self
            .registry
            .get_mut(id)
            .ok_or_else(|| {
                warn!("Delete requested for unknown descriptor {}", id);
                ReloadError::DescriptorNotFound(id)
            })?;
        if let Err(violation) = descriptor.delete_instance() {
            warn!("Rejected delete of {}: {}", descriptor.type_id(), violation);
            return Err(violation.into());
        }

        let event = ReloadEvent::InstanceDestroyed {
            source: descriptor.source_name().to_string(),
            type_id: descriptor.type_id().clone(),
        };
        self.emit(event);
        Ok(())
    }

    /// Destroy every live instance, load-once sources included, and clear the registry
    pub fn shutdown(&mut self) -> usize {
        let destroyed = self.registry.teardown_all();
        if !destroyed.is_empty() {
            info!("Shut down {} live instance(s)", destroyed.len());
        }
        self.registry.clear();
        destroyed.len()
    }
}

impl Drop for ReloadOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
