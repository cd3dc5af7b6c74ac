//! Reload cycle reports

use hotswap_kernel::{Generation, SynthesizedTypeId};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Category of a non-fatal problem found during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Loading or linking a module source failed
    ModuleLoad,
    /// A type could not be synthesized
    Synthesis,
    /// A declared type is not reloadable
    CapabilityMismatch,
    /// Create on an alive slot or delete on a dead one
    ActivationGuard,
    /// Constructing or awaking an instance failed
    Activation,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DiagnosticKind::ModuleLoad => "module-load",
            DiagnosticKind::Synthesis => "synthesis",
            DiagnosticKind::CapabilityMismatch => "capability",
            DiagnosticKind::ActivationGuard => "guard",
            DiagnosticKind::Activation => "activation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub generation: Generation,
    pub source: Option<String>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        generation: Generation,
        source: Option<&str>,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            generation,
            source: source.map(str::to_string),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(
                f,
                "[g{} {} {}] {}",
                self.generation, self.kind, source, self.message
            ),
            None => write!(f, "[g{} {}] {}", self.generation, self.kind, self.message),
        }
    }
}

/// How one source fared in a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// Load-once source after the first cycle
    Skipped,
    Loaded {
        top_level: usize,
        dependent: usize,
        /// Types left out by capability mismatch or partial failure
        skipped: usize,
    },
    /// The module could not be loaded or linked
    Failed { error: String },
    /// A type failed synthesis and partial failure is not allowed
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub outcome: SourceOutcome,
    /// Instances destroyed before the source was reloaded
    pub torn_down: usize,
    /// Descriptors dropped before the source was reloaded
    pub discarded: usize,
    /// SHA-256 of the loaded module
    pub digest: Option<String>,
}

impl SourceReport {
    pub fn new(name: &str, outcome: SourceOutcome) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            torn_down: 0,
            discarded: 0,
            digest: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Loaded { .. })
    }
}

/// Summary of one reload cycle or activation pass
#[derive(Debug, Clone, Serialize)]
pub struct ReloadReport {
    pub generation: Generation,
    /// In processing order
    pub sources: Vec<SourceReport>,
    pub created: Vec<SynthesizedTypeId>,
    pub destroyed: Vec<SynthesizedTypeId>,
    pub diagnostics: Vec<Diagnostic>,
    /// Live instances once the cycle finished
    pub alive: usize,
    pub duration: Duration,
}

impl ReloadReport {
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            sources: Vec::new(),
            created: Vec::new(),
            destroyed: Vec::new(),
            diagnostics: Vec::new(),
            alive: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn has_diagnostics(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
