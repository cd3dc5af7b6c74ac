use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::plugin::{ModuleSource, Stage};

#[cfg(feature = "config")]
use super::{ConfigError, ENV_PREFIX, load_with_env};
#[cfg(feature = "config")]
use crate::error::{HotswapError, HotswapResult};
#[cfg(feature = "config")]
use error_stack::{Report, ResultExt};
#[cfg(feature = "config")]
use tracing::{error, info};

/// Everything the reload engine reads at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReloadSettings {
    /// Module sources, in processing order
    #[serde(default)]
    pub sources: Vec<ModuleSource>,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub hot_reload: HotReloadOptions,
}

/// External tools used by the rename pipeline
///
/// The pipeline only runs when both tool directories are set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disassembler_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembler_dir: Option<PathBuf>,
    #[serde(default = "default_disassembler")]
    pub disassembler: String,
    #[serde(default = "default_assembler")]
    pub assembler: String,
    /// Argument template; `{input}` and `{output}` are replaced per run
    #[serde(default = "default_disassemble_args")]
    pub disassemble_args: Vec<String>,
    #[serde(default = "default_assemble_args")]
    pub assemble_args: Vec<String>,
    /// Directive introducing the module's self-declared name in disassembled text
    #[serde(default = "default_name_directive")]
    pub name_directive: String,
    /// Extension of the intermediate disassembly file
    #[serde(default = "default_disassembly_extension")]
    pub disassembly_extension: String,
}

fn default_disassembler() -> String {
    "ildasm".to_string()
}

fn default_assembler() -> String {
    "ilasm".to_string()
}

fn default_disassemble_args() -> Vec<String> {
    vec![
        "{input}".to_string(),
        "/output={output}".to_string(),
        "/nobar".to_string(),
    ]
}

fn default_assemble_args() -> Vec<String> {
    vec![
        "{input}".to_string(),
        "/dll".to_string(),
        "/output={output}".to_string(),
    ]
}

fn default_name_directive() -> String {
    ".assembly".to_string()
}

fn default_disassembly_extension() -> String {
    "decompiled".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            disassembler_dir: None,
            assembler_dir: None,
            disassembler: default_disassembler(),
            assembler: default_assembler(),
            disassemble_args: default_disassemble_args(),
            assemble_args: default_assemble_args(),
            name_directive: default_name_directive(),
            disassembly_extension: default_disassembly_extension(),
        }
    }
}

impl ToolSettings {
    /// Both tool locations are configured
    pub fn pipeline_enabled(&self) -> bool {
        self.disassembler_dir.is_some() && self.assembler_dir.is_some()
    }

    pub fn with_tool_dirs<P: AsRef<Path>>(mut self, disassembler_dir: P, assembler_dir: P) -> Self {
        self.disassembler_dir = Some(disassembler_dir.as_ref().to_path_buf());
        self.assembler_dir = Some(assembler_dir.as_ref().to_path_buf());
        self
    }
}

/// Engine and trigger behaviour switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotReloadOptions {
    /// Run the activation gate on stage changes between reloads
    #[serde(default)]
    pub recheck_on_stage_change: bool,
    /// Key combination toggling the trigger window
    #[serde(default = "default_toggle_key")]
    pub toggle_key: String,
    #[serde(default)]
    pub initial_stage: Stage,
}

fn default_toggle_key() -> String {
    "alt+p".to_string()
}

impl Default for HotReloadOptions {
    fn default() -> Self {
        Self {
            recheck_on_stage_change: false,
            toggle_key: default_toggle_key(),
            initial_stage: Stage::default(),
        }
    }
}

impl ReloadSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: ModuleSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_tools(mut self, tools: ToolSettings) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_options(mut self, options: HotReloadOptions) -> Self {
        self.hot_reload = options;
        self
    }

    /// Drop unnamed sources and later duplicates of an already listed name
    pub fn normalized(mut self) -> Self {
        let mut seen = HashSet::new();
        self.sources.retain(|source| {
            if source.name.trim().is_empty() {
                warn!("Ignoring module source without a name: {:?}", source.path);
                return false;
            }
            if !seen.insert(source.name.clone()) {
                warn!("Ignoring duplicate module source: {}", source.name);
                return false;
            }
            true
        });
        self
    }

    /// Resolve relative source and tool paths against `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        for source in &mut self.sources {
            resolve(&mut source.path);
        }
        if let Some(dir) = self.tools.disassembler_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.tools.assembler_dir.as_mut() {
            resolve(dir);
        }
        self
    }
}

#[cfg(feature = "config")]
impl ReloadSettings {
    /// Load settings from a file, applying `HOTSWAP_` environment overrides
    pub fn load(path: &Path) -> HotswapResult<Self> {
        let path_display = path.display().to_string();
        if !path.is_file() {
            return Err(Report::new(HotswapError::from(ConfigError::NotFound(
                path_display,
            ))));
        }

        let settings: ReloadSettings = load_with_env(&path_display, ENV_PREFIX)
            .map_err(|e| Report::new(HotswapError::from(e)))
            .attach(format!("loading reload settings from {}", path_display))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let settings = settings.resolve_paths(base).normalized();

        info!(
            "Loaded {} module source(s) from {}",
            settings.sources.len(),
            path_display
        );
        Ok(settings)
    }

    /// Load settings, falling back to an empty source list on any error
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(report) => {
                error!("Failed to load reload settings, continuing without sources: {report:?}");
                Self::default()
            }
        }
    }

    /// Render as TOML, e.g. to write a starter settings file
    pub fn to_toml(&self) -> HotswapResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Report::new(HotswapError::from(ConfigError::Serialization(e.to_string()))))
            .attach("rendering reload settings as TOML")
    }

    /// Starter settings with one reloadable source
    pub fn template() -> Self {
        Self::new().with_source(
            ModuleSource::new("example", "plugins/libexample.so").with_partial_failure(true),
        )
    }
}
