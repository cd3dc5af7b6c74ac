//! Module byte loaders
//!
//! Reads a module source's bytes for one generation. The rename pipeline
//! disassembles the module, rewrites its self-declared name to a
//! generation-unique one and reassembles it, so a host caching loaded modules
//! by name never hands back a previous generation.

use hotswap_kernel::Generation;
use hotswap_kernel::config::ToolSettings;
use regex::{Captures, Regex};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Module load error types
#[derive(Debug, thiserror::Error)]
pub enum ModuleLoadError {
    #[error("File does not exist: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tool {tool} not found in {dir}")]
    ToolNotFound { tool: String, dir: String },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Expected pipeline output is missing: {0}")]
    MissingOutput(String),

    #[error("Rename pipeline error: {0}")]
    Pipeline(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Failed to load library: {0}")]
    LibraryLoad(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
}

/// Produces the bytes of a module for a given generation
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path, generation: Generation) -> Result<Vec<u8>, ModuleLoadError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Reads module bytes verbatim
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLoader;

impl ModuleLoader for DirectLoader {
    fn load(&self, path: &Path, _generation: Generation) -> Result<Vec<u8>, ModuleLoadError> {
        if !path.is_file() {
            return Err(ModuleLoadError::NotFound(path.display().to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Disassemble, rename, reassemble
#[derive(Debug, Clone)]
pub struct RenamePipelineLoader {
    tools: ToolSettings,
    disassembler_dir: PathBuf,
    assembler_dir: PathBuf,
}

impl RenamePipelineLoader {
    /// `None` unless both tool directories are configured
    pub fn from_settings(tools: &ToolSettings) -> Option<Self> {
        Some(Self {
            disassembler_dir: tools.disassembler_dir.clone()?,
            assembler_dir: tools.assembler_dir.clone()?,
            tools: tools.clone(),
        })
    }

    /// Name a module carries in `generation`
    pub fn renamed_module_name(stem: &str, generation: Generation) -> String {
        format!("{}v{}", stem, generation)
    }

    /// Rewrite every `<directive> <old_name>` declaration to `new_name`
    ///
    /// Returns the rewritten text and the number of declarations replaced.
    pub fn rename_module(
        text: &str,
        directive: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(String, usize), ModuleLoadError> {
        let pattern = format!(
            r"{}(\s+){}\b",
            regex::escape(directive),
            regex::escape(old_name)
        );
        let re = Regex::new(&pattern).map_err(|e| ModuleLoadError::Pipeline(e.to_string()))?;

        let count = re.find_iter(text).count();
        let renamed = re.replace_all(text, |caps: &Captures| {
            format!("{}{}{}", directive, &caps[1], new_name)
        });
        Ok((renamed.into_owned(), count))
    }

    fn resolve_tool(tool: &str, dir: &Path) -> Result<PathBuf, ModuleLoadError> {
        which::which_in(tool, Some(dir), dir).map_err(|_| ModuleLoadError::ToolNotFound {
            tool: tool.to_string(),
            dir: dir.display().to_string(),
        })
    }

    fn run_tool(
        tool: &Path,
        template: &[String],
        input: &Path,
        output: &Path,
    ) -> Result<(), ModuleLoadError> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let args: Vec<String> = template
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect();

        debug!("Running {} {:?}", tool.display(), args);
        let result = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .output()?;

        if !result.status.success() {
            return Err(ModuleLoadError::ToolFailed {
                tool: tool.display().to_string(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl ModuleLoader for RenamePipelineLoader {
    fn load(&self, path: &Path, generation: Generation) -> Result<Vec<u8>, ModuleLoadError> {
        if !path.is_file() {
            return Err(ModuleLoadError::NotFound(path.display().to_string()));
        }

        let disassembler = Self::resolve_tool(&self.tools.disassembler, &self.disassembler_dir)?;
        let assembler = Self::resolve_tool(&self.tools.assembler, &self.assembler_dir)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| ModuleLoadError::Pipeline(format!("no file name in {}", path.display())))?;
        let new_name = Self::renamed_module_name(&stem, generation);
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dll".to_string());

        // Intermediates live next to the module and go away with the directory
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        let workdir = tempfile::Builder::new()
            .prefix(".hotswap-")
            .tempdir_in(parent)
            .or_else(|_| tempfile::tempdir())?;

        let disassembly = workdir
            .path()
            .join(format!("{}.{}", new_name, self.tools.disassembly_extension));
        let reassembled = workdir.path().join(format!("{}.{}", new_name, extension));

        Self::run_tool(
            &disassembler,
            &self.tools.disassemble_args,
            path,
            &disassembly,
        )?;
        if !disassembly.is_file() {
            return Err(ModuleLoadError::MissingOutput(disassembly.display().to_string()));
        }

        let text = String::from_utf8_lossy(&fs::read(&disassembly)?).into_owned();
        let (renamed, count) =
            Self::rename_module(&text, &self.tools.name_directive, &stem, &new_name)?;
        if count == 0 {
            warn!(
                "No `{} {}` declaration found, module keeps its name",
                self.tools.name_directive, stem
            );
        } else {
            debug!("Renamed module {} to {}", stem, new_name);
        }
        fs::write(&disassembly, renamed)?;

        Self::run_tool(
            &assembler,
            &self.tools.assemble_args,
            &disassembly,
            &reassembled,
        )?;
        if !reassembled.is_file() {
            return Err(ModuleLoadError::MissingOutput(reassembled.display().to_string()));
        }

        Ok(fs::read(&reassembled)?)
    }

    fn name(&self) -> &'static str {
        "rename-pipeline"
    }
}

/// Pick the loader the tool settings call for
pub fn loader_for(tools: &ToolSettings) -> Box<dyn ModuleLoader> {
    match RenamePipelineLoader::from_settings(tools) {
        Some(loader) => {
            info!("Disassembler and assembler locations are set, modules are renamed per generation");
            Box::new(loader)
        }
        None => Box::new(DirectLoader),
    }
}
