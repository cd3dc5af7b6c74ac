//! `hotswap init` command implementation

use colored::Colorize;
use hotswap_kernel::config::ReloadSettings;
use std::path::Path;

/// Execute the `hotswap init` command
pub fn run(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }

    let rendered = ReloadSettings::template()
        .to_toml()
        .map_err(|report| anyhow::anyhow!("{report:?}"))?;
    std::fs::write(path, rendered)?;

    println!("{} Wrote {}", "✓".green(), path.display());
    println!("  List your modules under [[sources]] and run `hotswap` to start the console.");
    Ok(())
}
