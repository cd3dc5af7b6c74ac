//! `hotswap reload` command implementation

use super::with_stage;
use crate::output;
use hotswap_kernel::config::ReloadSettings;
use hotswap_plugins::hot_reload::{NativeLinker, ReloadOrchestrator};
use std::path::Path;

/// Execute the `hotswap reload` command: one cycle, then shut down
pub fn run(config: &Path, stage: Option<&str>, json: bool) -> anyhow::Result<()> {
    let settings = with_stage(ReloadSettings::load_or_default(config), stage);

    let mut orchestrator = ReloadOrchestrator::new(settings, NativeLinker::new());
    let report = orchestrator.reload();

    if json {
        println!("{}", report.to_json()?);
    } else {
        output::print_report(&report);
    }

    orchestrator.shutdown();
    Ok(())
}
