//! CLI command implementations

pub mod console;
pub mod init;
pub mod reload;

use hotswap_kernel::Stage;
use hotswap_kernel::config::ReloadSettings;

/// Apply a `--stage` override to loaded settings
pub(crate) fn with_stage(mut settings: ReloadSettings, stage: Option<&str>) -> ReloadSettings {
    if let Some(stage) = stage {
        // Stage parsing is infallible, unknown names become custom stages
        settings.hot_reload.initial_stage = stage.parse().unwrap_or(Stage::Loading);
    }
    settings
}
