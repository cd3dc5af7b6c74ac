//! Report and registry rendering for CLI output

use colored::Colorize;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use hotswap_kernel::ModuleSource;
use hotswap_plugins::hot_reload::{DescriptorRegistry, ReloadReport, Role, SourceOutcome};
use std::sync::Arc;

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Per-source outcome of a cycle
pub fn report_table(report: &ReloadReport) -> Table {
    let mut table = new_table(&["Source", "Outcome", "Top-level", "Dependent", "Torn down"]);

    for source in &report.sources {
        let (outcome, top_level, dependent): (Cell, String, String) = match &source.outcome {
            SourceOutcome::Skipped => (Cell::new("skipped").fg(Color::DarkGrey), "-".into(), "-".into()),
            SourceOutcome::Loaded {
                top_level,
                dependent,
                skipped,
            } => {
                let label = if *skipped > 0 {
                    format!("loaded ({} skipped)", skipped)
                } else {
                    "loaded".to_string()
                };
                (
                    Cell::new(label).fg(Color::Green),
                    top_level.to_string(),
                    dependent.to_string(),
                )
            }
            SourceOutcome::Failed { .. } => (Cell::new("failed").fg(Color::Red), "-".into(), "-".into()),
            SourceOutcome::Aborted { .. } => {
                (Cell::new("aborted").fg(Color::Yellow), "-".into(), "-".into())
            }
        };

        table.add_row(vec![
            Cell::new(&source.name),
            outcome,
            Cell::new(top_level),
            Cell::new(dependent),
            Cell::new(source.torn_down),
        ]);
    }
    table
}

/// Every registered descriptor and its instance state
pub fn status_table(registry: &DescriptorRegistry) -> Table {
    let mut table = new_table(&["Id", "Source", "Type", "Role", "Alive", "Fired", "Instance"]);

    for descriptor in registry.iter() {
        let role = match descriptor.role() {
            Role::TopLevel => "top-level",
            Role::Dependent => "dependent",
        };
        let alive = if descriptor.is_alive() {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no")
        };
        let instance = descriptor
            .instance()
            .map(|i| i.instance_id().to_string())
            .unwrap_or_default();

        table.add_row(vec![
            Cell::new(descriptor.id()),
            Cell::new(descriptor.source_name()),
            Cell::new(descriptor.type_id().name()),
            Cell::new(role),
            alive,
            Cell::new(if descriptor.fired() { "yes" } else { "no" }),
            Cell::new(instance),
        ]);
    }
    table
}

/// Configured sources, as shown in the trigger window
pub fn sources_table(sources: &[Arc<ModuleSource>]) -> Table {
    let mut table = new_table(&["Source", "Path", "Load once", "Partial failure"]);
    for source in sources {
        table.add_row(vec![
            Cell::new(&source.name),
            Cell::new(source.path.display()),
            Cell::new(source.load_once),
            Cell::new(source.allow_partial_failure),
        ]);
    }
    table
}

/// Summary line, report table and diagnostics
pub fn print_report(report: &ReloadReport) {
    println!(
        "{} Generation {} in {:?}: {} created, {} destroyed, {} alive",
        "→".green(),
        report.generation.to_string().bold(),
        report.duration,
        report.created.len(),
        report.destroyed.len(),
        report.alive
    );
    if !report.sources.is_empty() {
        println!("{}", report_table(report));
    }
    for diagnostic in &report.diagnostics {
        println!("  {} {}", "!".yellow(), diagnostic);
    }
}
