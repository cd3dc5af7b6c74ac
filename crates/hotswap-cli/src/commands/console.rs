//! `hotswap console` command implementation
//!
//! Line-based stand-in for the in-host trigger window: each typed line is a
//! command, and typing the toggle chord (`alt+p` by default) shows or hides
//! the source panel.

use super::with_stage;
use crate::output;
use crate::window::{KeyChord, TriggerWindow};
use colored::Colorize;
use hotswap_kernel::config::ReloadSettings;
use hotswap_kernel::{ReloadEvent, Stage};
use hotswap_plugins::hot_reload::{NativeLinker, ReloadOrchestrator, SharedStage};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Reload,
    Stage(Stage),
    Status,
    Toggle,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str, toggle: &KeyChord) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleCommand::Empty;
        }
        if toggle.matches(line) {
            return ConsoleCommand::Toggle;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        match (command.to_lowercase().as_str(), rest) {
            ("reload" | "r", _) => ConsoleCommand::Reload,
            ("stage", "") => ConsoleCommand::Unknown(line.to_string()),
            ("stage", name) => ConsoleCommand::Stage(name.parse().unwrap_or(Stage::Loading)),
            ("status" | "s", _) => ConsoleCommand::Status,
            ("toggle", _) => ConsoleCommand::Toggle,
            ("help" | "?", _) => ConsoleCommand::Help,
            ("quit" | "exit" | "q", _) => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(line.to_string()),
        }
    }
}

fn print_help(window: &TriggerWindow) {
    println!("  reload | r        run a reload cycle");
    println!("  stage <name>      switch the host stage");
    println!("  status | s        list registered types");
    println!("  {:<17} show or hide the source panel", window.chord());
    println!("  quit | q          shut down and exit");
}

fn print_event(event: &ReloadEvent) {
    match event {
        ReloadEvent::InstanceCreated { type_id, .. } => {
            println!("  {} {}", "+".green(), type_id)
        }
        ReloadEvent::InstanceDestroyed { type_id, .. } => {
            println!("  {} {}", "-".red(), type_id)
        }
        ReloadEvent::SourceFailed { source, error } => {
            println!("  {} {}: {}", "✗".red(), source, error)
        }
        ReloadEvent::TypeSkipped {
            source,
            type_name,
            reason,
        } => println!("  {} {}::{} skipped: {}", "!".yellow(), source, type_name, reason),
        _ => {}
    }
}

/// Execute the `hotswap console` command
pub async fn run(config: &Path, stage: Option<&str>) -> anyhow::Result<()> {
    let settings = with_stage(ReloadSettings::load_or_default(config), stage);
    let chord = KeyChord::parse(&settings.hot_reload.toggle_key).unwrap_or_else(|e| {
        warn!("Invalid toggle key, using alt+p: {}", e);
        KeyChord::default()
    });

    let shared_stage = SharedStage::new(settings.hot_reload.initial_stage.clone());
    let mut orchestrator = ReloadOrchestrator::new(settings, NativeLinker::new())
        .with_stage_context(Arc::new(shared_stage.clone()));
    let mut events = orchestrator.subscribe();
    let mut window = TriggerWindow::new(chord);

    println!(
        "{} Hotswap console, {} source(s), stage {}, {} loader",
        "→".green(),
        orchestrator.sources().len(),
        shared_stage.get().to_string().bold(),
        orchestrator.loader_name()
    );
    println!("{}", output::sources_table(orchestrator.sources()));

    // Startup load, the first generation
    let report = orchestrator.reload();
    output::print_report(&report);
    print_help(&window);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match ConsoleCommand::parse(&line, window.chord()) {
                    ConsoleCommand::Reload => {
                        let report = orchestrator.reload();
                        output::print_report(&report);
                    }
                    ConsoleCommand::Stage(stage) => {
                        let previous = shared_stage.set(stage.clone());
                        println!("{} Stage {} -> {}", "→".green(), previous, stage.to_string().bold());
                        if let Some(report) = orchestrator.on_stage_changed() {
                            output::print_report(&report);
                        }
                    }
                    ConsoleCommand::Status => {
                        println!("{}", output::status_table(orchestrator.registry()));
                    }
                    ConsoleCommand::Toggle => {
                        if window.toggle() {
                            println!("{}", output::sources_table(orchestrator.sources()));
                            println!("  Type `reload` to reload all sources.");
                        } else {
                            println!("  Panel hidden, {} to show it again.", window.chord());
                        }
                    }
                    ConsoleCommand::Help => print_help(&window),
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Empty => {}
                    ConsoleCommand::Unknown(input) => {
                        println!("  {} unknown command `{}`, try `help`", "?".yellow(), input);
                    }
                }
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} reload event(s)", missed),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    let destroyed = orchestrator.shutdown();
    println!("{} Shut down, {} instance(s) destroyed", "✓".green(), destroyed);
    Ok(())
}
