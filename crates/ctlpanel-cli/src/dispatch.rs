use anyhow::{Context, Result, bail};
use comfy_table::{Cell, ContentArrangement, Table};
use ctlpanel_app::{App, ControlPanel};
use ctlpanel_core::partition::{SectionNode, StepKind};
use ctlpanel_core::store::Control;
use ctlpanel_core::{ControlId, ControlStore};
use tracing::info;

use crate::cli::{Cli, Command, PanelArgs};
use crate::diagnostics::{DiagnosticsSession, failure_trail, panel_trail};

pub fn run_with_deps(cli: Cli, app: &App, diagnostics: &DiagnosticsSession) -> Result<()> {
    match cli.command {
        Command::Inspect(args) => run_inspect_command(app, diagnostics, &args),
        Command::Check(args) => run_check_command(app, diagnostics, &args),
        Command::Summary(args) => run_summary_command(app, diagnostics, &args),
        Command::Snapshot(args) => run_snapshot_command(app, diagnostics, &args),
    }
}

fn open_panel(app: &App, diagnostics: &DiagnosticsSession, args: &PanelArgs) -> Result<ControlPanel> {
    let mut panel = app.open_panel(&args.file)?;
    // Settle whatever the detached collaborator already answered.
    panel.on_tick();
    app.apply_edits(&mut panel, &args.edits)?;
    info!(file = %args.file.display(), edits = args.edits.len(), "opened control data");
    diagnostics.record_all(&panel_trail(&args.file, &args.edits, &panel));
    Ok(panel)
}

fn run_inspect_command(app: &App, diagnostics: &DiagnosticsSession, args: &PanelArgs) -> Result<()> {
    let panel = open_panel(app, diagnostics, args)?;
    let store = panel.store();
    let partition = panel.partition();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Step", "Section", "Control", "Type", "Value", "Notes"]);

    add_section_rows(&mut table, store, "-", &partition.sections);
    for step in &partition.steps {
        let title = store
            .get(step.title)
            .map(|control| match step.kind {
                StepKind::Step => control.label().to_string(),
                StepKind::Review => format!("{} (review)", control.label()),
            })
            .unwrap_or_default();
        if step.sections.is_empty() {
            table.add_row(vec![title.as_str(), "-", "-", "-", "", ""]);
            continue;
        }
        add_section_rows(&mut table, store, &title, &step.sections);
    }

    println!("{table}");
    if partition.is_flat_form() {
        println!("flat form: no steps declared");
    } else {
        println!("{} step(s)", partition.steps.len());
    }
    for key in &partition.duplicate_keys {
        println!("duplicate control id: {key}");
    }
    Ok(())
}

fn add_section_rows(table: &mut Table, store: &ControlStore, step: &str, sections: &[SectionNode]) {
    for section in sections {
        let title = section
            .title
            .and_then(|id| store.get(id))
            .map(|control| control.label().to_string())
            .unwrap_or_else(|| "-".to_string());
        for id in store.expand(&section.content) {
            if store.is_hidden(id) {
                continue;
            }
            let Some(control) = store.get(id) else {
                continue;
            };
            table.add_row(vec![
                Cell::new(step),
                Cell::new(title.as_str()),
                Cell::new(display_path(store, id)),
                Cell::new(control.kind.as_str()),
                Cell::new(control.active.as_text()),
                Cell::new(notes(control)),
            ]);
        }
    }
}

fn notes(control: &Control) -> String {
    let mut notes = Vec::new();
    if control.disabled {
        notes.push("disabled".to_string());
    }
    if control.pause_until_selected && !control.active.is_truthy() {
        notes.push("gates the rest".to_string());
    }
    if let Some(placeholder) = control.placeholder() {
        notes.push(format!("unavailable: {placeholder}"));
    } else if control.fetch_state.is_loading() {
        notes.push("loading".to_string());
    }
    if let Some(exception) = &control.exception {
        notes.push(exception.clone());
    }
    notes.join("; ")
}

fn run_check_command(app: &App, diagnostics: &DiagnosticsSession, args: &PanelArgs) -> Result<()> {
    let mut panel = open_panel(app, diagnostics, args)?;
    let failures = panel.validate_all();
    if failures.is_empty() {
        println!("all controls valid");
        return Ok(());
    }
    diagnostics.record_all(&failure_trail(&panel, &failures));

    let store = panel.store();
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Control", "Type", "Exception"]);
    for id in &failures {
        let Some(control) = store.get(*id) else {
            continue;
        };
        table.add_row(vec![
            Cell::new(display_path(store, *id)),
            Cell::new(control.kind.as_str()),
            Cell::new(control.exception.as_deref().unwrap_or_default()),
        ]);
    }
    println!("{table}");
    bail!("{} control(s) failed validation", failures.len())
}

fn run_summary_command(app: &App, diagnostics: &DiagnosticsSession, args: &PanelArgs) -> Result<()> {
    let panel = open_panel(app, diagnostics, args)?;
    for line in panel.summarize() {
        let indent = "  ".repeat(line.depth);
        let marker = line
            .exception
            .map(|exception| format!("  [{exception}]"))
            .unwrap_or_default();
        if line.value.is_empty() {
            println!("{indent}{}{marker}", line.label);
        } else {
            println!("{indent}{}: {}{marker}", line.label, line.value);
        }
    }
    Ok(())
}

fn run_snapshot_command(app: &App, diagnostics: &DiagnosticsSession, args: &PanelArgs) -> Result<()> {
    let panel = open_panel(app, diagnostics, args)?;
    let rendered = panel
        .snapshot()
        .to_toml()
        .context("failed to render snapshot")?;
    print!("{rendered}");
    Ok(())
}

fn display_path(store: &ControlStore, id: ControlId) -> String {
    store.path_of(id).unwrap_or_else(|| id.to_string())
}
