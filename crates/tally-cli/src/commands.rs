//! Command handlers. Each opens the vault, does its work and saves.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use serde_json::json;
use tracing::{info, warn};

use tally_core::tree::normalize_path;
use tally_vault::{Vault, VaultEvent, VaultLinkResolver, VaultWatcher};
use tally_report::{
    format_report, projects_report, stat_records, stats_report, tree_report, FolderProjection,
    OutputFormat, Project, ProjectManager, Report,
};

use crate::cli::{
    FormatArgs, GoalArgs, PolicyArgs, ProjectCommands, ProjectCreateArgs, StatsArgs, TitleArgs,
    UpdateArgs, WatchArgs,
};

fn print_report(report: &Report, format: OutputFormat) {
    let output = format_report(report, format);
    if output.ends_with('\n') {
        print!("{output}");
    } else {
        println!("{output}");
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Open the vault and bring it up to date with the disk.
pub fn open_scanned(vault: &Path) -> Result<Vault> {
    let mut vault =
        Vault::open(vault).with_context(|| format!("cannot open vault '{}'", vault.display()))?;
    for diagnostic in vault.diagnostics() {
        eprintln!("warning: {diagnostic}");
    }
    vault.scan()?;
    Ok(vault)
}

pub fn scan(vault: &Path, args: &FormatArgs) -> Result<()> {
    let mut vault = Vault::open(vault)?;
    let scan = vault.scan()?;
    vault.save()?;
    if args.format == OutputFormat::Json {
        return print_json(&scan);
    }
    let mut report = Report::new(&["added", "updated", "unchanged", "removed", "failed"]);
    report.push(vec![
        json!(scan.added),
        json!(scan.updated),
        json!(scan.unchanged),
        json!(scan.removed),
        json!(scan.failed),
    ]);
    print_report(&report, args.format);
    Ok(())
}

pub fn tree(vault: &Path, args: &FormatArgs) -> Result<()> {
    let vault = open_scanned(vault)?;
    vault.save()?;
    let projection = FolderProjection::from_tree(vault.tree(), vault.settings().record_everything);
    if args.format == OutputFormat::Json {
        return print_json(&projection);
    }
    print_report(&tree_report(&projection), args.format);
    Ok(())
}

pub fn stats(vault: &Path, args: &StatsArgs) -> Result<()> {
    let vault = open_scanned(vault)?;
    vault.save()?;
    let since = args
        .since
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.timestamp_millis())
                .with_context(|| format!("invalid --since time '{s}'"))
        })
        .transpose()?;
    let mut records = stat_records(vault.tree(), since);
    if let Some(path) = args.path.as_deref().map(normalize_path) {
        let prefix = format!("{path}/");
        records.retain(|r| r.path == path || r.path.starts_with(&prefix));
    }
    if args.output.format == OutputFormat::Json {
        return print_json(&records);
    }
    print_report(&stats_report(&records), args.output.format);
    Ok(())
}

/// Recount notes now, as if they had just been edited under watch.
pub fn update(vault: &Path, args: &UpdateArgs) -> Result<()> {
    let mut vault = Vault::open(vault)?;
    for path in &args.paths {
        vault.apply_event(VaultEvent::Changed(normalize_path(path)))?;
    }
    let mut report = vault.process_queue();
    while report.deferred {
        report = vault.process_queue();
    }
    vault.save()?;
    info!(processed = report.processed, failed = report.failed, "notes recounted");
    if report.failed > 0 {
        bail!("{} note(s) could not be read", report.failed);
    }
    Ok(())
}

pub fn watch(vault: &Path, args: &WatchArgs) -> Result<()> {
    let mut vault = open_scanned(vault)?;
    vault.save()?;
    let watcher = VaultWatcher::start(vault.root(), &vault.settings().excluded)?;
    let save_interval = Duration::from_secs(args.save_interval);
    let stop_after = args.run_for.map(Duration::from_secs);
    let started = Instant::now();
    let mut last_save = Instant::now();
    let mut dirty = false;
    info!(root = %vault.root().display(), "watching for changes");

    loop {
        if let Some(event) = watcher.recv_timeout(Duration::from_millis(250)) {
            let mut next = Some(event);
            while let Some(event) = next {
                if let Err(e) = vault.apply_event(event) {
                    warn!(error = %e, "event not applied");
                }
                dirty = true;
                next = watcher.try_recv();
            }
        }
        if !vault.engine().queue().is_empty() {
            vault.process_queue();
        }
        if dirty && last_save.elapsed() >= save_interval {
            vault.save()?;
            dirty = false;
            last_save = Instant::now();
        }
        if stop_after.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }

    while !vault.engine().queue().is_empty() {
        vault.process_queue();
    }
    vault.save()?;
    Ok(())
}

fn lookup(vault: &Vault, path: &str) -> Result<tally_core::NodeId> {
    let path = normalize_path(path);
    match vault.tree().lookup(&path) {
        Some(id) => Ok(id),
        None => bail!("'{path}' is not tracked"),
    }
}

pub fn goal(vault: &Path, args: &GoalArgs) -> Result<()> {
    let mut vault = open_scanned(vault)?;
    let id = lookup(&vault, &args.path)?;
    vault
        .engine_mut()
        .set_goal(id, args.scope.into(), args.words)?;
    vault.save()?;
    Ok(())
}

pub fn title(vault: &Path, args: &TitleArgs) -> Result<()> {
    let mut vault = open_scanned(vault)?;
    let id = lookup(&vault, &args.path)?;
    vault.engine_mut().set_title(id, args.title.clone());
    vault.save()?;
    Ok(())
}

pub fn policy(vault: &Path, args: &PolicyArgs) -> Result<()> {
    let mut vault = open_scanned(vault)?;
    let id = lookup(&vault, &args.path)?;
    vault.engine_mut().set_policy(id, args.policy)?;
    vault.save()?;
    Ok(())
}

fn create_project(vault: &Vault, args: &ProjectCreateArgs) -> Result<Project> {
    let m = &args.membership;
    let project = match (&m.folder, &m.tag, &m.index) {
        (Some(folder), _, _) => Project::folder(args.name.clone(), folder)?,
        (_, Some(tag), _) => Project::tag(args.name.clone(), tag)?,
        (_, _, Some(index)) => Project::file_index(args.name.clone(), vault.tree(), index)?,
        _ => bail!("a project needs --folder, --tag, or --index"),
    };
    Ok(project)
}

pub fn project(vault: &Path, command: &ProjectCommands) -> Result<()> {
    let mut vault = open_scanned(vault)?;
    let (mut projects, diagnostics) = ProjectManager::from_records(vault.projects(), vault.tree());
    for diagnostic in diagnostics {
        eprintln!("warning: {diagnostic}");
    }
    let links = VaultLinkResolver::new(vault.root());

    match command {
        ProjectCommands::Create(args) => {
            let project = create_project(&vault, args)?;
            projects.create(project)?;
        }
        ProjectCommands::List(args) => {
            let report = projects_report(&mut projects, vault.tree(), &links);
            print_report(&report, args.format);
        }
        ProjectCommands::Show(args) => {
            let Some(project) = projects.get_mut(&args.name) else {
                bail!("no project named '{}'", args.name);
            };
            project.update_files(vault.tree(), &links);
            let mut report = Report::new(&["path", "words", "goal", "progress"]);
            for file in project.files().iter().filter_map(|id| vault.tree().file(*id)) {
                let goal = vault.tree().file_goal(file.id);
                let progress = goal
                    .filter(|g| *g > 0)
                    .map(|g| format!("{:.0}%", file.word_count as f64 * 100.0 / g as f64));
                report.push(vec![
                    json!(file.path),
                    json!(file.word_count),
                    json!(goal),
                    json!(progress),
                ]);
            }
            report.push(vec![
                json!("total"),
                json!(project.total_words(vault.tree())),
            ]);
            print_report(&report, args.output.format);
        }
        ProjectCommands::Rename { name, new_name } => projects.rename(name, new_name)?,
        ProjectCommands::Delete { name } => {
            projects.delete(name)?;
        }
    }

    vault.set_projects(projects.records(vault.tree()));
    vault.save()?;
    Ok(())
}
