use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use forge_logging::forge_info;
use pocforge_core::{AppState, Msg, Phase, TemplateInput};
use pocforge_engine::{
    Catalog, CatalogEntry, ChatCompletionsClient, CollectionPlan, Collector, EntryUpdate,
    FetchSettings, Generator, NewEntry, ScanLine, ScanRequest, ScanRunner, SearchQuery,
    TemplateStore,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::{CatalogCommand, Cli, Command, ConfigCommand, ScanArgs};
use crate::platform::app::{forward_ctrl_c, Pipeline};
use crate::platform::config::{AppConfig, API_KEY_ENV};
use crate::platform::effects::EngineParts;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let load = || AppConfig::load_with_env(&cli.config);
    match cli.command {
        Command::Collect { cve_id, output } => collect(&load()?, cve_id, output),
        Command::Generate {
            cve_id,
            prompt_file,
            catalog,
        } => generate(&load()?, cve_id, prompt_file, catalog),
        Command::Assemble { input, catalog } => assemble(&load()?, &input, catalog),
        Command::Catalog(cmd) => catalog_command(&load()?, cmd),
        Command::Scan(args) => scan(&load()?, args),
        Command::Config(cmd) => config_command(&cli.config, cmd),
    }
}

fn engine_parts(config: &AppConfig, with_catalog: bool) -> anyhow::Result<EngineParts> {
    let plan = CollectionPlan::standard(FetchSettings::default(), config.collector_settings());
    let client =
        ChatCompletionsClient::new(config.llm_settings()).context("building model client")?;
    let catalog = if with_catalog {
        Some(open_catalog(config)?)
    } else {
        None
    };
    Ok(EngineParts {
        collector: Collector::new(plan),
        generator: Generator::new(Arc::new(client)),
        store: TemplateStore::new(config.poc_dir.clone()),
        catalog,
    })
}

fn open_catalog(config: &AppConfig) -> anyhow::Result<Catalog> {
    Catalog::open(config.catalog_path.clone())
        .with_context(|| format!("opening catalog {}", config.catalog_path.display()))
}

fn run_pipeline(parts: EngineParts, initial: Vec<Msg>) -> AppState {
    let (pipeline, msg_tx) = Pipeline::new(parts, io::stderr());
    forward_ctrl_c(msg_tx);
    pipeline.run(initial)
}

/// Maps a settled run that did not reach `wanted` to an error, printing any
/// recoverable raw text to stdout first.
fn expect_phase(state: &AppState, wanted: Phase) -> anyhow::Result<()> {
    match state.phase() {
        phase if phase == wanted => Ok(()),
        Phase::Cancelled => bail!("cancelled by user"),
        Phase::Failed => {
            let err = state.view().last_error;
            if let Some(raw) = err.as_ref().and_then(|e| e.raw.as_deref()) {
                println!("{raw}");
            }
            bail!(err.map(|e| e.message).unwrap_or_else(|| "run failed".to_string()))
        }
        other => bail!("run stopped in phase {other:?}"),
    }
}

fn collect(config: &AppConfig, cve_id: String, output: Option<PathBuf>) -> anyhow::Result<()> {
    let state = run_pipeline(
        engine_parts(config, false)?,
        vec![Msg::CveSubmitted {
            cve_id,
            generate: false,
        }],
    );
    expect_phase(&state, Phase::Collected)?;
    let content = state
        .collected()
        .map(|result| result.content.as_str())
        .unwrap_or_default();
    match output {
        Some(path) => {
            pocforge_engine::write_atomic(&path, content)?;
            forge_info!("collected text written to {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

fn generate(
    config: &AppConfig,
    cve_id: String,
    prompt_file: Option<PathBuf>,
    catalog: bool,
) -> anyhow::Result<()> {
    if config.api.key.trim().is_empty() {
        bail!("API key not set; run `pocforge config set-key <KEY>` or set {API_KEY_ENV}");
    }
    let mut initial = Vec::new();
    if let Some(path) = prompt_file {
        let prompt = fs::read_to_string(&path)
            .with_context(|| format!("reading prompt {}", path.display()))?;
        initial.push(Msg::PromptEdited(prompt));
    }
    initial.push(Msg::SaveToCatalog(catalog));
    initial.push(Msg::CveSubmitted {
        cve_id,
        generate: true,
    });

    let state = run_pipeline(engine_parts(config, catalog)?, initial);
    expect_phase(&state, Phase::Generated)?;
    let view = state.view();
    if let Some(path) = &view.template_path {
        println!("{}", path.display());
    }
    match view.catalog_warning {
        Some(warning) => bail!("catalog entry not saved: {warning}"),
        None => Ok(()),
    }
}

fn assemble(config: &AppConfig, input: &Path, catalog: bool) -> anyhow::Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let fields = TemplateInput::from_json(&text)
        .with_context(|| format!("parsing {}", input.display()))?;
    let now = Local::now().naive_local();
    let assembled = TemplateStore::new(config.poc_dir.clone()).assemble(fields, now)?;
    println!("{}", assembled.path.display());

    if catalog {
        let fields = assembled.fields;
        let id = open_catalog(config)?.add(
            NewEntry {
                id: Some(fields.id),
                name: fields.name,
                path: assembled.path,
                description: fields.description,
                severity: fields.severity,
                tags: fields.tags,
                references: fields.references,
            },
            now,
        )?;
        eprintln!("catalog entry {id} saved");
    }
    Ok(())
}

fn catalog_command(config: &AppConfig, cmd: CatalogCommand) -> anyhow::Result<()> {
    let catalog = open_catalog(config)?;
    let now = Local::now().naive_local();
    match cmd {
        CatalogCommand::List => print_entries(&catalog.list()?),
        CatalogCommand::Search {
            keyword,
            tags,
            severity,
        } => print_entries(&catalog.search(&SearchQuery {
            keyword,
            tags,
            severity,
        })?),
        CatalogCommand::Show { id } => match catalog.get(&id)? {
            Some(entry) => {
                for line in entry_details(&entry) {
                    println!("{line}");
                }
            }
            None => bail!("no catalog entry {id}"),
        },
        CatalogCommand::Update {
            id,
            name,
            path,
            description,
            severity,
            tags,
            references,
        } => {
            let update = EntryUpdate {
                name,
                path,
                description,
                severity,
                tags,
                references,
            };
            if update.is_empty() {
                bail!("nothing to update");
            }
            if !catalog.update(&id, update, now)? {
                bail!("no catalog entry {id}");
            }
            eprintln!("updated {id}");
        }
        CatalogCommand::Delete { id } => {
            if !catalog.delete(&id)? {
                bail!("no catalog entry {id}");
            }
            eprintln!("deleted {id}");
        }
        CatalogCommand::Import { file } => {
            let id = catalog.import_template(&file, now)?;
            eprintln!("imported {} as {id}", file.display());
        }
        CatalogCommand::Export { dir } => {
            let report = catalog.export_all(&dir)?;
            for (id, reason) in &report.skipped {
                eprintln!("skipped {id}: {reason}");
            }
            eprintln!(
                "exported {} templates to {}",
                report.exported.len(),
                dir.display()
            );
        }
    }
    Ok(())
}

fn print_entries(entries: &[CatalogEntry]) {
    if entries.is_empty() {
        eprintln!("no entries");
    }
    for entry in entries {
        println!("{}", entry_line(entry));
    }
}

fn entry_line(entry: &CatalogEntry) -> String {
    format!(
        "{:<20} {:<8} {}  ({})",
        entry.id,
        entry.severity,
        entry.name,
        entry.path.display()
    )
}

fn entry_details(entry: &CatalogEntry) -> Vec<String> {
    let mut lines = vec![
        format!("id:          {}", entry.id),
        format!("name:        {}", entry.name),
        format!("severity:    {}", entry.severity),
        format!("path:        {}", entry.path.display()),
        format!("tags:        {}", entry.tags.join(", ")),
    ];
    if !entry.description.is_empty() {
        lines.push(format!("description: {}", entry.description));
    }
    for reference in &entry.references {
        lines.push(format!("reference:   {reference}"));
    }
    if let Some(created) = entry.created_at {
        lines.push(format!("created:     {created}"));
    }
    if let Some(updated) = entry.updated_at {
        lines.push(format!("updated:     {updated}"));
    }
    lines
}

fn scan(config: &AppConfig, args: ScanArgs) -> anyhow::Result<()> {
    let request = ScanRequest {
        exe: config.scanner.clone(),
        template: args.template,
        target: args.target,
        timeout: args.timeout,
        verbose: args.scan_verbose,
        debug: args.debug,
        no_color: args.no_color,
    };
    if args.dry_run {
        println!("{}", request.command_line().join(" "));
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting scan runtime")?;
    let cancel = CancellationToken::new();
    runtime.block_on(async {
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                watcher.cancel();
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = async {
            while let Some(line) = rx.recv().await {
                match line {
                    ScanLine::Stdout(line) => println!("{line}"),
                    ScanLine::Stderr(line) => eprintln!("{line}"),
                }
            }
        };
        let runner = ScanRunner::new(cancel.clone());
        let (result, ()) = tokio::join!(runner.run(&request, tx), printer);
        result
    })?;
    Ok(())
}

fn config_command(path: &Path, cmd: ConfigCommand) -> anyhow::Result<()> {
    let mut config = AppConfig::load(path)?;
    match cmd {
        ConfigCommand::Show => {
            let env_key = std::env::var(API_KEY_ENV).is_ok_and(|key| !key.trim().is_empty());
            for line in config_lines(&config, env_key) {
                println!("{line}");
            }
            return Ok(());
        }
        ConfigCommand::SetKey { key } => config.api.key = key.trim().to_string(),
        ConfigCommand::SetPocDir { dir } => config.poc_dir = dir,
        ConfigCommand::SetScanner { exe } => config.scanner = exe,
    }
    config.save(path)
}

fn config_lines(config: &AppConfig, env_key: bool) -> Vec<String> {
    let key = match (config.api.key.is_empty(), env_key) {
        (_, true) => format!("<from {API_KEY_ENV}>"),
        (true, false) => "<unset>".to_string(),
        (false, false) => "<set>".to_string(),
    };
    vec![
        format!("api.url:       {}", config.api.url),
        format!("api.key:       {key}"),
        format!("api.model:     {}", config.api.model),
        format!("poc_dir:       {}", config.poc_dir.display()),
        format!("catalog_path:  {}", config.catalog_path.display()),
        format!("scanner:       {}", config.scanner),
        format!("settle_ms:     {}", config.settle_ms),
        format!("extract_limit: {}", config.extract_limit),
    ]
}
