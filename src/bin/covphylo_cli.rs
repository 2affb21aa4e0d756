use anyhow::{Context, Result, anyhow, bail};
use covphylo::{
    about,
    config::{PipelineConfig, default_log_filter},
    driver::PipelineDriver,
    fetch::FileBatchSource,
    orchestrator::AlignmentOrchestrator,
    phylogeny::{IqTree, TreeBuilder, select_genomes_for_run},
    run_id::RunId,
    selections::{Selection, SelectionCatalog},
};
use serde::Serialize;
use std::{env, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct SelectionStatus {
    selection: String,
    last_run_id: Option<String>,
    incorporated_count: usize,
    aligned_path: Option<PathBuf>,
    aligned_exists: bool,
}

#[derive(Serialize)]
struct SelectionListing {
    name: String,
    description: Option<String>,
    filter_count: usize,
}

fn usage() {
    eprintln!(
        "Usage:\n  \
  covphylo_cli --version\n  \
  covphylo_cli [--config PATH] run BATCH [--timestamp SECS] [SELECTION...]\n  \
  covphylo_cli [--config PATH] status SELECTION\n  \
  covphylo_cli [--config PATH] selections\n  \
  covphylo_cli [--config PATH] select-genomes SELECTION N\n  \
  covphylo_cli [--config PATH] tree SELECTION N\n\n  \
  BATCH is a .json batch or a FASTA file, local or http(s), optionally .gz"
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn parse_global_config_arg(args: &[String]) -> (Option<PathBuf>, usize) {
    if args.len() >= 3 && args[1] == "--config" {
        return (Some(PathBuf::from(&args[2])), 3);
    }
    (None, 1)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn required<'a>(args: &'a [String], idx: usize, what: &str, command: &str) -> Result<&'a str> {
    args.get(idx).map(String::as_str).ok_or_else(|| {
        usage();
        anyhow!("Missing {what} for {command}")
    })
}

fn parse_genome_count(text: &str) -> Result<usize> {
    text.parse()
        .with_context(|| format!("Invalid number of genomes '{text}'"))
}

fn load_catalog(config: &PipelineConfig) -> Result<SelectionCatalog> {
    let path = config.selections_path();
    Ok(SelectionCatalog::from_json_file(&path)?)
}

/// The newest aligned run of `selection`, or an error if it never ran.
fn head_run(config: &PipelineConfig, selection: &str) -> Result<RunId> {
    AlignmentOrchestrator::from_config(config)
        .head_artifact(selection)?
        .map(|(run_id, _)| run_id)
        .ok_or_else(|| anyhow!("Selection '{selection}' has no alignment yet"))
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        bail!("Missing command");
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let (config_path, cmd_idx) = parse_global_config_arg(&args);
    if args.len() <= cmd_idx {
        usage();
        bail!("Missing command");
    }
    init_logging();
    let config = PipelineConfig::load(config_path.as_deref())?;
    let command = args[cmd_idx].as_str();

    match command {
        "run" => {
            let batch_source = required(&args, cmd_idx + 1, "BATCH", command)?;
            let mut source = FileBatchSource::new(batch_source);
            let mut names = vec![];
            let mut i = cmd_idx + 2;
            while i < args.len() {
                if args[i] == "--timestamp" {
                    let value = required(&args, i + 1, "SECS", "--timestamp")?;
                    let ts: i64 = value
                        .parse()
                        .with_context(|| format!("Invalid timestamp '{value}'"))?;
                    source = source.with_timestamp(ts);
                    i += 2;
                } else {
                    names.push(args[i].clone());
                    i += 1;
                }
            }

            let catalog = load_catalog(&config)?;
            let selections: Vec<Selection> = if names.is_empty() {
                catalog.selections()?
            } else {
                names
                    .iter()
                    .map(|n| catalog.selection(n))
                    .collect::<Result<_, _>>()?
            };
            config.ensure_dirs()?;
            let report = PipelineDriver::from_config(&config).run_once(&source, &selections)?;
            print_json(&report)?;
            let failed = report.failed_selections();
            if !failed.is_empty() {
                bail!("Alignment failed for: {}", failed.join(", "));
            }
            Ok(())
        }
        "status" => {
            let selection = required(&args, cmd_idx + 1, "SELECTION", command)?;
            let orchestrator = AlignmentOrchestrator::from_config(&config);
            let ledger = orchestrator.ledger(selection)?;
            let head = orchestrator.head_artifact(selection)?;
            print_json(&SelectionStatus {
                selection: selection.to_string(),
                last_run_id: ledger.last_run_id().map(ToString::to_string),
                incorporated_count: ledger.len(),
                aligned_exists: head.as_ref().is_some_and(|(_, p)| p.is_file()),
                aligned_path: head.map(|(_, p)| p),
            })
        }
        "selections" => {
            let catalog = load_catalog(&config)?;
            let listing: Vec<SelectionListing> = catalog
                .list_selections()
                .into_iter()
                .map(|name| {
                    let entry = catalog.entry(&name);
                    SelectionListing {
                        description: entry.and_then(|e| e.description.clone()),
                        filter_count: entry.map(|e| e.filters.len()).unwrap_or(0),
                        name,
                    }
                })
                .collect();
            print_json(&listing)
        }
        "select-genomes" | "tree" => {
            let selection = required(&args, cmd_idx + 1, "SELECTION", command)?;
            let n = parse_genome_count(required(&args, cmd_idx + 2, "N", command)?)?;
            let run_id = head_run(&config, selection)?;
            let layout = AlignmentOrchestrator::from_config(&config).layout().clone();
            let genomes = select_genomes_for_run(&layout, selection, &run_id, n)?;
            if command == "select-genomes" {
                return print_json(&genomes);
            }
            let tree = IqTree::from_config(&config)
                .infer(&genomes.destination)
                .with_context(|| format!("Tree inference for '{selection}' failed"))?;
            print_json(&tree)
        }
        other => {
            usage();
            bail!("Unknown command '{other}'")
        }
    }
}
