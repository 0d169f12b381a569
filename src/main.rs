use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use kgx_ingest::app::graph_ops_use_case::{CleanOptions, GraphOpsUseCase};
use kgx_ingest::app::ingest_use_case::IngestUseCase;
use kgx_ingest::app::validate_use_case::ValidateUseCase;
use kgx_ingest::config::{order_sources, SourceConfig};
use kgx_ingest::constants::DEFAULT_SAMPLE_LIMIT;
use kgx_ingest::curie::CurieMap;
use kgx_ingest::infra::http_client::ReqwestHttp;
use kgx_ingest::logging::{init_logging, LoggingConfig};
use kgx_ingest::metrics;
use kgx_ingest::pipeline::ingestion::{ReaderConfig, ReaderFormat, Source};
use kgx_ingest::pipeline::storage::SinkFormat;
use kgx_ingest::pipeline::validation::Severity;

const SUMMARY_TOP_VIOLATIONS: usize = 10;

#[derive(Parser)]
#[command(name = "kgx_ingest")]
#[command(about = "Ingest tabular sources into KGX nodes and edges, and validate the result")]
#[command(version)]
struct Cli {
    /// Directory for daily-rolling JSON logs
    #[arg(long, global = true, env = "KGX_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Debug logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write Prometheus metrics to this file when the command finishes
    #[arg(long, global = true, env = "KGX_METRICS_OUT")]
    metrics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run source configs through a passthrough transform
    Transform {
        /// Source config files (TOML or YAML); run in dependency order
        #[arg(long = "config", required = true, num_args = 1..)]
        configs: Vec<PathBuf>,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Override every source's writer format
        #[arg(long, value_enum)]
        format: Option<SinkFormat>,
        /// Stop each source after this many records
        #[arg(long)]
        row_limit: Option<usize>,
        /// Validate passthrough output in process
        #[arg(long)]
        validate: bool,
        #[arg(long, requires = "validate")]
        schema: Option<PathBuf>,
    },
    /// Print the records of a file or URL as JSON lines
    Read {
        #[arg(long)]
        source: String,
        #[arg(long, value_enum, default_value = "csv")]
        format: ReaderFormat,
        #[arg(long)]
        delimiter: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Validate KGX node and edge files
    Validate {
        #[arg(long)]
        nodes: Option<PathBuf>,
        #[arg(long)]
        edges: Option<PathBuf>,
        /// LinkML-style YAML schema; without one only structure is checked
        #[arg(long, env = "KGX_SCHEMA")]
        schema: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
        sample_limit: usize,
        #[arg(long, value_enum, default_value = "info")]
        min_severity: Severity,
        /// Report file; JSON for `.json`, YAML otherwise
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Count nodes and edges by category, predicate, prefix and source
    Stats {
        #[arg(long)]
        nodes: Option<PathBuf>,
        #[arg(long)]
        edges: Option<PathBuf>,
        /// Decides which TSV columns hold lists
        #[arg(long, env = "KGX_SCHEMA")]
        schema: Option<PathBuf>,
        /// Stats file; JSON for `.json`, YAML otherwise
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Deduplicate and prune a graph, then write it again
    Clean {
        #[arg(long)]
        nodes: Option<PathBuf>,
        #[arg(long)]
        edges: Option<PathBuf>,
        #[arg(long, env = "KGX_SCHEMA")]
        schema: Option<PathBuf>,
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        #[arg(long, default_value = "cleaned")]
        name: String,
        #[arg(long, value_enum, default_value = "tsv")]
        format: SinkFormat,
        /// Keep the first row for each node and edge id
        #[arg(long)]
        deduplicate: bool,
        /// Move out edges whose subject or object is not a node
        #[arg(long)]
        prune: bool,
        /// With --prune, also move out nodes no edge touches
        #[arg(long, requires = "prune")]
        remove_singletons: bool,
    },
    /// Check curies against a prefix map and expand them
    Curies {
        /// YAML or JSON prefix map; the published default is fetched when omitted
        #[arg(long)]
        map: Option<PathBuf>,
        curies: Vec<String>,
    },
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _guard = init_logging(&LoggingConfig {
        log_dir: cli.log_dir.clone(),
        verbose: cli.verbose,
    });
    if cli.metrics_out.is_some() {
        metrics::init_metrics();
    }

    let result = run_command(cli.command);

    if let Some(path) = &cli.metrics_out {
        if let Err(e) = metrics::write_metrics(path) {
            warn!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }
    result
}

fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Transform {
            configs,
            output_dir,
            format,
            row_limit,
            validate,
            schema,
        } => run_transform(configs, output_dir, format, row_limit, validate.then_some(schema)),
        Commands::Read {
            source,
            format,
            delimiter,
            limit,
        } => run_read(source, format, delimiter, limit),
        Commands::Validate {
            nodes,
            edges,
            schema,
            sample_limit,
            min_severity,
            output,
        } => {
            if nodes.is_none() && edges.is_none() {
                anyhow::bail!("validate needs --nodes, --edges or both");
            }
            let report = ValidateUseCase::new(schema.as_deref())
                .with_sample_limit(sample_limit)
                .with_min_severity(min_severity)
                .validate_files(nodes.as_deref(), edges.as_deref(), output.as_deref())?;
            print!("{}", report.render_summary(SUMMARY_TOP_VIOLATIONS));
            Ok(())
        }
        Commands::Stats {
            nodes,
            edges,
            schema,
            output,
        } => {
            if nodes.is_none() && edges.is_none() {
                anyhow::bail!("stats needs --nodes, --edges or both");
            }
            let stats = GraphOpsUseCase::new(schema.as_deref()).stats(nodes.as_deref(), edges.as_deref())?;
            if let Some(path) = &output {
                stats
                    .write(path)
                    .with_context(|| format!("Failed to write stats to {}", path.display()))?;
            }
            print!("{}", stats.render_summary(SUMMARY_TOP_VIOLATIONS));
            Ok(())
        }
        Commands::Clean {
            nodes,
            edges,
            schema,
            output_dir,
            name,
            format,
            deduplicate,
            prune,
            remove_singletons,
        } => {
            if nodes.is_none() && edges.is_none() {
                anyhow::bail!("clean needs --nodes, --edges or both");
            }
            let options = CleanOptions {
                deduplicate,
                prune,
                remove_singletons,
            };
            let outcome = GraphOpsUseCase::new(schema.as_deref()).clean(
                nodes.as_deref(),
                edges.as_deref(),
                options,
                &output_dir,
                &name,
                format,
            )?;
            if let Some(removed) = &outcome.deduplicated {
                println!(
                    "🧹 Removed {} duplicate nodes, {} duplicate edges",
                    removed.nodes_removed, removed.edges_removed
                );
            }
            if let Some(pruned) = &outcome.pruned {
                println!(
                    "✂️  Moved {} dangling edges, {} singleton nodes",
                    pruned.dangling_edges.len(),
                    pruned.singleton_nodes.len()
                );
            }
            print!("{}", outcome.stats.render_summary(SUMMARY_TOP_VIOLATIONS));
            Ok(())
        }
        Commands::Curies { map, curies } => run_curies(map, curies),
    }
}

/// `validation` carries the optional schema when in-process validation was requested.
fn run_transform(
    paths: Vec<PathBuf>,
    output_dir: PathBuf,
    format: Option<SinkFormat>,
    row_limit: Option<usize>,
    validation: Option<Option<PathBuf>>,
) -> Result<()> {
    let configs = paths
        .iter()
        .map(|path| {
            SourceConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let configs = order_sources(configs)?;

    let use_case = IngestUseCase::new(output_dir)
        .with_format(format)
        .with_row_limit(row_limit);
    let validator = validation.map(|schema| ValidateUseCase::new(schema.as_deref()));

    for config in &configs {
        let outcome = use_case
            .run(config)
            .with_context(|| format!("source '{}' failed", config.name))?;
        let summary = &outcome.summary;
        println!("\n📊 Transform results for {}:", summary.source);
        println!("   Records read: {}", summary.records_read);
        println!("   Processed: {}", summary.records_processed);
        println!("   Skipped: {}", summary.records_skipped);
        println!("   Nodes: {}", summary.nodes);
        println!("   Edges: {}", summary.edges);
        println!("   Duration: {:.2}s", summary.duration_secs);

        match (&validator, &outcome.graph) {
            (Some(validator), Some(graph)) => {
                let report = validator.validate_sink(graph)?;
                print!("{}", report.render_summary(SUMMARY_TOP_VIOLATIONS));
            }
            (Some(_), None) => {
                warn!(source = %config.name, "Skipping validation: only passthrough output is validated in process");
            }
            _ => {}
        }
    }
    info!(sources = configs.len(), "Transform finished");
    Ok(())
}

fn run_read(
    location: String,
    format: ReaderFormat,
    delimiter: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let mut config = ReaderConfig {
        files: vec![location.clone()],
        ..ReaderConfig::with_format(format)
    };
    if let Some(delimiter) = delimiter {
        config.delimiter = delimiter;
    }
    let source = Source::new(location, config)?.with_row_limit(limit);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in source {
        let record = record?;
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn run_curies(map: Option<PathBuf>, curies: Vec<String>) -> Result<()> {
    let curie_map = match &map {
        Some(path) => CurieMap::load(path)
            .with_context(|| format!("Failed to load curie map {}", path.display()))?,
        None => CurieMap::fetch_default(&ReqwestHttp::default())
            .context("Failed to fetch the default curie map")?,
    };
    println!("✅ Loaded {} prefixes", curie_map.len());

    let mut invalid = 0;
    for value in &curies {
        match curie_map.validate(value) {
            Ok(curie) => match curie_map.expand(curie.as_str()) {
                Some(uri) => println!("{curie}\t{uri}"),
                None => println!("{curie}"),
            },
            Err(e) => {
                invalid += 1;
                println!("❌ {value}: {e}");
            }
        }
    }
    if invalid > 0 {
        anyhow::bail!("{invalid} of {} curies are invalid", curies.len());
    }
    Ok(())
}
