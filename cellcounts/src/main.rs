use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::analysis::boxplot::BoxPlotRenderer;
use crate::analysis::frequency::{frequency_rows, write_frequency_csv};
use crate::analysis::report::write_comparison_csv;
use crate::analysis::response::{compare_responses, ResponseComparison};
use crate::analysis::significance::SignificanceTester;
use crate::analysis::subset::fetch_baseline;
use crate::config::Config;
use crate::dashboard::{Dashboard, DashboardOptions, SnapshotCache};
use crate::data_handling::cell_counts::CellCountCsv;
use crate::data_handling::store::CellCountStore;
use crate::error::Error;
use crate::helper_functions::{output_writer, resolve_path, skip_notice};

mod analysis;
mod config;
mod dashboard;
mod data_handling;
mod error;
mod helper_functions;
mod models;

#[derive(Parser, Debug)]
#[command(name = "cellcounts", about = "Immune cell-count loading and responder analysis")]
struct Cli {
    /// JSON configuration file; every field is optional
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Relation name, overrides the configuration
    #[arg(long, global = true)]
    table: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the relation with the rows of the cell-count CSV
    Load {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Print the number of rows in the relation
    Count,
    /// Per-sample relative frequency of each population
    Frequencies {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Responder vs non-responder comparison report and box plot
    Compare {
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, conflicts_with = "no_plot")]
        plot: Option<PathBuf>,
        #[arg(long)]
        no_plot: bool,
    },
    /// Box plot only
    Plot {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Baseline subset summaries and export
    Subset {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Text dashboard over the whole relation
    Dashboard {
        #[arg(long)]
        sample: Option<String>,
        #[arg(long, default_value_t = 10)]
        preview_rows: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = CellCountStore::new(&config).context("Failed to set up the SQLite store")?;

    match cli.command {
        Command::Load { csv } => {
            let path = resolve_path(csv.as_deref().unwrap_or(&config.csv_path));
            let written = CellCountCsv::new(&path)
                .load_into(&store)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            println!(
                "Loaded {written} rows into '{}' ({})",
                store.table(),
                store.database().display()
            );
        }
        Command::Count => {
            let n = store.row_count().context("Failed to count rows")?;
            println!("{} rows: {n}", store.table());
        }
        Command::Frequencies { output } => {
            let records = store.fetch_all().context("Failed to read cell counts")?;
            let rows = frequency_rows(&records, &config.populations);
            let path = output.as_deref().map(resolve_path);
            write_frequency_csv(&rows, output_writer(path.as_deref())?)
                .context("Failed to write the frequency report")?;
        }
        Command::Compare { output, plot, no_plot } => {
            let comparison = run_comparison(&store, &config)?;
            let path = output.as_deref().map(resolve_path);
            write_comparison_csv(&comparison.rows, output_writer(path.as_deref())?)
                .context("Failed to write the comparison report")?;
            if !no_plot {
                let target = resolve_path(plot.as_deref().unwrap_or(&config.plot_output));
                render_plot(&comparison, &config, &target)?;
            }
        }
        Command::Plot { output } => {
            let comparison = run_comparison(&store, &config)?;
            let target = resolve_path(output.as_deref().unwrap_or(&config.plot_output));
            render_plot(&comparison, &config, &target)?;
        }
        Command::Subset { output } => {
            let subset = fetch_baseline(&store, &config).context("Failed to build the baseline subset")?;
            let mut out = io::stdout().lock();
            if subset.is_empty() {
                writeln!(out, "warning: no samples match the baseline subset")?;
            }
            writeln!(out, "Baseline samples: {}", subset.sample_count())?;
            writeln!(out, "Baseline subjects: {}", subset.subject_count)?;
            for (title, counts) in [
                ("Samples per project", &subset.samples_per_project),
                ("Subjects per response", &subset.subjects_per_response),
                ("Subjects per sex", &subset.subjects_per_sex),
            ] {
                writeln!(out, "{title}:")?;
                for (key, n) in counts {
                    writeln!(out, "  {key}: {n}")?;
                }
            }
            if let Some(path) = output {
                subset
                    .write_csv(&resolve_path(&path))
                    .context("Failed to write the baseline rows")?;
            }
        }
        Command::Dashboard { sample, preview_rows } => {
            let cache = SnapshotCache::new();
            let options = DashboardOptions { sample, preview_rows };
            Dashboard::new(&config, &store, &cache)
                .render(&options, &mut io::stdout().lock())
                .context("Failed to render the dashboard")?;
        }
    }

    info!("Done");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(&resolve_path(path))
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(db) = &cli.db {
        config.database = db.clone();
    }
    if let Some(table) = &cli.table {
        config.table = table.clone();
    }
    config.database = resolve_path(&config.database);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_comparison(store: &CellCountStore, config: &Config) -> Result<ResponseComparison> {
    let tester = SignificanceTester::from_build();
    if !tester.is_available() {
        skip_notice(
            &mut io::stdout().lock(),
            "significance testing",
            &Error::MissingDependency { capability: "significance testing" },
        )?;
    }
    compare_responses(store, config, tester).context("Failed to compare response groups")
}

fn render_plot(comparison: &ResponseComparison, config: &Config, target: &Path) -> Result<()> {
    match BoxPlotRenderer::from_build().render(&comparison.summary, &config.populations, target) {
        Ok(()) => Ok(()),
        Err(e) if e.is_missing_dependency() => {
            skip_notice(&mut io::stdout().lock(), "the responder box plot", &e)?;
            Ok(())
        }
        Err(e) => Err(e).context("Failed to render the box plot"),
    }
}
