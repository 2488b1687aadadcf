//! Failure Horizon CLI
//!
//! Builds predictive-maintenance training tables and serves a classifier.

use anyhow::Context;
use clap::{Parser, Subcommand};
use failure_horizon::{
    pipeline,
    source::{self, GeneratorConfig},
    PipelineConfig, VERSION,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "server")]
use failure_horizon::{
    model::{LogisticRegression, TrainOptions},
    server::{self, ServerConfig},
};
#[cfg(feature = "server")]
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "failure-horizon")]
#[command(version = VERSION)]
#[command(about = "Failure labelling and rolling-feature pipeline for predictive maintenance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic sensor table
    Generate {
        /// Output CSV path
        #[arg(long, short, default_value = "sensor_data.csv")]
        output: PathBuf,

        /// Number of machines
        #[arg(long, default_value = "50")]
        machines: u32,

        /// Days of readings per machine
        #[arg(long, default_value = "60")]
        days: u32,

        /// Seconds between readings
        #[arg(long, default_value = "600")]
        interval: u64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Build the labelled training table from a sensor table
    Build {
        /// Input sensor CSV
        #[arg(long, short)]
        input: PathBuf,

        /// Output directory for tables and report
        #[arg(long, short, default_value = "output")]
        output: PathBuf,

        /// Pipeline configuration file (defaults to the user config)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override negatives kept per positive
        #[arg(long)]
        ratio: Option<f64>,

        /// Override the sampling seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override worker threads
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Fit a classifier on a training table and serve predictions
    #[cfg(feature = "server")]
    Serve {
        /// Training table CSV (output of `build`)
        #[arg(long, short)]
        table: PathBuf,

        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Gradient descent epochs
        #[arg(long, default_value = "200")]
        epochs: usize,
    },

    /// Show configuration
    Config {
        /// Write the effective configuration to the config path
        #[arg(long)]
        save: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            output,
            machines,
            days,
            interval,
            seed,
        } => cmd_generate(&output, machines, days, interval, seed),
        Commands::Build {
            input,
            output,
            config,
            ratio,
            seed,
            workers,
        } => cmd_build(&input, &output, config.as_deref(), ratio, seed, workers),
        #[cfg(feature = "server")]
        Commands::Serve {
            table,
            port,
            epochs,
        } => cmd_serve(&table, port, epochs),
        Commands::Config { save } => cmd_config(save),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_generate(
    output: &Path,
    machines: u32,
    days: u32,
    interval: u64,
    seed: u64,
) -> anyhow::Result<()> {
    let config = GeneratorConfig {
        machines,
        days,
        sampling_interval_secs: interval,
        seed,
        ..GeneratorConfig::default()
    };

    let series = source::generate(&config)?;
    let readings: usize = series.iter().map(|s| s.len()).sum();
    source::write_series(output, &series)
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Generated {} machines, {} readings -> {}",
        series.len(),
        readings,
        output.display()
    );
    Ok(())
}

fn cmd_build(
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    ratio: Option<f64>,
    seed: Option<u64>,
    workers: Option<usize>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::load_from(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::load()?,
    };
    if let Some(ratio) = ratio {
        config.negative_ratio = ratio;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(workers) = workers {
        config.worker_threads = workers;
    }

    let series =
        source::read_series(input).with_context(|| format!("reading {}", input.display()))?;
    let out = pipeline::run(&series, &config)?;

    std::fs::create_dir_all(output)?;
    let table_path = output.join("training_table.csv");
    let sampled_path = output.join("training_sampled.csv");
    let report_path = output.join("report.json");

    source::write_training_table(&table_path, &out.schema, &out.label_column, &out.records)?;
    source::write_training_table(
        &sampled_path,
        &out.schema,
        &out.label_column,
        &out.sampled.records,
    )?;
    out.report.save(&report_path)?;

    println!("{}", out.report.summary());
    println!();
    println!("Training table: {}", table_path.display());
    println!("Sampled table:  {}", sampled_path.display());
    println!("Report:         {}", report_path.display());
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(table: &Path, port: u16, epochs: usize) -> anyhow::Result<()> {
    let training = source::read_training_table(table)
        .with_context(|| format!("reading {}", table.display()))?;
    let options = TrainOptions {
        epochs,
        ..TrainOptions::default()
    };
    let model = LogisticRegression::fit(&training.schema, &training.records, &options)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let (addr, shutdown_tx) = runtime.block_on(server::run(ServerConfig::new(port, Arc::new(model))))?;
    println!("Serving predictions on http://{addr} (Ctrl+C to stop)");

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("setting Ctrl+C handler")?;

    let _ = stop_rx.recv();
    println!();
    println!("Shutting down...");
    let _ = shutdown_tx.send(());
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    Ok(())
}

fn cmd_config(save: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", PipelineConfig::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);

    if save {
        config.save()?;
        println!();
        println!("Saved to {:?}", PipelineConfig::config_path());
    }
    Ok(())
}
