//! Command-line front end for cultural consensus analysis.
//!
//! Reads a CSV survey, fits the consensus model and prints the posterior
//! summary, plots and the comparison with the majority vote.

use clap::Parser;
use cultural_consensus::{
    analyze, render_text, write_json_report, AnalysisConfig, Report, ResponseMatrix,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "cct")]
#[command(version)]
#[command(about = "Infer informant competence and a shared answer key from binary survey data")]
struct Cli {
    /// CSV file: header row, informant id column, then 0/1 answers
    #[arg(default_value = "data/plant_knowledge.csv")]
    input: PathBuf,

    /// JSON file with sampler options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Retained draws per chain
    #[arg(long)]
    draws: Option<usize>,

    /// Tuning iterations per chain
    #[arg(long)]
    tune: Option<usize>,

    /// Number of chains
    #[arg(long)]
    chains: Option<usize>,

    /// Target acceptance probability for step-size adaptation
    #[arg(long)]
    target_accept: Option<f64>,

    /// Base random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the full report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Skip the posterior plots
    #[arg(long)]
    no_plots: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        fatal(&format!("failed to install logger: {err}"));
    }
}

fn load_config(cli: &Cli) -> AnalysisConfig {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .unwrap_or_else(|err| fatal(&format!("error: {err}"))),
        None => AnalysisConfig::default(),
    };
    let sampler = &mut config.sampler;
    if let Some(draws) = cli.draws {
        sampler.draws = draws;
    }
    if let Some(tune) = cli.tune {
        sampler.tune = tune;
    }
    if let Some(chains) = cli.chains {
        sampler.chains = chains;
    }
    if let Some(target) = cli.target_accept {
        sampler.target_accept = target;
    }
    if let Some(seed) = cli.seed {
        sampler.seed = seed;
    }
    if let Err(err) = config.validate() {
        fatal(&format!("error: {err}"));
    }
    config
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let config = load_config(&cli);

    let data = ResponseMatrix::load_csv(&cli.input)
        .unwrap_or_else(|err| fatal(&format!("error: {err}")));
    info!(
        "loaded {} informants x {} items from {}",
        data.informants(),
        data.items(),
        cli.input.display()
    );

    let analysis = analyze(&data, &config)
        .unwrap_or_else(|err| fatal(&format!("error: {err}")));
    print!("{}", render_text(&analysis, !cli.no_plots));

    if let Some(path) = &cli.json {
        let report = Report::new(&analysis, &data);
        match write_json_report(path, &report) {
            Ok(written) => info!("report written to {}", written.display()),
            Err(err) => fatal(&format!("error: {err}")),
        }
    }
}
