use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use netlab_abstract::{CongestionAlgorithm, ExperimentScenario, SimConfig, SimTime};
use netlab_harness::{Experiment, ExperimentConfig, ResultSink};
use netlab_simulator::{SimulationReport, Simulator};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "TCP bulk transfer against staggered CBR load over one bottleneck link"
)]
struct Args {
    /// Write the ASCII link trace (`<trace-prefix>.tr`).
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    tracing: bool,

    /// Cap on bytes sent by the bulk flow; 0 means unlimited.
    #[arg(long = "maxBytes")]
    max_bytes: Option<u64>,

    /// Congestion control algorithm [default: TcpWestwood].
    #[arg(long)]
    prot: Option<String>,

    /// Per-packet receive error probability on the bottleneck [default: 1e-6].
    #[arg(long)]
    error: Option<f64>,

    /// Experiment description in TOML; flags given here take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory receiving the result files.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Run horizon in seconds.
    #[arg(long)]
    horizon: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "tcp-comparison")]
    trace_prefix: String,

    /// Write a JSON report of the finished simulation.
    #[arg(long)]
    report_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    // Unknown protocol names end the program before anything is built.
    let prot = args.congestion()?;
    init_logging();
    info!("netlab starting…");

    let scenario = match &args.config {
        Some(path) => load_scenario(path)?,
        None => ExperimentScenario::default(),
    };
    let config = args.experiment_config(&scenario, prot)?;
    if let Some(name) = &scenario.name {
        info!("experiment: {}", name);
    }
    let prot = config.sim.tcp.congestion;

    let mut sim = Simulator::new(config.sim.clone())?;
    let outcome = Experiment::new(config).run(&mut sim)?;

    println!();
    print!("{}", outcome.summary.render());

    let sink = ResultSink::new(&args.output_dir, prot.name());
    outcome.write(&sink)?;
    let report = sim.export_report();
    if args.tracing {
        let path = sink.write_lines(
            &format!("{}.tr", args.trace_prefix),
            report.link_events.iter().map(|e| e.ascii_line()),
        )?;
        info!("link trace written to {}", path.display());
    }
    if let Some(path) = &args.report_out {
        write_report(path, &report)?;
    }

    info!("Done.");
    Ok(())
}

impl Args {
    fn congestion(&self) -> Result<Option<CongestionAlgorithm>> {
        match &self.prot {
            Some(name) => Ok(Some(name.parse()?)),
            None => Ok(None),
        }
    }

    /// Built-in defaults, then the TOML scenario, then explicit flags.
    fn experiment_config(
        &self,
        scenario: &ExperimentScenario,
        prot: Option<CongestionAlgorithm>,
    ) -> Result<ExperimentConfig> {
        let mut sim = SimConfig::default();
        scenario.config.apply_to(&mut sim);
        if let Some(prot) = prot {
            sim.tcp.congestion = prot;
        }
        if let Some(error) = self.error {
            sim.link.error_rate = error;
        }
        if let Some(seed) = self.seed {
            sim.seed = seed;
        }
        if let Some(horizon) = self.horizon {
            if !(horizon.is_finite() && horizon > 0.0) {
                anyhow::bail!("--horizon must be a positive number of seconds, got {horizon}");
            }
            sim.horizon = SimTime::from_secs_f64(horizon);
        }
        sim.link_tracing = self.tracing;
        sim.validate()?;

        let mut config = ExperimentConfig::five_stream(sim).with_scenario(scenario);
        if let Some(max_bytes) = self.max_bytes {
            config = config.with_max_bytes(max_bytes);
        }
        Ok(config)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_scenario(path: &Path) -> Result<ExperimentScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read experiment file {}", path.display()))?;
    let scenario: ExperimentScenario =
        toml::from_str(&content).context("Failed to parse experiment file")?;
    Ok(scenario)
}

fn write_report(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write report file {}", path.display()))?;
    Ok(())
}
