//! 3-D Acoustic Wave Simulation
//!
//! Runs the implicit multistep scheme from a TOML configuration, with
//! command-line flags overriding individual settings.

use acoustic3d::{
    config::RunConfig,
    domain::iteration::SolverMethod,
    domain::CoefficientModel,
    error::{Result, SimulationError},
    simulate,
    utilities::{create_sink, SnapshotFormat},
};
use clap::Parser;
use log::{error, info};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line arguments for the acoustic simulation
#[derive(Parser, Debug)]
#[command(name = "acoustic3d")]
#[command(about = "Implicit time-domain 3-D acoustic wave simulation", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Node count on every axis
    #[arg(long)]
    nodes: Option<usize>,

    /// Domain extent on every axis
    #[arg(long)]
    extent: Option<f64>,

    /// Wave speed
    #[arg(long)]
    velocity: Option<f64>,

    /// Stencil coefficient model: velocity or modulus
    #[arg(long)]
    model: Option<CoefficientModel>,

    /// Density
    #[arg(long)]
    density: Option<f64>,

    /// Source peak frequency in Hz
    #[arg(long)]
    frequency: Option<f64>,

    /// Source amplitude
    #[arg(long)]
    amplitude: Option<f64>,

    /// Source force angle in degrees
    #[arg(long)]
    angle: Option<f64>,

    /// Run duration
    #[arg(long)]
    tmax: Option<f64>,

    /// Timestep (defaults to the CFL limit)
    #[arg(long)]
    dt: Option<f64>,

    /// Linear solver: cg or bicgstab
    #[arg(long)]
    solver: Option<SolverMethod>,

    /// Relative solver tolerance
    #[arg(long)]
    rtol: Option<f64>,

    /// Steps between diagnostics and snapshots
    #[arg(long)]
    interval: Option<usize>,

    /// Snapshot directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable snapshot files
    #[arg(long)]
    no_snapshots: bool,

    /// Partition blocks per axis, e.g. 2,2,1
    #[arg(long, value_delimiter = ',', num_args = 3)]
    blocks: Option<Vec<usize>>,
}

impl Args {
    fn apply(&self, config: &mut RunConfig) {
        if let Some(n) = self.nodes {
            config.grid.nx = n;
            config.grid.ny = n;
            config.grid.nz = n;
        }
        if let Some(e) = self.extent {
            config.grid.xmax = e;
            config.grid.ymax = e;
            config.grid.zmax = e;
        }
        if let Some(v) = self.velocity {
            config.material.velocity = v;
            config.material.stiffness = None;
        }
        if let Some(model) = self.model {
            config.material.model = model;
        }
        if let Some(d) = self.density {
            config.material.density = d;
        }
        if let Some(f) = self.frequency {
            config.source.frequency = f;
        }
        if let Some(a) = self.amplitude {
            config.source.amplitude = a;
        }
        if let Some(a) = self.angle {
            config.source.angle = a;
        }
        if let Some(t) = self.tmax {
            config.time.tmax = t;
        }
        if self.dt.is_some() {
            config.time.dt = self.dt;
        }
        if let Some(method) = self.solver {
            config.solver.method = method;
        }
        if let Some(rtol) = self.rtol {
            config.solver.rtol = rtol;
        }
        if let Some(interval) = self.interval {
            config.output.interval = interval;
        }
        if let Some(dir) = &self.output {
            config.output.directory = dir.clone();
        }
        if self.no_snapshots {
            config.output.format = SnapshotFormat::None;
        }
        if let Some(blocks) = &self.blocks {
            if let [px, py, pz] = blocks[..] {
                config.partition.blocks = [px, py, pz];
            }
        }
    }
}

fn load_config(args: &Args) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    if args.print_config {
        println!("{}", config.to_toml_string()?);
        return Ok(());
    }

    if config.output.format != SnapshotFormat::None {
        std::fs::create_dir_all(&config.output.directory).map_err(|e| {
            SimulationError::config(format!(
                "cannot create output directory {}: {}",
                config.output.directory.display(),
                e
            ))
        })?;
    }

    let mut sink = create_sink(
        config.output.format,
        config.output.directory.clone(),
        config.output.prefix.clone(),
    );
    let summary = simulate(config, sink.as_mut())?;

    info!(
        "finished {} steps, {} solver iterations, {:.3} s",
        summary.steps, summary.solver_iterations, summary.elapsed
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match env::var("RAYON_NUM_THREADS") {
        Ok(n) => info!("Rayon thread pool: {} threads", n),
        Err(_) => info!(
            "Rayon thread pool: {} threads (all available cores)",
            num_cpus::get()
        ),
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
