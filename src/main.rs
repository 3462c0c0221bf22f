use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::error;
use log::LevelFilter;
use simplelog::ColorChoice;
use simplelog::ConfigBuilder;
use simplelog::LevelPadding;
use simplelog::TermLogger;
use simplelog::TerminalMode;

use seren::args::CommandLineOptions;
use seren::driver::Simulation;
use seren::error::SimError;
use seren::parameters::SimulationParameters;

static INTERRUPT: AtomicBool = AtomicBool::new(false);

fn log_setup(verbosity: usize) {
    let level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::default()
        .set_level_padding(LevelPadding::Right)
        .set_thread_level(LevelFilter::Off)
        .build();
    TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto).ok();
}

fn run(options: &CommandLineOptions) -> Result<(), SimError> {
    let overrides = options.overrides();
    let parameters = match &options.parameter_file_path {
        Some(path) => SimulationParameters::from_file(path, &overrides)?,
        None => SimulationParameters::from_yaml_str("", &overrides)?,
    };
    let mut sim = Simulation::new(parameters)?;
    if let Some(output_dir) = &options.output_dir {
        sim.output_dir = output_dir.clone();
    }
    sim.run(&INTERRUPT)
}

fn main() -> ExitCode {
    let options = CommandLineOptions::parse();
    log_setup(options.verbosity);
    if let Some(num_worker_threads) = options.num_worker_threads {
        let pool: Result<()> = rayon::ThreadPoolBuilder::new()
            .num_threads(num_worker_threads)
            .build_global()
            .context("failed to size the worker pool");
        if let Err(err) = pool {
            error!("{err:#}");
            return ExitCode::from(1);
        }
    }
    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
