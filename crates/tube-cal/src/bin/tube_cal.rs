use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

use tube_cal::control::ControlStore;
use tube_cal::sweep::{estimate_gains, measure_dac_sweep, SweepPoint};
use tube_cal::uniformity::check_uniformity;
use tube_cal::{CalibrationConfig, CalibrationSession};

#[derive(Parser, Debug)]
#[command(name = "tube-cal", version, about = "Closed-loop X-ray tube array intensity calibration")]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Emit tracing spans as JSON instead of plain log lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Session configuration (JSON).
    #[arg(short, long)]
    config: PathBuf,
    /// Override the session root from the config.
    #[arg(long)]
    root: Option<PathBuf>,
}

impl SessionArgs {
    fn load(&self) -> Result<CalibrationConfig, Box<dyn Error>> {
        let mut config = CalibrationConfig::load_json(&self.config)?;
        if let Some(root) = &self.root {
            config.session_root = root.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a config file with every default spelled out.
    WriteConfig {
        path: PathBuf,
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Create the session layout and store the initial DAC vector.
    Init {
        #[command(flatten)]
        session: SessionArgs,
        /// Initial DAC values, one per tube (default: all zero).
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        dac: Vec<i32>,
    },
    /// Run one calibration iteration on the batch in `<root>/cal`.
    Iterate {
        #[command(flatten)]
        session: SessionArgs,
        /// Carriage position of the batch, in mm.
        #[arg(long)]
        position: f64,
        /// Write ROI overlay PNGs into this directory.
        #[cfg(feature = "image")]
        #[arg(long)]
        overlay_dir: Option<PathBuf>,
    },
    /// Print the persisted session state.
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Measure a stepped scan and print the per-step, per-tube intensity map.
    Uniformity {
        #[command(flatten)]
        session: SessionArgs,
        dir: PathBuf,
        /// Files are named `0.raw, 1.raw, ...` in reverse tube order.
        #[arg(long)]
        renamed: bool,
        /// Also write the map as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Measure one batch per DAC setting and estimate per-tube gains.
    Sweep {
        #[command(flatten)]
        session: SessionArgs,
        /// JSON list of `{"dac": .., "dir": ..}`.
        #[arg(long)]
        points: PathBuf,
        #[arg(long)]
        position: f64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    // ignore errors if a logger was already installed
    let _ = LogTracer::init();
    tube_cal::core::init_tracing(true);
}

fn format_row<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::WriteConfig { path, root } => {
            let mut config = CalibrationConfig::default();
            if let Some(root) = root {
                config.session_root = root;
            }
            config.write_json(&path)?;
            println!("wrote {}", path.display());
        }
        Command::Init { session, dac } => {
            let config = session.load()?;
            let dac = if dac.is_empty() {
                vec![0; config.tube_count()]
            } else {
                dac
            };
            let mut session = CalibrationSession::open(config)?;
            session.initialize(&dac)?;
            println!("initialized {}", session.layout().root().display());
            println!("dac: {}", format_row(&dac));
        }
        Command::Iterate {
            session,
            position,
            #[cfg(feature = "image")]
            overlay_dir,
        } => {
            let mut session = CalibrationSession::open(session.load()?)?;
            #[cfg(feature = "image")]
            let report = match overlay_dir {
                Some(dir) => {
                    let mut sink = tube_cal::overlay::OverlaySink::new(dir);
                    session.run_iteration_with(position, &mut sink)?
                }
                None => session.run_iteration(position)?,
            };
            #[cfg(not(feature = "image"))]
            let report = session.run_iteration(position)?;

            println!("iteration: {}", report.iteration);
            println!("readings: {}", format_row(&report.intensities()));
            println!(
                "target: {:.1}{}",
                report.target,
                if report.target_locked { " (locked)" } else { "" }
            );
            println!("dac: {}", format_row(&report.new_control));
            println!("converged: {}", report.converged);
        }
        Command::Status { session } => {
            let session = CalibrationSession::open(session.load()?)?;
            let state = session.state()?;
            println!("iteration: {}", state.iteration);
            match state.target {
                Some(t) => println!("target: {t:.1}"),
                None => println!("target: unset"),
            }
            println!("converged: {}", state.converged);
            println!("running: {}", state.running);
            match session.store().load_control_vector() {
                Ok(dac) => println!("dac: {}", format_row(&dac)),
                Err(err) => println!("dac: unavailable ({err})"),
            }
        }
        Command::Uniformity {
            session,
            dir,
            renamed,
            output,
        } => {
            let config = session.load()?;
            let map = check_uniformity(&dir, &config, renamed)?;
            for (row, mm) in map.display_rows().iter().zip(&map.positions_mm) {
                println!("{mm:>7.1} mm: {}", format_row(row));
            }
            if let Some(s) = map.summary() {
                println!(
                    "min {} max {} mean {:.1} spread {:.2}% empty {}",
                    s.min,
                    s.max,
                    s.mean,
                    s.relative_spread * 100.0,
                    s.empty
                );
            }
            if let Some(path) = output {
                write_json(&path, &map)?;
            }
        }
        Command::Sweep {
            session,
            points,
            position,
            output,
        } => {
            let config = session.load()?;
            let points: Vec<SweepPoint> = serde_json::from_str(&fs::read_to_string(&points)?)?;
            let sweep = measure_dac_sweep(&points, &config, position)?;
            for m in &sweep {
                println!("{:+5}: {}", m.dac, format_row(&m.readings));
            }
            let gains = estimate_gains(&sweep, config.tube_count())?;
            let gains_txt: Vec<String> = gains.iter().map(|g| format!("{g:.3}")).collect();
            println!("gains: {}", gains_txt.join(","));
            if let Some(path) = output {
                write_json(&path, &serde_json::json!({ "sweep": sweep, "gains": gains }))?;
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "tracing")]
    let plain_logs = !cli.log_json;
    #[cfg(not(feature = "tracing"))]
    let plain_logs = true;

    if plain_logs {
        let level = tube_cal::core::level_from_verbosity(cli.verbose, cli.quiet);
        if let Err(err) = tube_cal::core::init_with_level(level) {
            eprintln!("logger: {err}");
        }
    } else {
        #[cfg(feature = "tracing")]
        init_tracing();
    }

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
