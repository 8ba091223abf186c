use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use resource_monitor::config::BackendKind;
use resource_monitor::display::{append_profile_row, write_csv, write_domain_table, write_history, write_summary_table};
use resource_monitor::{Device, MonitorConfig, ThreadedMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
	Table,
	Csv,
	Json,
}

/// Measures the energy and power a command consumes on CPU and GPU
#[derive(Debug, Parser)]
#[command(name = "resource-monitor", version, about, long_about = None)]
struct Cli {
	/// TOML configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Seconds between background samples (overrides the configuration)
	#[arg(short, long)]
	period: Option<f64>,

	/// Backends to sample (overrides the configuration, repeatable)
	#[arg(short, long, value_enum)]
	backend: Vec<BackendKind>,

	/// Label of the measurement in reports
	#[arg(short, long)]
	label: Option<String>,

	/// CSV file the measurement is appended to
	#[arg(long)]
	profile: Option<PathBuf>,

	/// Print the power of every sampling interval
	#[arg(long)]
	history: bool,

	#[arg(short, long, value_enum, default_value = "table")]
	format: OutputFormat,

	#[arg(short, long)]
	verbose: bool,

	/// Command to measure
	#[arg(last = true, required = true)]
	command: Vec<String>,
}

impl Cli {
	fn monitor_config(&self) -> anyhow::Result<MonitorConfig> {
		let mut config = match &self.config {
			Some(path) => MonitorConfig::load(path)?,
			None => MonitorConfig::default(),
		};

		if let Some(period) = self.period {
			config.period_secs = period;
		}
		if !self.backend.is_empty() {
			config.backends = self.backend.clone();
		}

		config.validate()?;
		Ok(config)
	}
}

fn init_logging(verbose: bool) {
	let default_filter = if verbose { "resource_monitor=debug" } else { "resource_monitor=info" };
	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
		.with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_target(false))
		.init();
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
	let config = cli.monitor_config()?;
	debug!(?config, "configuration");

	let monitor = ThreadedMonitor::from_config(&config)?;
	monitor.init()?;
	if !monitor.is_ready(Device::Cpu) && !monitor.is_ready(Device::Gpu) {
		warn!("no power probe could be initialised, only time will be measured");
	}

	let (program, args) = match cli.command.split_first() {
		Some(split) => split,
		None => bail!("no command given"),
	};
	let label = cli.label.clone().unwrap_or_else(|| cli.command.join(" "));

	monitor.start_monitoring(config.period_secs)?;
	let status = Command::new(program).args(args).status();
	monitor.end_monitoring()?;
	let status = status.with_context(|| format!("failed to run {}", program))?;
	info!(%status, samples = monitor.num_data(), "command finished");

	let summary = monitor.summary(&label);
	let mut out = io::stdout().lock();
	match cli.format {
		OutputFormat::Table => {
			write_summary_table(&mut out, &summary)?;
			if let Ok(domains) = monitor.try_energy_by_domain() {
				write_domain_table(&mut out, &domains)?;
			}
		},
		OutputFormat::Csv => write_csv(&mut out, &summary)?,
		OutputFormat::Json => {
			serde_json::to_writer_pretty(&mut out, &summary)?;
			writeln!(out)?;
		},
	}

	if cli.history {
		write_history(&mut out, &monitor.power_history())?;
	}

	if let Some(path) = &cli.profile {
		append_profile_row(path, &summary).with_context(|| format!("failed to write {}", path.display()))?;
	}

	Ok(status
		.code()
		.and_then(|code| u8::try_from(code).ok())
		.map_or(ExitCode::FAILURE, ExitCode::from))
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	match run(&cli) {
		Ok(code) => code,
		Err(e) => {
			eprintln!("Error: {:#}", e);
			ExitCode::FAILURE
		},
	}
}
