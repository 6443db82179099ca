use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use querycraft_core::{
	catalog, console, CaseFilter, Difficulty, HarnessConfig, ProcessAgent, ReportWriter, Runner,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "querycraft", about = "Grade a data-analysis agent against an eval catalog")]
struct Cli {
	/// Only run cases of this difficulty: easy, medium or hard
	#[arg(long)]
	filter: Option<Difficulty>,

	/// Only run the case with this id
	#[arg(long)]
	id: Option<String>,

	/// Show per-criterion results for every case, and info-level logs
	#[arg(short, long, action = ArgAction::SetTrue)]
	verbose: bool,

	/// List the selected cases without invoking the agent or writing a report
	#[arg(long, action = ArgAction::SetTrue)]
	dry_run: bool,

	/// Harness config file (YAML, or JSON with a .json extension)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Eval catalog to load (overrides the config)
	#[arg(long)]
	catalog: Option<PathBuf>,

	/// Where to write the JSON report (overrides the config)
	#[arg(long)]
	output: Option<PathBuf>,

	/// Per-case agent timeout in seconds (overrides the config)
	#[arg(long)]
	timeout: Option<u64>,
}

impl Cli {
	fn harness_config(&self) -> Result<HarnessConfig> {
		let mut config = match &self.config {
			Some(path) => HarnessConfig::load(path)?,
			None => HarnessConfig::default(),
		};
		if let Some(catalog) = &self.catalog {
			config.catalog = catalog.clone();
		}
		if let Some(output) = &self.output {
			config.output = output.clone();
		}
		if let Some(secs) = self.timeout {
			config.agent.timeout_secs = secs;
		}
		Ok(config)
	}

	fn case_filter(&self) -> CaseFilter {
		CaseFilter {
			difficulty: self.filter,
			id: self.id.clone(),
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(cli.verbose)?;
	execute(&cli, &mut std::io::stdout()).await
}

/// Loads the catalog, then either lists the selected cases or runs and reports them.
///
/// Only configuration and catalog problems are errors; a report that cannot be
/// saved is logged and the run still succeeds.
async fn execute(cli: &Cli, out: &mut (dyn Write + Send)) -> Result<()> {
	let config = cli.harness_config()?;
	let set = catalog::load(&config.catalog)
		.await
		.with_context(|| format!("could not load eval catalog {}", config.catalog.display()))?;
	let cases = cli.case_filter().select(&set);

	if cli.dry_run {
		console::print_header(out, &set.name, cases.len());
		console::print_dry_run(out, &cases);
		return Ok(());
	}

	let runner = Runner::builder()
		.agent(Arc::new(ProcessAgent::new(config.agent.clone())))
		.database(config.database.clone())
		.output_cap(config.output_cap)
		.verbose(cli.verbose)
		.build()?;

	let outcome = runner.run(&set, &cases, out).await;
	console::print_summary(out, &outcome.summary, &outcome.results);

	let writer = ReportWriter::new(&config.output);
	match writer.persist(&set.name, &outcome.summary, &outcome.results).await {
		Ok(()) => {
			let _ = writeln!(out, "\n  Results saved to: {}", writer.path().display());
		}
		Err(err) => {
			tracing::error!(error = %err, "could not save report");
			eprintln!("\n  Could not save results: {err}");
		}
	}

	Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
	let default_level = if verbose { "info" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	let subscriber = FmtSubscriber::builder()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;
	Ok(())
}
