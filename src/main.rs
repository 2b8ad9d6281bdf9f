#[cfg(not(target_arch = "wasm32"))]
mod native {
	use std::{fs, path::PathBuf, process::ExitCode, time::Duration};

	use anyhow::{Context, Result};
	use clap::{Parser, Subcommand};
	use directories::ProjectDirs;
	use futures::executor::block_on;
	use signal_routing::{
		Host, HostConfig, ProgressStore, Runner, RunnerConfig, Session, ValidationResult, levels,
		session::{FileStore, Progress},
	};

	#[derive(Parser, Debug)]
	#[command(name = "signal-routing", about = "Play Babel's Signal Routing levels from the terminal", version)]
	struct Cli {
		/// Directory holding saved progress.
		#[arg(long, global = true)]
		data_dir: Option<PathBuf>,

		/// Wall-clock limit for one run, in milliseconds.
		#[arg(long, global = true, default_value_t = 10_000)]
		timeout_ms: u64,

		/// Simulated model latency per API call, in milliseconds.
		#[arg(long, global = true, default_value_t = 25)]
		latency_ms: u64,

		/// Expose Writer, Rewriter, Proofreader and LanguageModel.
		#[arg(long, global = true)]
		experimental_apis: bool,

		#[command(subcommand)]
		command: Command,
	}

	#[derive(Subcommand, Debug)]
	enum Command {
		/// List every level and whether it is complete.
		List,
		/// Print a level's instructions and starter code.
		Show { id: u32 },
		/// Run a script file against a level and score it.
		Run { id: u32, file: PathBuf },
		/// Run a level's reference solution.
		Solve { id: u32 },
		/// Print saved progress as JSON.
		Progress,
		/// Forget all saved progress.
		Reset,
	}

	impl Cli {
		fn store(&self) -> Result<FileStore> {
			let dir = match &self.data_dir {
				Some(dir) => dir.clone(),
				None => ProjectDirs::from("", "", "signal-routing")
					.map(|dirs| dirs.data_dir().to_path_buf())
					.context("could not determine a data directory; pass --data-dir")?,
			};
			Ok(FileStore::new(dir))
		}

		fn runner(&self) -> Runner {
			let config = RunnerConfig {
				timeout: Duration::from_millis(self.timeout_ms),
				..RunnerConfig::default()
			};
			let host = Host::new(HostConfig {
				latency: Duration::from_millis(self.latency_ms),
				experimental_apis: self.experimental_apis,
			});
			Runner::new(config, host)
		}
	}

	pub fn main() -> Result<ExitCode> {
		signal_routing::init_logging();
		let cli = Cli::parse();
		let store = cli.store()?;

		match &cli.command {
			Command::List => {
				let progress = store.load().context("failed to read saved progress")?;
				for level in levels::all() {
					let mark = if progress.completed_levels.contains(&level.id) { '✓' } else { ' ' };
					println!("[{mark}] {:>2}  {:<30} {}", level.id, level.title, level.api);
				}
				println!("{}/{} complete", progress.completed_levels.len(), levels::total());
			},
			Command::Show { id } => {
				let level = levels::by_id(*id).with_context(|| format!("no level with id {id}"))?;
				println!("Level {}: {} ({})", level.id, level.title, level.api);
				println!("{}", level.instructions.trim());
				println!("\n--- starter code ---\n{}", level.starter_code);
			},
			Command::Run { id, file } => {
				let source = fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
				return run_level(&cli, store, *id, source);
			},
			Command::Solve { id } => {
				let level = levels::by_id(*id).with_context(|| format!("no level with id {id}"))?;
				return run_level(&cli, store, *id, level.solution.to_string());
			},
			Command::Progress => {
				let progress = store.load().context("failed to read saved progress")?;
				println!("{}", serde_json::to_string_pretty(&progress)?);
			},
			Command::Reset => {
				let mut store = store;
				store.save(&Progress::default()).context("failed to reset progress")?;
				println!("Progress reset ({})", store.path().display());
			},
		}
		Ok(ExitCode::SUCCESS)
	}

	fn run_level(cli: &Cli, store: FileStore, id: u32, source: String) -> Result<ExitCode> {
		let mut session = Session::start(store, cli.runner());
		session.select_level(id)?;
		session.set_code(source);
		let result = block_on(session.run()).context("a run is already in progress")?;

		for line in session.console() {
			println!("> {}", line.text);
		}
		if let Some(error) = session.last_error() {
			eprintln!("Execution failed: {error}");
		}
		print_result(&result);

		Ok(if result.is_complete() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
	}

	fn print_result(result: &ValidationResult) {
		println!("{}", result.feedback());
		if let Some(sample) = result.sample_output() {
			println!("\nOutput: {sample}");
		}
		println!("\n{}/{} steps{}", result.steps_completed(), result.total_steps(), if result.is_complete() {
			" - level complete!"
		} else {
			""
		});
	}
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<std::process::ExitCode> {
	native::main()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
