//! Game session: the current level, the editor text and saved progress.
//!
//! A run is split in three so an embedding can drop its borrow of the
//! session while the script is awaited:
//!
//! ```ignore
//! if let Some(ticket) = session.begin_run() {
//!     let finished = ticket.execute().await;
//!     session.finish_run(finished);
//! }
//! ```

use std::{
	collections::{BTreeMap, BTreeSet},
	fs, io,
	path::{Path, PathBuf},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
	interpreter::ConsoleLine,
	levels::{self, Level},
	runner::{ExecutionOutcome, Runner},
	validator::{ValidationResult, validate},
};

/// Namespace of the persisted progress record.
pub const STORAGE_KEY: &str = "babels-signal-routing";

const RESTORED_FEEDBACK: &str = "✓ Level complete. Your saved solution has been restored.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Progress {
	pub completed_levels: BTreeSet<u32>,
	pub level_solutions: BTreeMap<u32, String>,
	pub last_level_id: Option<u32>,
}

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("failed to access {path}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("saved progress is not valid JSON")]
	Corrupt(#[from] serde_json::Error),
	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

pub trait ProgressStore {
	/// Saved progress, or the default when nothing was saved yet.
	fn load(&self) -> Result<Progress, StoreError>;
	fn save(&mut self, progress: &Progress) -> Result<(), StoreError>;
}

impl<S: ProgressStore + ?Sized> ProgressStore for Box<S> {
	fn load(&self) -> Result<Progress, StoreError> {
		(**self).load()
	}

	fn save(&mut self, progress: &Progress) -> Result<(), StoreError> {
		(**self).save(progress)
	}
}

/// Keeps the serialized record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
	json: Option<String>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_json(json: impl Into<String>) -> Self {
		Self { json: Some(json.into()) }
	}

	pub fn json(&self) -> Option<&str> {
		self.json.as_deref()
	}
}

impl ProgressStore for MemoryStore {
	fn load(&self) -> Result<Progress, StoreError> {
		match &self.json {
			Some(json) => Ok(serde_json::from_str(json)?),
			None => Ok(Progress::default()),
		}
	}

	fn save(&mut self, progress: &Progress) -> Result<(), StoreError> {
		self.json = Some(serde_json::to_string(progress)?);
		Ok(())
	}
}

/// One JSON file named after [`STORAGE_KEY`] inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
	path: PathBuf,
}

impl FileStore {
	pub fn new(dir: impl AsRef<Path>) -> Self {
		Self {
			path: dir.as_ref().join(format!("{STORAGE_KEY}.json")),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_error(&self, source: io::Error) -> StoreError {
		StoreError::Io {
			path: self.path.clone(),
			source,
		}
	}
}

impl ProgressStore for FileStore {
	fn load(&self) -> Result<Progress, StoreError> {
		match fs::read_to_string(&self.path) {
			Ok(text) => Ok(serde_json::from_str(&text)?),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Progress::default()),
			Err(e) => Err(self.io_error(e)),
		}
	}

	fn save(&mut self, progress: &Progress) -> Result<(), StoreError> {
		if let Some(dir) = self.path.parent() {
			fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
		}
		let json = serde_json::to_string_pretty(progress)?;
		fs::write(&self.path, json).map_err(|e| self.io_error(e))
	}
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
	#[error("no level with id {0}")]
	UnknownLevel(u32),
	#[error("a run is already in progress")]
	Busy,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session<S: ProgressStore> {
	store: S,
	progress: Progress,
	runner: Runner,
	level: &'static Level,
	code: String,
	last_result: Option<ValidationResult>,
	last_error: Option<String>,
	console: Vec<ConsoleLine>,
	executing: bool,
}

/// A run that has been started but not yet applied to the session.
#[derive(Debug)]
pub struct RunTicket {
	runner: Runner,
	level: &'static Level,
	source: String,
}

/// A scored run, ready for [`Session::finish_run`].
#[derive(Debug)]
pub struct FinishedRun {
	pub level: &'static Level,
	pub source: String,
	pub outcome: ExecutionOutcome,
	pub result: ValidationResult,
}

impl RunTicket {
	pub fn level(&self) -> &'static Level {
		self.level
	}

	/// Executes, then scores. Scoring never starts before execution settles.
	pub async fn execute(self) -> FinishedRun {
		info!("Running level {} ({})", self.level.id, self.level.title);
		let outcome = self
			.runner
			.execute(&self.source, &self.level.context_bindings(), self.level.capture_names)
			.await;
		let result = validate(self.level, &self.source, &outcome);
		FinishedRun {
			level: self.level,
			source: self.source,
			outcome,
			result,
		}
	}
}

impl<S: ProgressStore> Session<S> {
	/// Opens the last viewed level, or the first one not yet completed.
	pub fn start(store: S, runner: Runner) -> Self {
		let progress = store.load().unwrap_or_else(|e| {
			warn!("Ignoring saved progress: {e}");
			Progress::default()
		});

		let level = progress
			.last_level_id
			.and_then(levels::by_id)
			.or_else(|| levels::all().iter().find(|l| !progress.completed_levels.contains(&l.id)))
			.unwrap_or_else(levels::first);

		let mut session = Self {
			store,
			progress,
			runner,
			level,
			code: String::new(),
			last_result: None,
			last_error: None,
			console: Vec::new(),
			executing: false,
		};
		session.enter(level);
		session
	}

	pub fn level(&self) -> &'static Level {
		self.level
	}

	pub fn code(&self) -> &str {
		&self.code
	}

	pub fn last_result(&self) -> Option<&ValidationResult> {
		self.last_result.as_ref()
	}

	pub fn last_error(&self) -> Option<&str> {
		self.last_error.as_deref()
	}

	pub fn console(&self) -> &[ConsoleLine] {
		&self.console
	}

	pub fn is_executing(&self) -> bool {
		self.executing
	}

	pub fn progress(&self) -> &Progress {
		&self.progress
	}

	pub fn is_completed(&self, id: u32) -> bool {
		self.progress.completed_levels.contains(&id)
	}

	pub fn store(&self) -> &S {
		&self.store
	}

	pub fn select_level(&mut self, id: u32) -> Result<&'static Level, SessionError> {
		if self.executing {
			return Err(SessionError::Busy);
		}
		let level = levels::by_id(id).ok_or(SessionError::UnknownLevel(id))?;
		self.enter(level);
		Ok(level)
	}

	/// Replaces the editor text. A stale execution error is cleared.
	pub fn set_code(&mut self, code: impl Into<String>) {
		self.code = code.into();
		self.last_error = None;
	}

	/// `None` while another run is in flight.
	pub fn begin_run(&mut self) -> Option<RunTicket> {
		if self.executing {
			debug!("Run ignored: level {} is still executing", self.level.id);
			return None;
		}
		self.executing = true;
		Some(RunTicket {
			runner: self.runner.clone(),
			level: self.level,
			source: self.code.clone(),
		})
	}

	pub fn finish_run(&mut self, finished: FinishedRun) -> &ValidationResult {
		self.executing = false;
		let FinishedRun {
			level,
			source,
			outcome,
			result,
		} = finished;

		if result.is_complete() {
			info!("Level {} complete", level.id);
			self.progress.completed_levels.insert(level.id);
			self.progress.level_solutions.insert(level.id, source);
			self.persist();
		}

		self.last_error = outcome.failure;
		self.console = outcome.console;
		self.last_result.insert(result)
	}

	/// Runs the editor text to completion. `None` if a run was already in flight.
	pub async fn run(&mut self) -> Option<ValidationResult> {
		let ticket = self.begin_run()?;
		let finished = ticket.execute().await;
		Some(self.finish_run(finished).clone())
	}

	pub fn next_level(&mut self) -> Result<Option<&'static Level>, SessionError> {
		if self.executing {
			return Err(SessionError::Busy);
		}
		let next = levels::next_after(self.level.id);
		if let Some(level) = next {
			self.enter(level);
		}
		Ok(next)
	}

	/// Puts the starter code back. Completion is kept.
	pub fn reset_level(&mut self) {
		self.code = self.level.starter_code.to_string();
		self.last_result = None;
		self.last_error = None;
		self.console.clear();
	}

	pub fn reset_progress(&mut self) -> Result<(), SessionError> {
		if self.executing {
			return Err(SessionError::Busy);
		}
		info!("Resetting all progress");
		self.progress = Progress::default();
		self.enter(levels::first());
		Ok(())
	}

	fn enter(&mut self, level: &'static Level) {
		self.level = level;
		self.last_error = None;
		self.console.clear();
		match self.progress.level_solutions.get(&level.id) {
			Some(solution) if self.is_completed(level.id) => {
				self.code = solution.clone();
				self.last_result = Some(ValidationResult::complete(level.total_steps, RESTORED_FEEDBACK));
			},
			_ => {
				self.code = level.starter_code.to_string();
				self.last_result = None;
			},
		}
		self.progress.last_level_id = Some(level.id);
		self.persist();
	}

	fn persist(&mut self) {
		if let Err(e) = self.store.save(&self.progress) {
			warn!("Failed to save progress: {e}");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		host::{Host, HostConfig},
		runner::RunnerConfig,
	};
	use futures::executor::block_on;

	fn runner() -> Runner {
		let host = Host::new(HostConfig {
			experimental_apis: true,
			..HostConfig::default()
		});
		Runner::new(RunnerConfig::default(), host)
	}

	fn store_with(progress: &Progress) -> MemoryStore {
		let mut store = MemoryStore::new();
		store.save(progress).unwrap();
		store
	}

	#[test]
	fn fresh_session_starts_at_level_one() {
		let session = Session::start(MemoryStore::new(), runner());
		assert_eq!(session.level().id, 1);
		assert_eq!(session.code(), session.level().starter_code);
		assert!(session.last_result().is_none());
		assert!(!session.is_executing());
	}

	#[test]
	fn starts_at_first_incomplete_level() {
		let progress = Progress {
			completed_levels: BTreeSet::from([1, 2]),
			..Progress::default()
		};
		let session = Session::start(store_with(&progress), runner());
		assert_eq!(session.level().id, 3);
	}

	#[test]
	fn restores_last_viewed_level() {
		let progress = Progress {
			last_level_id: Some(7),
			..Progress::default()
		};
		let session = Session::start(store_with(&progress), runner());
		assert_eq!(session.level().id, 7);
	}

	#[test]
	fn corrupt_progress_is_ignored() {
		let session = Session::start(MemoryStore::with_json("{not json"), runner());
		assert_eq!(session.level().id, 1);
	}

	#[test]
	fn completing_a_level_saves_the_solution() {
		let mut session = Session::start(MemoryStore::new(), runner());
		let solution = session.level().solution;
		session.set_code(solution);
		let result = block_on(session.run()).unwrap();
		assert!(result.is_complete());
		assert!(session.is_completed(1));
		assert!(session.last_error().is_none());

		let reloaded: Progress = serde_json::from_str(session.store().json().unwrap()).unwrap();
		assert_eq!(reloaded.level_solutions.get(&1).map(String::as_str), Some(solution));
		assert_eq!(reloaded.last_level_id, Some(1));
	}

	#[test]
	fn failed_run_reports_the_error_without_completing() {
		let mut session = Session::start(MemoryStore::new(), runner());
		session.set_code("console.log('checking');\nthrow new Error('sensor offline');");
		let result = block_on(session.run()).unwrap();
		assert_eq!(result.steps_completed(), 0);
		assert_eq!(session.last_error(), Some("Error: sensor offline"));
		assert_eq!(session.console().len(), 1);
		assert!(!session.is_completed(1));

		session.set_code("const fixed = true;");
		assert!(session.last_error().is_none());
	}

	#[test]
	fn second_run_while_executing_is_ignored() {
		let mut session = Session::start(MemoryStore::new(), runner());
		let ticket = session.begin_run().unwrap();
		assert!(session.is_executing());
		assert!(session.begin_run().is_none());
		assert!(matches!(session.select_level(2), Err(SessionError::Busy)));

		let finished = block_on(ticket.execute());
		session.finish_run(finished);
		assert!(!session.is_executing());
		assert!(session.begin_run().is_some());
	}

	#[test]
	fn selecting_a_completed_level_restores_it() {
		let progress = Progress {
			completed_levels: BTreeSet::from([2]),
			level_solutions: BTreeMap::from([(2, "const saved = true;".to_string())]),
			last_level_id: Some(1),
		};
		let mut session = Session::start(store_with(&progress), runner());
		session.select_level(2).unwrap();
		assert_eq!(session.code(), "const saved = true;");
		let restored = session.last_result().unwrap();
		assert!(restored.is_complete());
		assert_eq!(restored.steps_completed(), 3);

		assert!(matches!(session.select_level(42), Err(SessionError::UnknownLevel(42))));
	}

	#[test]
	fn next_level_and_resets() {
		let mut session = Session::start(MemoryStore::new(), runner());
		session.set_code("edited");
		assert_eq!(session.next_level().unwrap().map(|l| l.id), Some(2));
		assert_eq!(session.code(), session.level().starter_code);

		session.set_code("edited again");
		session.reset_level();
		assert_eq!(session.code(), session.level().starter_code);

		session.select_level(10).unwrap();
		assert!(session.next_level().unwrap().is_none());
		assert_eq!(session.level().id, 10);

		session.reset_progress().unwrap();
		assert_eq!(session.level().id, 1);
		assert!(session.progress().completed_levels.is_empty());
	}

	#[test]
	fn file_store_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let mut store = FileStore::new(dir.path().join("nested"));
		assert_eq!(store.load().unwrap(), Progress::default());

		let progress = Progress {
			completed_levels: BTreeSet::from([4]),
			level_solutions: BTreeMap::from([(4, "solved".to_string())]),
			last_level_id: Some(5),
		};
		store.save(&progress).unwrap();
		assert!(store.path().ends_with("babels-signal-routing.json"));
		assert_eq!(store.load().unwrap(), progress);

		fs::write(store.path(), "{ broken").unwrap();
		assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
	}

	#[test]
	fn progress_json_uses_camel_case() {
		let json = serde_json::to_value(Progress {
			completed_levels: BTreeSet::from([1]),
			..Progress::default()
		})
		.unwrap();
		assert_eq!(json["completedLevels"], serde_json::json!([1]));
		assert!(json["lastLevelId"].is_null());
	}
}
