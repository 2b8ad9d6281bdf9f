//! Runs one player script: injects the level context, races the script
//! against a wall-clock timeout and snapshots the requested bindings.

use std::time::Duration;

use futures::{
	future::{self, Either},
	pin_mut,
};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
	ScriptError,
	host::Host,
	interpreter::{ConsoleLine, DEFAULT_MAX_CALL_DEPTH, Interpreter, Scope},
	parse_str, timer,
	value::Value,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
	pub timeout: Duration,
	pub max_call_depth: usize,
}

impl Default for RunnerConfig {
	fn default() -> Self {
		Self {
			timeout: DEFAULT_TIMEOUT,
			max_call_depth: DEFAULT_MAX_CALL_DEPTH,
		}
	}
}

/// What happened when a script ran, before any scoring.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
	pub succeeded: bool,
	/// The binding of the last capture name; `None` when the run failed.
	pub return_value: Option<Value>,
	pub failure: Option<String>,
	/// One entry per capture name, in request order. Empty when the run failed.
	pub captured_bindings: IndexMap<String, Value>,
	pub console: Vec<ConsoleLine>,
}

impl ExecutionOutcome {
	/// The captured value of `name`, `undefined` when it was not captured.
	pub fn binding(&self, name: &str) -> Value {
		self.captured_bindings.get(name).cloned().unwrap_or(Value::Undefined)
	}

	fn failed(error: ScriptError, console: Vec<ConsoleLine>) -> Self {
		Self {
			succeeded: false,
			return_value: None,
			failure: Some(error.to_string()),
			captured_bindings: IndexMap::new(),
			console,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Runner {
	config: RunnerConfig,
	host: Host,
}

impl Runner {
	pub fn new(config: RunnerConfig, host: Host) -> Self {
		Self { config, host }
	}

	pub fn config(&self) -> &RunnerConfig {
		&self.config
	}

	pub fn host(&self) -> &Host {
		&self.host
	}

	/// Runs `source` in a fresh interpreter. Nothing survives between calls.
	pub async fn execute(&self, source: &str, context: &IndexMap<String, Value>, capture_names: &[&str]) -> ExecutionOutcome {
		let interpreter = Interpreter::new(self.config.max_call_depth);
		self.host.install(interpreter.globals());

		let result = self.run_script(&interpreter, source, context, capture_names).await;
		let console = interpreter.console();
		match result {
			Ok(captured_bindings) => {
				let return_value = capture_names
					.last()
					.map(|name| captured_bindings.get(*name).cloned().unwrap_or(Value::Undefined));
				debug!("Script finished; captured {:?}", captured_bindings.keys().collect::<Vec<_>>());
				ExecutionOutcome {
					succeeded: true,
					return_value,
					failure: None,
					captured_bindings,
					console,
				}
			},
			Err(error) => {
				match &error {
					ScriptError::Timeout(_) => warn!("{error}"),
					_ => info!("Script failed: {error}"),
				}
				ExecutionOutcome::failed(error, console)
			},
		}
	}

	async fn run_script(
		&self,
		interpreter: &Interpreter,
		source: &str,
		context: &IndexMap<String, Value>,
		capture_names: &[&str],
	) -> Result<IndexMap<String, Value>, ScriptError> {
		let program = parse_str(source)?;

		// The script body behaves like an async function whose parameters
		// are the context names.
		let scope = interpreter.globals().function();
		for (name, value) in context {
			scope.define(name, value.clone());
		}

		let script = interpreter.drive(interpreter.run(&program, &scope));
		let deadline = timer::sleep(self.config.timeout);
		pin_mut!(script, deadline);

		// Losing the race drops the script future, which cancels it at its
		// current suspension point.
		match future::select(script, deadline).await {
			Either::Left((Ok(_), _)) => Ok(capture(&scope, capture_names)),
			Either::Left((Err(thrown), _)) => Err(ScriptError::Thrown(thrown.to_display_string())),
			Either::Right(_) => Err(ScriptError::Timeout(self.config.timeout)),
		}
	}
}

/// Reads each name through the script scope, then globals. Unknown names are `undefined`.
fn capture(scope: &Scope, names: &[&str]) -> IndexMap<String, Value> {
	names
		.iter()
		.map(|name| (name.to_string(), scope.lookup(name).unwrap_or(Value::Undefined)))
		.collect()
}

/// Runs `source` with the default host and call depth.
pub async fn execute(
	source: &str,
	context: &IndexMap<String, Value>,
	capture_names: &[&str],
	timeout: Duration,
) -> ExecutionOutcome {
	let config = RunnerConfig {
		timeout,
		..RunnerConfig::default()
	};
	Runner::new(config, Host::default()).execute(source, context, capture_names).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;
	use std::time::Instant;

	fn run(source: &str, captures: &[&str]) -> ExecutionOutcome {
		block_on(execute(source, &IndexMap::new(), captures, DEFAULT_TIMEOUT))
	}

	#[test]
	fn captures_exactly_the_requested_names() {
		let outcome = run("const x = 1 + 1;", &["x", "y"]);
		assert!(outcome.succeeded);
		assert_eq!(outcome.captured_bindings.keys().collect::<Vec<_>>(), ["x", "y"]);
		assert_eq!(outcome.binding("x"), Value::Number(2.0));
		assert_eq!(outcome.binding("y"), Value::Undefined);
		assert_eq!(outcome.return_value, Some(Value::Undefined));
		assert!(outcome.failure.is_none());
	}

	#[test]
	fn thrown_error_fails_the_run() {
		let outcome = run("const a = 1;\nthrow new Error(\"boom\");", &["a"]);
		assert!(!outcome.succeeded);
		assert!(outcome.failure.as_deref().is_some_and(|f| f.contains("boom")));
		assert!(outcome.captured_bindings.is_empty());
		assert!(outcome.return_value.is_none());
	}

	#[test]
	fn rejected_await_fails_the_run() {
		let outcome = run("await Promise.reject(new TypeError('nope'));", &[]);
		assert_eq!(outcome.failure.as_deref(), Some("TypeError: nope"));
	}

	#[test]
	fn non_error_throw_is_stringified() {
		let outcome = run("throw 'plain text';", &[]);
		assert_eq!(outcome.failure.as_deref(), Some("plain text"));
	}

	#[test]
	fn never_settling_script_times_out() {
		let started = Instant::now();
		let outcome = block_on(execute(
			"await new Promise(() => {});",
			&IndexMap::new(),
			&["x"],
			Duration::from_millis(50),
		));
		assert!(started.elapsed() < Duration::from_secs(2));
		assert!(!outcome.succeeded);
		assert_eq!(outcome.failure.as_deref(), Some("Code execution timed out after 50ms"));
		assert!(outcome.captured_bindings.is_empty());
	}

	#[test]
	fn busy_loop_times_out() {
		let outcome = block_on(execute("let n = 0; while (true) { n++; }", &IndexMap::new(), &[], Duration::from_millis(50)));
		assert_eq!(outcome.failure.as_deref(), Some("Code execution timed out after 50ms"));
	}

	#[test]
	fn runaway_allocations_fail_the_run() {
		let outcome = run("const s = 'ab'.repeat(1e19);", &["s"]);
		assert!(!outcome.succeeded);
		assert_eq!(outcome.failure.as_deref(), Some("RangeError: Invalid string length"));

		let outcome = run("const a = [];\na[4294967294] = 1;", &["a"]);
		assert_eq!(outcome.failure.as_deref(), Some("RangeError: Invalid array length"));

		let outcome = run("const s = 'x'.padEnd(1e12, '-');", &[]);
		assert_eq!(outcome.failure.as_deref(), Some("RangeError: Invalid string length"));
	}

	#[test]
	fn large_integers_print_in_full() {
		let outcome = run("const s = `${1e20}`;", &["s"]);
		assert_eq!(outcome.binding("s"), Value::string("100000000000000000000"));
	}

	#[test]
	fn syntax_errors_fail_like_runtime_errors() {
		let outcome = run("const results = ", &["results"]);
		assert!(!outcome.succeeded);
		assert!(outcome.failure.as_deref().is_some_and(|f| f.starts_with("SyntaxError")));
	}

	#[test]
	fn context_values_are_free_variables() {
		let context = IndexMap::from([("leafMail".to_string(), Value::string("bonjour"))]);
		let outcome = block_on(execute(
			"const loud = leafMail.toUpperCase();",
			&context,
			&["loud", "leafMail"],
			DEFAULT_TIMEOUT,
		));
		assert_eq!(outcome.binding("loud"), Value::string("BONJOUR"));
		assert_eq!(outcome.return_value, Some(Value::string("bonjour")));
	}

	#[test]
	fn runs_do_not_share_state() {
		assert!(run("counter = 1;", &["counter"]).binding("counter") == Value::Number(1.0));
		let second = run("const seen = typeof counter;", &["seen"]);
		assert_eq!(second.binding("seen"), Value::string("undefined"));
	}

	#[test]
	fn early_return_still_captures() {
		let outcome = run("const a = 1;\nreturn;\nconst b = 2;", &["a", "b"]);
		assert!(outcome.succeeded);
		assert_eq!(outcome.binding("a"), Value::Number(1.0));
		assert_eq!(outcome.binding("b"), Value::Undefined);
	}

	#[test]
	fn console_output_is_kept_on_failure() {
		let outcome = run("console.log('before');\nnull.x;", &[]);
		assert!(!outcome.succeeded);
		assert_eq!(outcome.console.len(), 1);
		assert_eq!(outcome.console[0].text, "before");
		assert!(outcome.failure.as_deref().is_some_and(|f| f.starts_with("TypeError: Cannot read properties of null")));
	}

	#[test]
	fn capture_can_name_host_globals() {
		let outcome = run("", &["LanguageDetector", "Writer"]);
		assert_eq!(outcome.binding("LanguageDetector").type_of(), "function");
		assert_eq!(outcome.binding("Writer"), Value::Undefined);
	}

	#[test]
	fn outcome_serializes_to_camel_case() {
		let outcome = run("const list = [1, 'a'];", &["list"]);
		let json = serde_json::to_value(&outcome).unwrap();
		assert_eq!(json["succeeded"], true);
		assert_eq!(json["capturedBindings"]["list"], serde_json::json!([1, "a"]));
		assert_eq!(json["returnValue"], serde_json::json!([1, "a"]));
	}
}
