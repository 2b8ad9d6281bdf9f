//! Scoring of an [`ExecutionOutcome`] against a level's rubric.

use std::panic::{self, AssertUnwindSafe};

use log::{error, info};
use serde::Serialize;
use thiserror::Error;

use crate::{levels::Level, runner::ExecutionOutcome, value::Value};

pub const EXECUTION_FAILED: &str = "Code execution failed. Check for errors.";
pub const PASS_MARK: char = '✓';
pub const HINT_MARK: char = '○';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
	steps_completed: usize,
	total_steps: usize,
	is_complete: bool,
	feedback: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	sample_output: Option<String>,
}

impl ValidationResult {
	/// Zero progress with a single feedback message.
	pub fn failure(total_steps: usize, message: impl Into<String>) -> Self {
		Self {
			steps_completed: 0,
			total_steps,
			is_complete: false,
			feedback: message.into(),
			sample_output: None,
		}
	}

	/// Full marks, used when a level is restored from saved progress.
	pub fn complete(total_steps: usize, feedback: impl Into<String>) -> Self {
		Self {
			steps_completed: total_steps,
			total_steps,
			is_complete: true,
			feedback: feedback.into(),
			sample_output: None,
		}
	}

	pub fn steps_completed(&self) -> usize {
		self.steps_completed
	}

	pub fn total_steps(&self) -> usize {
		self.total_steps
	}

	pub fn is_complete(&self) -> bool {
		self.is_complete
	}

	pub fn feedback(&self) -> &str {
		&self.feedback
	}

	pub fn sample_output(&self) -> Option<&str> {
		self.sample_output.as_deref()
	}
}

/// A fault in a level's scoring function, never in the player's code.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
	#[error("'{0}' is not one of the level's capture names")]
	MissingCapture(String),
	#[error("rubric checked {checked} criteria but the level declares {declared}")]
	StepCount { checked: usize, declared: usize },
	#[error("{0}")]
	Invalid(String),
	#[error("scoring panicked: {0}")]
	Panicked(String),
}

pub type ScoreFn = fn(&str, &ExecutionOutcome) -> Result<ValidationResult, ScoringError>;

/// Builds a [`ValidationResult`] one criterion at a time.
///
/// Every call to [`Rubric::check`] adds exactly one feedback line, so partial
/// credit always reflects every criterion that was satisfied.
#[derive(Debug)]
pub struct Rubric {
	total_steps: usize,
	steps_completed: usize,
	lines: Vec<String>,
	sample_output: Option<String>,
}

impl Rubric {
	pub fn new(total_steps: usize) -> Self {
		Self {
			total_steps,
			steps_completed: 0,
			lines: Vec::with_capacity(total_steps),
			sample_output: None,
		}
	}

	pub fn check(&mut self, passed: bool, pass_text: impl AsRef<str>, hint_text: impl AsRef<str>) -> &mut Self {
		if passed {
			self.steps_completed += 1;
			self.lines.push(format!("{PASS_MARK} {}", pass_text.as_ref()));
		} else {
			self.lines.push(format!("{HINT_MARK} {}", hint_text.as_ref()));
		}
		self
	}

	/// Shows `value` to the player next to the feedback. `undefined` is ignored.
	pub fn sample_output(&mut self, value: &Value) -> &mut Self {
		self.sample_output = match value {
			Value::Undefined => None,
			Value::Str(s) => Some(s.clone()),
			other => Some(other.inspect()),
		};
		self
	}

	pub fn finish(&mut self) -> Result<ValidationResult, ScoringError> {
		if self.lines.len() != self.total_steps {
			return Err(ScoringError::StepCount {
				checked: self.lines.len(),
				declared: self.total_steps,
			});
		}
		Ok(ValidationResult {
			steps_completed: self.steps_completed,
			total_steps: self.total_steps,
			is_complete: self.steps_completed == self.total_steps,
			feedback: self.lines.join("\n"),
			sample_output: self.sample_output.take(),
		})
	}
}

/// Looks up a captured binding, treating a name the level never asked for as
/// a scoring bug rather than `undefined`.
pub fn captured(outcome: &ExecutionOutcome, name: &str) -> Result<Value, ScoringError> {
	outcome
		.captured_bindings
		.get(name)
		.cloned()
		.ok_or_else(|| ScoringError::MissingCapture(name.to_string()))
}

/// Scores `outcome` for `level`. Never panics and never returns an error:
/// every failure becomes a zero-progress result.
pub fn validate(level: &Level, source: &str, outcome: &ExecutionOutcome) -> ValidationResult {
	if !outcome.succeeded {
		let message = outcome.failure.as_deref().filter(|m| !m.is_empty()).unwrap_or(EXECUTION_FAILED);
		return ValidationResult::failure(level.total_steps, message);
	}

	let score = level.score;
	let scored = panic::catch_unwind(AssertUnwindSafe(|| score(source, outcome)))
		.unwrap_or_else(|payload| Err(ScoringError::Panicked(panic_message(payload.as_ref()))));

	let result = scored.and_then(|result| {
		if result.total_steps == level.total_steps {
			Ok(result)
		} else {
			Err(ScoringError::StepCount {
				checked: result.total_steps,
				declared: level.total_steps,
			})
		}
	});

	match result {
		Ok(result) => {
			info!(
				"Level {} scored {}/{}{}",
				level.id,
				result.steps_completed,
				result.total_steps,
				if result.is_complete { " (complete)" } else { "" }
			);
			result
		},
		Err(fault) => {
			error!("Scoring level {} failed: {fault}", level.id);
			ValidationResult::failure(level.total_steps, format!("Scoring failed. Validation error: {fault}"))
		},
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{host::ApiKind, runner::execute, runner::DEFAULT_TIMEOUT};
	use futures::executor::block_on;
	use indexmap::IndexMap;

	fn three_criteria(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
		let x = captured(outcome, "x")?;
		let label = captured(outcome, "label")?;
		Rubric::new(3)
			.check(source.contains("const x"), "x declared", "Declare x")
			.check(label.as_str().is_some_and(|s| !s.is_empty()), "label set", "Set label to a non-empty string")
			.check(x.as_number() == Some(2.0), "x is two", "x should be 2")
			.sample_output(&x)
			.finish()
	}

	fn wrong_capture(_: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
		captured(outcome, "nope")?;
		Rubric::new(3).finish()
	}

	fn short_rubric(_: &str, _: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
		Rubric::new(2).check(true, "one", "one").check(true, "two", "two").finish()
	}

	fn panicking(_: &str, _: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
		panic!("rubric bug")
	}

	fn test_level(score: ScoreFn) -> Level {
		Level {
			id: 99,
			title: "Test",
			api: ApiKind::LanguageDetector,
			total_steps: 3,
			instructions: "",
			starter_code: "",
			solution: "",
			context: &[],
			capture_names: &["label", "x"],
			score,
		}
	}

	fn run(level: &Level, source: &str) -> ValidationResult {
		let outcome = block_on(execute(source, &IndexMap::new(), level.capture_names, DEFAULT_TIMEOUT));
		validate(level, source, &outcome)
	}

	#[test]
	fn partial_credit_counts_every_criterion() {
		let result = run(&test_level(three_criteria), "const x = 1 + 1;");
		assert_eq!(result.steps_completed(), 2);
		assert_eq!(result.total_steps(), 3);
		assert!(!result.is_complete());
		let lines: Vec<&str> = result.feedback().lines().collect();
		assert_eq!(lines, ["✓ x declared", "○ Set label to a non-empty string", "✓ x is two"]);
		assert_eq!(result.sample_output(), Some("2"));
	}

	#[test]
	fn all_criteria_complete_the_level() {
		let result = run(&test_level(three_criteria), "const x = 2;\nconst label = 'two';");
		assert_eq!(result.steps_completed(), 3);
		assert!(result.is_complete());
	}

	#[test]
	fn execution_failure_skips_the_rubric() {
		let result = run(&test_level(panicking), "throw new Error(\"boom\");");
		assert_eq!(result.steps_completed(), 0);
		assert!(!result.is_complete());
		assert!(result.feedback().contains("boom"));
	}

	#[test]
	fn missing_failure_message_uses_fallback() {
		let outcome = ExecutionOutcome::default();
		let result = validate(&test_level(three_criteria), "", &outcome);
		assert_eq!(result.feedback(), EXECUTION_FAILED);
	}

	#[test]
	fn scoring_faults_are_contained() {
		let panicked = run(&test_level(panicking), "const x = 2;");
		assert_eq!(panicked.steps_completed(), 0);
		assert_eq!(panicked.feedback(), "Scoring failed. Validation error: scoring panicked: rubric bug");

		let missing = run(&test_level(wrong_capture), "const x = 2;");
		assert!(missing.feedback().contains("'nope' is not one of the level's capture names"));

		let short = run(&test_level(short_rubric), "const x = 2;");
		assert!(!short.is_complete());
		assert!(short.feedback().starts_with("Scoring failed."));
	}

	#[test]
	fn rubric_rejects_wrong_line_count() {
		let err = Rubric::new(2).check(true, "only", "only").finish().unwrap_err();
		assert_eq!(err, ScoringError::StepCount { checked: 1, declared: 2 });
	}

	#[test]
	fn result_serializes_to_camel_case() {
		let json = serde_json::to_value(ValidationResult::complete(4, "done")).unwrap();
		assert_eq!(json["stepsCompleted"], 4);
		assert_eq!(json["isComplete"], true);
		assert!(json.get("sampleOutput").is_none());
	}
}
