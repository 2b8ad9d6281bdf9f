//! The level catalog: ten challenges grouped by the API they teach.

mod detector;
mod summarizer;
mod translator;

use std::sync::OnceLock;

use indexmap::IndexMap;
use serde::Serialize;

use crate::{host::ApiKind, validator::ScoreFn, value::Value};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
	pub id: u32,
	pub title: &'static str,
	pub api: ApiKind,
	pub total_steps: usize,
	/// Markdown shown next to the editor.
	pub instructions: &'static str,
	pub starter_code: &'static str,
	#[serde(skip)]
	pub solution: &'static str,
	/// Free variables injected into the script, as string values.
	#[serde(skip)]
	pub context: &'static [(&'static str, &'static str)],
	#[serde(skip)]
	pub capture_names: &'static [&'static str],
	#[serde(skip)]
	pub score: ScoreFn,
}

impl Level {
	pub fn context_bindings(&self) -> IndexMap<String, Value> {
		self.context
			.iter()
			.map(|(name, value)| (name.to_string(), Value::string(*value)))
			.collect()
	}
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Every level in play order.
pub fn all() -> &'static [Level] {
	static LEVELS: OnceLock<Vec<Level>> = OnceLock::new();
	LEVELS.get_or_init(|| {
		let mut levels = Vec::with_capacity(10);
		levels.extend_from_slice(&detector::LEVELS);
		levels.extend_from_slice(&translator::LEVELS);
		levels.extend_from_slice(&summarizer::LEVELS);
		levels
	})
}

pub fn by_id(id: u32) -> Option<&'static Level> {
	all().iter().find(|level| level.id == id)
}

pub fn first() -> &'static Level {
	&all()[0]
}

pub fn next_after(id: u32) -> Option<&'static Level> {
	let index = all().iter().position(|level| level.id == id)?;
	all().get(index + 1)
}

pub fn total() -> usize {
	all().len()
}

pub fn is_last(id: u32) -> bool {
	all().last().is_some_and(|level| level.id == id)
}

// ---------------------------------------------------------------------------
// Rubric helpers
// ---------------------------------------------------------------------------

/// `text.split(/[.!?]+/)` with the blank pieces dropped.
fn sentence_count(text: &str) -> usize {
	text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count()
}

fn word_count(text: &str) -> usize {
	text.split_whitespace().count()
}

fn non_empty_str(value: &Value) -> Option<&str> {
	value.as_str().filter(|s| !s.is_empty())
}

fn prefix(text: &str, chars: usize) -> String {
	text.chars().take(chars).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		host::{Host, HostConfig},
		runner::{Runner, RunnerConfig},
		validator::{ValidationResult, validate},
	};
	use futures::executor::block_on;

	fn score(level: &Level, source: &str, experimental_apis: bool) -> ValidationResult {
		let host = Host::new(HostConfig {
			experimental_apis,
			..HostConfig::default()
		});
		let runner = Runner::new(RunnerConfig::default(), host);
		let outcome = block_on(runner.execute(source, &level.context_bindings(), level.capture_names));
		validate(level, source, &outcome)
	}

	#[test]
	fn catalog_is_ordered_and_unique() {
		let ids: Vec<u32> = all().iter().map(|l| l.id).collect();
		assert_eq!(ids, (1..=10).collect::<Vec<_>>());
		assert_eq!(total(), 10);
		assert_eq!(first().title, "System Boot");
		assert_eq!(next_after(3).map(|l| l.title), Some("The European Link"));
		assert!(next_after(10).is_none());
		assert!(is_last(10));
		assert!(!is_last(9));
		assert!(by_id(11).is_none());
	}

	#[test]
	fn levels_carry_their_api() {
		assert_eq!(by_id(2).map(|l| l.api), Some(ApiKind::LanguageDetector));
		assert_eq!(by_id(6).map(|l| l.api), Some(ApiKind::Translator));
		assert_eq!(by_id(9).map(|l| l.api), Some(ApiKind::Summarizer));
	}

	#[test]
	fn every_solution_completes_its_level() {
		for level in all() {
			let result = score(level, level.solution, true);
			assert!(result.is_complete(), "level {}: {}", level.id, result.feedback());
			assert_eq!(result.feedback().lines().count(), level.total_steps);
			assert!(result.feedback().lines().all(|line| line.starts_with('✓')));
		}
	}

	#[test]
	fn no_starter_code_completes_its_level() {
		for level in all() {
			let result = score(level, level.starter_code, false);
			assert!(!result.is_complete(), "level {} starter completed", level.id);
			assert_eq!(result.total_steps(), level.total_steps);
		}
	}

	#[test]
	fn scoring_is_deterministic() {
		for level in all() {
			let first = score(level, level.solution, true);
			let second = score(level, level.solution, true);
			assert_eq!(first, second, "level {}", level.id);
		}
	}

	#[test]
	fn instructions_describe_the_challenge() {
		for level in all() {
			assert!(level.instructions.contains("### Challenge Instructions"), "level {}", level.id);
			assert!(level.instructions.contains("### Expected Output"), "level {}", level.id);
		}
	}

	#[test]
	fn context_becomes_string_bindings() {
		let level = Level {
			context: &[("leafMail", "Bonjour")],
			..*first()
		};
		assert_eq!(level.context_bindings().get("leafMail"), Some(&Value::string("Bonjour")));
		assert!(first().context_bindings().is_empty());
	}

	#[test]
	fn metadata_serializes_without_internals() {
		let json = serde_json::to_value(first()).unwrap();
		assert_eq!(json["id"], 1);
		assert_eq!(json["totalSteps"], 2);
		assert!(json.get("solution").is_none());
	}

	#[test]
	fn sentence_and_word_counts() {
		assert_eq!(sentence_count("One. Two! Three?"), 3);
		assert_eq!(sentence_count("No terminal"), 1);
		assert_eq!(sentence_count("..."), 0);
		assert_eq!(word_count("  a b\tc "), 3);
	}
}
