use super::Level;
use crate::{
	host::ApiKind,
	runner::ExecutionOutcome,
	validator::{Rubric, ScoringError, ValidationResult, captured},
};

pub(super) const LEVELS: [Level; 3] = [
	Level {
		id: 1,
		title: "System Boot",
		api: ApiKind::LanguageDetector,
		total_steps: 2,
		instructions: SYSTEM_BOOT_INSTRUCTIONS,
		starter_code: r#"// Check if Babel's Sensor Array is ready!
const availability = await LanguageDetector.______________;
let detector;

if (availability === 'available') {
  // Activate the Sensor Array module
  detector = await __________________________;
}
"#,
		solution: r#"const availability = await LanguageDetector.availability();
let detector;

if (availability === 'available') {
  detector = await LanguageDetector.create();
}
"#,
		context: &[],
		capture_names: &["detector", "availability"],
		score: score_system_boot,
	},
	Level {
		id: 2,
		title: "The Sorting Office",
		api: ApiKind::LanguageDetector,
		total_steps: 3,
		instructions: SORTING_OFFICE_INSTRUCTIONS,
		starter_code: r#"// The mysterious Leaf-Mail that arrived today
const leafMail = "Bonjour Scribe! Comment vas-tu?";

// 1. Create the language detector
const detector = await LanguageDetector.create();

// 2. Detect the language of leafMail
const results = // Your code here
"#,
		solution: r#"const leafMail = "Bonjour Scribe! Comment vas-tu?";
const detector = await LanguageDetector.create();
const results = await detector.detect(leafMail);
"#,
		context: &[],
		capture_names: &["detector", "results"],
		score: score_sorting_office,
	},
	Level {
		id: 3,
		title: "Multi-Channel",
		api: ApiKind::LanguageDetector,
		total_steps: 4,
		instructions: MULTI_CHANNEL_INSTRUCTIONS,
		starter_code: r#"// Multi-channel data packet with mixed languages
const multiChannelPacket = "Hello! ¿Cómo estás? System status update available at the main console.";

// 1. Activate the language detector
const detector = await LanguageDetector.create();

// 2. Analyze the packet for all languages
const results = ______________

// 3. Find the primary language (highest confidence)
const primaryLanguage = ______________
"#,
		solution: r#"const multiChannelPacket = "Hello! ¿Cómo estás? System status update available at the main console.";
const detector = await LanguageDetector.create();
const results = await detector.detect(multiChannelPacket);
const primaryLanguage = results[0].detectedLanguage;
console.log(`Primary channel: ${primaryLanguage}`);
"#,
		context: &[],
		capture_names: &["detector", "results", "primaryLanguage"],
		score: score_multi_channel,
	},
];

const SYSTEM_BOOT_INSTRUCTIONS: &str = r#"
### Waking the Sensor Array

Babel's **Sensor Array** reads incoming packets and names their language. Activating it before the module has loaded crashes the relay, so the first job of every shift is a readiness check.

### Challenge Instructions

1. Ask `LanguageDetector.availability()` whether the module is ready and `await` the answer.
2. Only when the answer is `'available'`, create the detector with `LanguageDetector.create()`.

> **Note:** Checking availability first is how real on-device features degrade gracefully.

### Expected Output

`detector` holds a LanguageDetector instance with a `detect` method.
"#;

const SORTING_OFFICE_INSTRUCTIONS: &str = r#"
### The Sorting Office

A Leaf-Mail has landed on the sorting desk and nobody can tell which region sent it. The detector can.

### Challenge Instructions

1. Create a detector with `LanguageDetector.create()`.
2. Pass `leafMail` to `detector.detect(...)` and `await` the ranking.

### Expected Output

`results` is an array of `{ detectedLanguage, confidence }` entries, most likely language first.
"#;

const MULTI_CHANNEL_INSTRUCTIONS: &str = r#"
### Crossed Channels

Some packets carry more than one language at once. Babel needs the full breakdown, and the dominant channel decides where the packet is routed.

### Challenge Instructions

1. Create the detector.
2. Run `detector.detect(multiChannelPacket)` and keep every result.
3. Store the top-ranked `detectedLanguage` in `primaryLanguage`.

### Expected Output

`results` lists each language with a confidence score and `primaryLanguage` matches the first entry.
"#;

fn score_system_boot(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let detector = captured(outcome, "detector")?;
	let compares_available = ["=== 'available'", "=== \"available\"", "== 'available'", "== \"available\""]
		.iter()
		.any(|pattern| source.contains(pattern));

	Rubric::new(2)
		.check(
			source.contains("LanguageDetector.availability()") && compares_available,
			"Availability check implemented correctly",
			"Check availability with LanguageDetector.availability() and compare to 'available'",
		)
		.check(
			detector.has_method("detect"),
			"Detector created successfully inside the availability check",
			"Create the detector using LanguageDetector.create() when available",
		)
		.sample_output(&detector)
		.finish()
}

fn score_sorting_office(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let detector = captured(outcome, "detector")?;
	let results = captured(outcome, "results")?;
	let ranked = results
		.as_array()
		.and_then(|items| items.first().cloned())
		.is_some_and(|top| top.has_key("detectedLanguage"));

	Rubric::new(3)
		.check(
			source.contains("LanguageDetector.availability") || source.contains("LanguageDetector.create"),
			"LanguageDetector API usage detected",
			"Use LanguageDetector.create() to create a detector",
		)
		.check(
			detector.has_method("detect"),
			"Detector instance created successfully",
			"The detector variable should be a LanguageDetector instance",
		)
		.check(ranked, "Language detected successfully!", "Call detector.detect(leafMail) to get the results")
		.sample_output(&results)
		.finish()
}

fn score_multi_channel(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let detector = captured(outcome, "detector")?;
	let results = captured(outcome, "results")?;
	let primary = captured(outcome, "primaryLanguage")?;

	let items = results.as_array().unwrap_or_default();
	let top = items.first();
	let well_formed = top.is_some_and(|top| top.has_key("detectedLanguage") && top.has_key("confidence"));

	let mut rubric = Rubric::new(4);
	rubric
		.check(
			source.contains("LanguageDetector.create"),
			"LanguageDetector API activated",
			"Use LanguageDetector.create() to initialize the detector",
		)
		.check(
			detector.has_method("detect"),
			"Multi-channel detector instance created",
			"The detector variable should be a LanguageDetector instance",
		)
		.check(
			well_formed,
			format!("Detected {} language(s) in the packet", items.len()),
			"Call detector.detect(multiChannelPacket) to analyze the packet",
		);

	match (super::non_empty_str(&primary), top) {
		(Some(language), Some(top)) => {
			let matches = top.get_key("detectedLanguage").is_some_and(|d| d.as_str() == Some(language));
			rubric.check(
				matches,
				format!("Primary language identified correctly: \"{language}\""),
				"primaryLanguage should be the language with the highest confidence score",
			)
		},
		_ => rubric.check(false, "", "Extract the primary language from the highest confidence result"),
	};

	rubric.sample_output(&primary).finish()
}
