use super::{Level, non_empty_str, prefix, sentence_count, word_count};
use crate::{
	host::ApiKind,
	runner::ExecutionOutcome,
	validator::{Rubric, ScoringError, ValidationResult, captured},
};

// Packet texts, spliced into both starter and solution with `concat!`.
macro_rules! error_log {
	() => {
		"
[ERROR] 2024-01-15 03:47:22.123Z MainDB-Shard-01 Connection pool exhausted
[ERROR] 2024-01-15 03:47:23.456Z Auth-Service: Failed to acquire connection
[ERROR] 2024-01-15 03:47:24.789Z User-API-V2: Database unavailable
[ERROR] 2024-01-15 03:47:25.012Z Cache-Layer: Fallback failed, no data available
[CRITICAL] 2024-01-15 03:47:26.345Z MainDB-Shard-02 Connection timeout after 30s retry
[CRITICAL] 2024-01-15 03:47:27.678Z ALL-DATABASES: Master node unresponsive
[ERROR] 2024-01-15 03:47:28.901Z Session-Manager: Authentication blocked
[PANIC] 2024-01-15 03:47:29.234Z Load-Balancer: All active db connections terminated
Stack trace: Could not establish connection pool within timeout window
Details: All database shards (01-16) reporting connection refused
Impact: 100% of users unable to authenticate, system in full outage
Recovery: Automatic failover to standby cluster initiated...
"
	};
}

macro_rules! technical_docs {
	() => {
		"
## System Architecture Overview

The cloud infrastructure is built on a microservices architecture with 12 independent services distributed across 3 geographic regions. Each service has its own database to ensure resilience and independent scaling. The system is designed to handle up to 100,000 concurrent users with automatic failover mechanisms.

### Hardware Requirements

**Minimum Requirements:**
- RAM: 16 GB per node (32 GB recommended for production)
- CPU: 4 cores minimum (8 cores recommended)
- Storage: 500 GB SSD per service instance
- Network: 1 Gbps minimum connection speed

**Recommended Setup:**
- RAM: 32-64 GB per node
- CPU: 8+ cores with hyperthreading
- Storage: 2 TB NVMe for optimal performance
- Network: 10 Gbps for inter-cluster communication

### Security Protocols

All communication between services uses OAuth2 with JWT tokens. User authentication is handled by a centralized identity service with 2FA support. Data at rest is encrypted with AES-256, and data in transit uses TLS 1.3. Regular security audits are conducted quarterly.

### Backup and Recovery

Automated backups run every 6 hours to geographically distributed locations. Recovery Time Objective (RTO) is 15 minutes and Recovery Point Objective (RPO) is 6 hours. All backups are tested monthly for integrity and recoverability. The disaster recovery plan is reviewed and updated twice yearly.
"
	};
}

macro_rules! blog_content {
	() => {
		"
Title: How We Scaled to a Billion Requests Per Day

In this post, we'll share the incredible journey of how our startup grew from
a small team of 5 engineers to a company handling over 1 billion API requests
daily. When we started, nobody believed we could compete with the established
cloud giants. But through innovation, perseverance, and some unconventional
architectural decisions, we not only survived, we thrived.

Our early days were filled with technical debt and quick fixes. We had to
choose between moving fast and keeping the code clean. We chose speed, knowing
we'd pay the price later. But \"later\" came sooner than we expected. By the time
we had 10 million users, our infrastructure was groaning under the strain.

The turning point came when we made the bold decision to completely rewrite our
core services from scratch. This wasn't a decision made lightly: it meant 6 months
of intensive development with zero new features shipped to customers. But the
payoff was enormous. Our latency dropped by 60%, and our infrastructure cost
decreased by 40%.

We discovered the power of breaking monoliths into microservices, implementing
intelligent caching strategies, and building our own specialized databases
optimized for our specific use cases. Each decision was made with real data and
careful measurement.

Today, we handle more traffic than entire Fortune 500 companies combined, and we
do it with a lean team. This post is a deep dive into the architectural choices
that got us here, the lessons we learned along the way, and the surprising
insights that changed how we think about infrastructure.
"
	};
}

pub(super) const LEVELS: [Level; 4] = [
	Level {
		id: 7,
		title: "The Log Vacuum",
		api: ApiKind::Summarizer,
		total_steps: 4,
		instructions: LOG_VACUUM_INSTRUCTIONS,
		starter_code: concat!(
			"// Massive server error log that needs compression\nconst errorLog = `",
			error_log!(),
			"`;\n\n// 1. Activate the summarizer with headline type\nconst summarizer = ______________\n\n",
			"// 2. Process the error log to extract the headline\nconst summary = ______________\n"
		),
		solution: concat!(
			"const errorLog = `",
			error_log!(),
			"`;\nconst summarizer = await Summarizer.create({ type: 'headline', length: 'short' });\n",
			"const summary = await summarizer.summarize(errorLog);\n"
		),
		context: &[],
		capture_names: &["summarizer", "summary"],
		score: score_log_vacuum,
	},
	Level {
		id: 8,
		title: "The Executive Summary",
		api: ApiKind::Summarizer,
		total_steps: 5,
		instructions: EXECUTIVE_SUMMARY_INSTRUCTIONS,
		starter_code: concat!(
			"// Long technical documentation packet\nconst technicalDocs = `",
			technical_docs!(),
			"`;\n\n// 1. Create the TL;DR summarizer\nconst summarizer = ______________\n\n",
			"// 2. Generate the TL;DR summary\nconst summary = ______________\n"
		),
		solution: concat!(
			"const technicalDocs = `",
			technical_docs!(),
			"`;\nconst summarizer = await Summarizer.create({ type: 'tldr', format: 'plain-text', length: 'short' });\n",
			"const summary = await summarizer.summarize(technicalDocs, {\n",
			"  context: 'The reader is an executive deciding whether the architecture is resilient.',\n",
			"});\n"
		),
		context: &[],
		capture_names: &["summarizer", "summary"],
		score: score_executive_summary,
	},
	Level {
		id: 9,
		title: "Teaser Mode",
		api: ApiKind::Summarizer,
		total_steps: 5,
		instructions: TEASER_INSTRUCTIONS,
		starter_code: concat!(
			"// Blog post content that needs an engaging teaser\nconst blogContent = `",
			blog_content!(),
			"`;\n\n// 1. Initialize the teaser generator\nconst summarizer = ______________\n\n",
			"// 2. Generate an engaging teaser\nconst teaser = ______________\n"
		),
		solution: concat!(
			"const blogContent = `",
			blog_content!(),
			"`;\nconst summarizer = await Summarizer.create({\n",
			"  type: 'teaser',\n",
			"  length: 'short',\n",
			"  sharedContext: 'An engineering blog read by startup founders.',\n",
			"});\n",
			"const teaser = await summarizer.summarize(blogContent);\n"
		),
		context: &[],
		capture_names: &["summarizer", "teaser"],
		score: score_teaser,
	},
	Level {
		id: 10,
		title: "Decoding the Upgrade Manual",
		api: ApiKind::Summarizer,
		total_steps: 5,
		instructions: UPGRADE_MANUAL_INSTRUCTIONS,
		starter_code: r#"// No code to write for this level!
// This is a system configuration verification level.
// After enabling the experimental APIs and restarting,
// Babel will automatically check if the APIs are available.
"#,
		solution: r#"// Experimental APIs enabled; confirm the new modules answer.
const writerStatus = await Writer.availability();
console.log(`Writer: ${writerStatus}`);
"#,
		context: &[],
		capture_names: &["Writer", "Rewriter", "Proofreader", "LanguageModel"],
		score: score_upgrade_manual,
	},
];

const LOG_VACUUM_INSTRUCTIONS: &str = r#"
### The Log Vacuum

The main database cluster just went down and the error log is scrolling faster than anyone can read. On-call engineers need one line that says what broke.

### Challenge Instructions

1. Create a summarizer with `Summarizer.create({ type: 'headline' })`.
2. `await summarizer.summarize(errorLog)` into `summary`.

### Expected Output

`summary` is a single headline of roughly a dozen words naming the most severe failure.
"#;

const EXECUTIVE_SUMMARY_INSTRUCTIONS: &str = r#"
### The Executive Summary

Leadership wants the architecture document, but nobody on that floor will read four sections of hardware tables.

### Challenge Instructions

1. Create a summarizer with `type: 'tldr'`.
2. Summarize `technicalDocs` into `summary`.
3. *Optional:* pass `{ context: '...' }` as the second argument to say who the summary is for.

### Expected Output

`summary` is a short TL;DR of one to three sentences.
"#;

const TEASER_INSTRUCTIONS: &str = r#"
### Teaser Mode

The engineering blog needs a hook on the front page that makes readers click through without giving the whole story away.

### Challenge Instructions

1. Create a summarizer with `type: 'teaser'`.
2. Summarize `blogContent` into `teaser`.
3. *Optional:* tune it with `length`, `sharedContext` or a per-call `{ context }`.

### Expected Output

`teaser` is one or two intriguing sentences.
"#;

const UPGRADE_MANUAL_INSTRUCTIONS: &str = r#"
### Decoding the Upgrade Manual

The next modules (Writer, Rewriter, Proofreader and the Prompt API) ship behind an experimental switch. Babel cannot use them until the switch is on.

### Challenge Instructions

1. Enable the experimental APIs (`--experimental-apis` on the command line).
2. Restart and run this level again. There is no code to write.

### Expected Output

All four experimental modules report as available.
"#;

fn score_log_vacuum(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let summarizer = captured(outcome, "summarizer")?;
	let summary = captured(outcome, "summary")?;

	let mut rubric = Rubric::new(4);
	rubric
		.check(
			source.contains("Summarizer.create"),
			"Summarizer API activated",
			"Use Summarizer.create({ type: 'headline' }) to initialize",
		)
		.check(
			summarizer.has_method("summarize"),
			"Log compactor instance created",
			"The summarizer variable should be a Summarizer instance",
		);

	let headline = non_empty_str(&summary);
	rubric.check(
		headline.is_some(),
		format!("Headline extracted: \"{}...\"", prefix(headline.unwrap_or_default(), 60)),
		"Call summarizer.summarize(errorLog) to extract the headline",
	);

	match headline {
		Some(text) => {
			let words = word_count(text);
			rubric.check(
				(8..=25).contains(&words),
				format!("Headline length appropriate: {words} words (target: ~12)"),
				format!("Headline should be concise (currently {words} words, target ~12)"),
			)
		},
		None => rubric.check(false, "", "Extract the headline result to verify"),
	};

	rubric.sample_output(&summary).finish()
}

fn score_executive_summary(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let summarizer = captured(outcome, "summarizer")?;
	let summary = captured(outcome, "summary")?;

	let mut rubric = Rubric::new(5);
	rubric
		.check(
			source.contains("Summarizer.create") && (source.contains("type") || source.contains("tldr")),
			"TL;DR summarizer initialized",
			"Use Summarizer.create({ type: 'tldr' }) to initialize",
		)
		.check(
			summarizer.has_method("summarize"),
			"Documentation processor instance created",
			"The summarizer variable should be a Summarizer instance",
		)
		.check(
			non_empty_str(&summary).is_some(),
			"TL;DR summary generated",
			"Call summarizer.summarize(technicalDocs) to create the TL;DR",
		);

	match non_empty_str(&summary) {
		Some(text) => {
			let sentences = sentence_count(text);
			rubric.check(
				(1..=5).contains(&sentences),
				format!("TL;DR length appropriate: {sentences} sentences"),
				format!("TL;DR should be 1-3 sentences (got {sentences})"),
			)
		},
		None => rubric.check(false, "", "Generate and extract the TL;DR summary"),
	};

	rubric
		.check(
			["{ context", "context:", "context ="].iter().any(|p| source.contains(p)),
			"Advanced: Optional context parameter handled",
			"Optional: Add context parameter for better results",
		)
		.sample_output(&summary)
		.finish()
}

fn score_teaser(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let summarizer = captured(outcome, "summarizer")?;
	let teaser = captured(outcome, "teaser")?;

	let mut rubric = Rubric::new(5);
	rubric
		.check(
			source.contains("Summarizer.create") && (source.contains("type") || source.contains("teaser")),
			"Teaser engine initialized",
			"Use Summarizer.create({ type: 'teaser' }) to initialize",
		)
		.check(
			summarizer.has_method("summarize"),
			"Teaser generator instance created",
			"The summarizer variable should be a Summarizer instance",
		)
		.check(
			non_empty_str(&teaser).is_some(),
			"Engaging teaser generated",
			"Call summarizer.summarize(blogContent) to create the teaser",
		);

	match non_empty_str(&teaser) {
		Some(text) => {
			let sentences = sentence_count(text);
			let plural = if sentences == 1 { "" } else { "s" };
			rubric.check(
				(1..=3).contains(&sentences),
				format!("Teaser length perfect: {sentences} sentence{plural}"),
				format!("Teaser should be 1-2 intriguing sentences (got {sentences})"),
			)
		},
		None => rubric.check(false, "", "Generate and extract the teaser"),
	};

	rubric
		.check(
			["{ context", "length", "sharedContext"].iter().any(|p| source.contains(p)),
			"Advanced: Optional parameters configured",
			"Optional: Customize with length or context parameters",
		)
		.sample_output(&teaser)
		.finish()
}

/// Scores the presence of the experimental globals; the player's code is not inspected.
fn score_upgrade_manual(_: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let present = |name: &str| -> Result<bool, ScoringError> { Ok(captured(outcome, name)?.type_of() == "function") };
	let writer = present("Writer")?;
	let rewriter = present("Rewriter")?;
	let proofreader = present("Proofreader")?;
	let language_model = present("LanguageModel")?;

	Rubric::new(5)
		.check(writer, "Writer API is available", "Writer API not detected.")
		.check(rewriter, "Rewriter API is available", "Rewriter API not detected.")
		.check(proofreader, "Proofreader API is available", "Proofreader API not detected.")
		.check(language_model, "Prompt API (Language Model) is available", "Prompt API not detected.")
		.check(
			writer && rewriter && proofreader,
			"On-device base model is ready",
			"Make sure the experimental APIs are enabled and Babel was restarted",
		)
		.finish()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::runner::execute;
	use futures::executor::block_on;
	use indexmap::IndexMap;
	use std::time::Duration;

	fn score(level: &Level, source: &str) -> ValidationResult {
		let outcome = block_on(execute(source, &IndexMap::new(), level.capture_names, Duration::from_secs(5)));
		(level.score)(source, &outcome).unwrap()
	}

	#[test]
	fn headline_feedback_echoes_the_summary() {
		let result = score(&LEVELS[0], LEVELS[0].solution);
		let line = result.feedback().lines().nth(2).unwrap();
		assert!(line.starts_with("✓ Headline extracted: \"Load-Balancer"), "{line}");
		assert!(line.ends_with("...\""));
	}

	#[test]
	fn long_headline_fails_only_the_length_check() {
		let source = "const summarizer = await Summarizer.create({ type: 'headline' });\n\
			const summary = 'one two three four five six seven eight nine ten eleven twelve thirteen fourteen fifteen sixteen seventeen eighteen nineteen twenty twentyone twentytwo twentythree twentyfour twentyfive twentysix';";
		let result = score(&LEVELS[0], source);
		assert_eq!(result.steps_completed(), 3);
		assert_eq!(
			result.feedback().lines().last(),
			Some("○ Headline should be concise (currently 26 words, target ~12)")
		);
	}

	#[test]
	fn optional_criterion_counts_toward_completion() {
		let source = "const summarizer = await Summarizer.create({ type: 'tldr' });\n\
			const summary = await summarizer.summarize('Short docs. Two lines.');";
		let result = score(&LEVELS[1], source);
		assert_eq!(result.steps_completed(), 4);
		assert_eq!(result.feedback().lines().last(), Some("○ Optional: Add context parameter for better results"));
	}

	#[test]
	fn teaser_reports_sentence_count() {
		let result = score(&LEVELS[2], LEVELS[2].solution);
		assert!(result.feedback().contains("✓ Teaser length perfect: 2 sentences"), "{}", result.feedback());
		assert!(result.sample_output().is_some_and(|t| t.ends_with("Read on to find out how it all came together.")));
	}

	#[test]
	fn upgrade_manual_without_flag_scores_zero() {
		let result = score(&LEVELS[3], LEVELS[3].starter_code);
		assert_eq!(result.steps_completed(), 0);
		assert_eq!(result.feedback().lines().next(), Some("○ Writer API not detected."));
	}
}
