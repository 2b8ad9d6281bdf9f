use super::{Level, non_empty_str};
use crate::{
	host::ApiKind,
	runner::ExecutionOutcome,
	validator::{Rubric, ScoringError, ValidationResult, captured},
};

const FRENCH_PACKET: &str = "Statut: Le système fonctionne nominalement. Tous les nœuds sont en ligne.";
const JAPANESE_PACKET: &str = "こんにちは、システムの状態は正常です。すべてのノードがオンラインです。";

pub(super) const LEVELS: [Level; 3] = [
	Level {
		id: 4,
		title: "The European Link",
		api: ApiKind::Translator,
		total_steps: 3,
		instructions: EUROPEAN_LINK_INSTRUCTIONS,
		starter_code: r#"// Status report received from French server node
const dataPacket = "Statut: Le système fonctionne nominalement. Tous les nœuds sont en ligne.";

// 1. Activate the Universal Bridge module with language settings
const translator = await Translator._________________;

// 2. Translate the data packet
const translatedText = await translator._________________;
"#,
		solution: r#"const dataPacket = "Statut: Le système fonctionne nominalement. Tous les nœuds sont en ligne.";
const translator = await Translator.create({ sourceLanguage: 'fr', targetLanguage: 'en' });
const translatedText = await translator.translate(dataPacket);
"#,
		context: &[],
		capture_names: &["translator", "translatedText"],
		score: score_european_link,
	},
	Level {
		id: 5,
		title: "The Asian Gateway",
		api: ApiKind::Translator,
		total_steps: 3,
		instructions: ASIAN_GATEWAY_INSTRUCTIONS,
		starter_code: r#"// Status signal from Japanese data center
const dataPacket = "こんにちは、システムの状態は正常です。すべてのノードがオンラインです。";

// 1. Activate the cross-region bridge with language settings
const translator = await Translator._________________;

// 2. Translate the signal
const translatedText = await translator._________________;
"#,
		solution: r#"const dataPacket = "こんにちは、システムの状態は正常です。すべてのノードがオンラインです。";
const status = await Translator.availability({ sourceLanguage: 'ja', targetLanguage: 'es' });
if (status !== 'available') {
  throw new Error(`Bridge offline: ${status}`);
}
const translator = await Translator.create({ sourceLanguage: 'ja', targetLanguage: 'es' });
const translatedText = await translator.translate(dataPacket);
"#,
		context: &[],
		capture_names: &["translator", "translatedText"],
		score: score_asian_gateway,
	},
	Level {
		id: 6,
		title: "Streaming Translation",
		api: ApiKind::Translator,
		total_steps: 4,
		instructions: STREAMING_INSTRUCTIONS,
		starter_code: r#"// Massive system log from the Archive
const longText = `The network infrastructure reports indicate nominal system status across all geographic regions. North American data centers show 99.97% uptime over the previous 24-hour monitoring period, with zero critical incidents recorded. European hub connectivity metrics demonstrate stable performance with average latency of 12 milliseconds. Asian-Pacific zone resilience systems activated 3 predictive failovers, successfully preventing potential service disruptions. All backup power systems tested successfully. Cooling systems operating within optimal parameters. Database replication lag measured at 0.3 seconds across all regions. Security scanning detected and quarantined 47 anomalous connection attempts. System maintenance windows completed ahead of schedule.`;

// 1. Activate the Streaming Bridge with language settings
const translator = await Translator._________________;

// 2. Initialize the translation stream
const stream = translator._________________;

// 3. Process each chunk as it arrives
________________________
"#,
		solution: r#"const longText = `The network infrastructure reports indicate nominal system status across all geographic regions. All backup power systems tested successfully. System maintenance windows completed ahead of schedule.`;
const translator = await Translator.create({ sourceLanguage: 'en', targetLanguage: 'es' });
const stream = translator.translateStreaming(longText);
let translated = '';
for await (const chunk of stream) {
  translated += chunk;
}
console.log(translated);
"#,
		context: &[],
		capture_names: &["translator", "stream"],
		score: score_streaming,
	},
];

const EUROPEAN_LINK_INSTRUCTIONS: &str = r#"
### The Universal Bridge

A status report arrived from the French server node. Babel's operators only read English, so the packet has to cross the **Universal Bridge** first.

### Challenge Instructions

1. Create a translator with `Translator.create({ sourceLanguage: 'fr', targetLanguage: 'en' })`.
2. `await translator.translate(dataPacket)` and keep the result in `translatedText`.

### Expected Output

`translatedText` holds the English version of the report.
"#;

const ASIAN_GATEWAY_INSTRUCTIONS: &str = r#"
### The Asian Gateway

The Japanese data center reports in Japanese and the Madrid relay listens in Spanish. Route the signal directly between them.

### Challenge Instructions

1. Create a translator from `'ja'` to `'es'`.
2. Translate `dataPacket` into `translatedText`.

> **Tip:** `Translator.availability(...)` takes the same language pair and tells you whether the bridge can be built.

### Expected Output

`translatedText` is the Spanish rendering of the status signal.
"#;

const STREAMING_INSTRUCTIONS: &str = r#"
### Streaming the Archive

The Archive log is long. Waiting for the whole translation stalls the relay, so Babel streams it instead and handles each piece as soon as it lands.

### Challenge Instructions

1. Create a translator with a `targetLanguage`.
2. Call `translator.translateStreaming(longText)` (no `await`) to get a stream.
3. Consume it with `for await (const chunk of stream) { ... }`.

### Expected Output

`stream` is the stream returned by `translateStreaming`, and the loop sees every chunk.
"#;

fn score_european_link(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	score_direct_route(source, outcome, DirectRoute {
		from: "'fr'",
		to: "'en'",
		original: FRENCH_PACKET,
		bridge_pass: "Translator bridge activated with language settings",
		bridge_hint: "Use Translator.create({ sourceLanguage: 'fr', targetLanguage: 'en' }) to activate the module",
		instance_pass: "Translator instance ready to process signals",
		instance_hint: "The translator variable should be a Translator instance with a translate method",
		text_pass: "French signal successfully translated to English!",
		text_hint: "Call translator.translate(dataPacket) to translate the text",
	})
}

fn score_asian_gateway(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	score_direct_route(source, outcome, DirectRoute {
		from: "'ja'",
		to: "'es'",
		original: JAPANESE_PACKET,
		bridge_pass: "Cross-region bridge activated",
		bridge_hint: "Use Translator.create({ sourceLanguage: 'ja', targetLanguage: 'es' }) to initialize the translator",
		instance_pass: "Translator instance ready for cross-region routing",
		instance_hint: "The translator variable should be a Translator instance",
		text_pass: "Japanese signal successfully translated to Spanish!",
		text_hint: "Call translator.translate(dataPacket) to bridge the nodes",
	})
}

struct DirectRoute {
	from: &'static str,
	to: &'static str,
	original: &'static str,
	bridge_pass: &'static str,
	bridge_hint: &'static str,
	instance_pass: &'static str,
	instance_hint: &'static str,
	text_pass: &'static str,
	text_hint: &'static str,
}

fn score_direct_route(source: &str, outcome: &ExecutionOutcome, route: DirectRoute) -> Result<ValidationResult, ScoringError> {
	let translator = captured(outcome, "translator")?;
	let translated = captured(outcome, "translatedText")?;

	// The source language literal has to appear before the target one.
	let ordered = match (source.find(route.from), source.find(route.to)) {
		(Some(from), Some(to)) => from < to,
		_ => false,
	};
	let configured = source.contains("Translator.create")
		&& source.contains("sourceLanguage")
		&& source.contains("targetLanguage")
		&& ordered;
	let changed = non_empty_str(&translated).is_some_and(|text| text != route.original);

	Rubric::new(3)
		.check(configured, route.bridge_pass, route.bridge_hint)
		.check(translator.has_method("translate"), route.instance_pass, route.instance_hint)
		.check(changed, route.text_pass, route.text_hint)
		.sample_output(&translated)
		.finish()
}

fn score_streaming(source: &str, outcome: &ExecutionOutcome) -> Result<ValidationResult, ScoringError> {
	let translator = captured(outcome, "translator")?;
	let consumes_stream =
		source.contains("for await") && (source.contains("of stream") || (source.contains("of") && source.contains("stream")));

	Rubric::new(4)
		.check(
			source.contains("Translator.create") && source.contains("targetLanguage"),
			"Streaming Bridge activated with language settings",
			"Use Translator.create({ targetLanguage: 'es' }) to initialize the translator",
		)
		.check(
			translator.has_method("translateStreaming"),
			"Translator instance ready for streaming",
			"The translator variable should have a translateStreaming method",
		)
		.check(
			source.contains("translateStreaming"),
			"Streaming translation initiated",
			"Call translator.translateStreaming(longText) to start the stream",
		)
		.check(
			consumes_stream,
			"Stream chunks processing with for await loop!",
			"Use a for await loop to consume stream chunks: for await (const chunk of stream)",
		)
		.finish()
}
