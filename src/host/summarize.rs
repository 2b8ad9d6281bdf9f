//! Extractive summarization behind the `Summarizer` stand-in.
//!
//! Sentences are scored by how often their content words recur in the
//! document, nudged by position, severity tags (`[ERROR]`, `[PANIC]`, ...)
//! and any caller-provided context. Each summary type then picks and
//! arranges the best sentences its own way.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryType {
	KeyPoints,
	Tldr,
	Teaser,
	Headline,
}

impl SummaryType {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"key-points" => Some(Self::KeyPoints),
			"tldr" => Some(Self::Tldr),
			"teaser" => Some(Self::Teaser),
			"headline" => Some(Self::Headline),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::KeyPoints => "key-points",
			Self::Tldr => "tldr",
			Self::Teaser => "teaser",
			Self::Headline => "headline",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLength {
	Short,
	Medium,
	Long,
}

impl SummaryLength {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"short" => Some(Self::Short),
			"medium" => Some(Self::Medium),
			"long" => Some(Self::Long),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Short => "short",
			Self::Medium => "medium",
			Self::Long => "long",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryFormat {
	Markdown,
	PlainText,
}

impl SummaryFormat {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"markdown" => Some(Self::Markdown),
			"plain-text" => Some(Self::PlainText),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Markdown => "markdown",
			Self::PlainText => "plain-text",
		}
	}
}

#[derive(Debug, Clone)]
pub struct SummaryOptions {
	pub kind: SummaryType,
	pub length: SummaryLength,
	pub format: SummaryFormat,
	pub shared_context: Option<String>,
}

impl Default for SummaryOptions {
	fn default() -> Self {
		Self {
			kind: SummaryType::KeyPoints,
			length: SummaryLength::Short,
			format: SummaryFormat::Markdown,
			shared_context: None,
		}
	}
}

const TEASER_HOOK: &str = "Read on to find out how it all came together.";

const STOP_WORDS: &[&str] = &[
	"the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was", "one", "our", "out",
	"has", "have", "this", "that", "with", "from", "they", "will", "would", "there", "their", "what", "when", "which",
	"into", "than", "then", "them", "these", "those", "its", "also", "been", "were", "per", "via", "each", "how",
];

const SEVERITY_WORDS: &[&str] = &[
	"outage", "failure", "failed", "unresponsive", "terminated", "refused", "exhausted", "timeout", "unavailable",
	"blocked", "down", "crashed",
];

#[derive(Debug, Clone)]
struct Sentence {
	text: String,
	index: usize,
	paragraph_start: bool,
	severity: u32,
}

fn severity_of_tag(tag: &str) -> u32 {
	match tag.to_ascii_uppercase().as_str() {
		"PANIC" | "FATAL" => 4,
		"CRITICAL" => 3,
		"ERROR" => 2,
		"WARN" | "WARNING" => 1,
		_ => 0,
	}
}

fn is_list_line(line: &str) -> bool {
	line.starts_with("- ")
		|| line.starts_with("* ")
		|| line.starts_with('[')
		|| line.starts_with("**")
		|| line.split_once(". ").is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Drops bullets, emphasis markers, log tags and timestamps; returns the
/// cleaned line with the severity its log tag carried.
fn clean_line(line: &str) -> (String, u32) {
	let mut rest = line.trim();
	let mut severity = 0;

	if let Some(stripped) = rest.strip_prefix('[')
		&& let Some((tag, after)) = stripped.split_once(']')
	{
		severity = severity_of_tag(tag);
		rest = after.trim_start();
		// Timestamp tokens such as `2024-01-15` and `03:47:22.123Z`.
		while let Some((token, after)) = rest.split_once(' ') {
			if token.starts_with(|c: char| c.is_ascii_digit()) && token.contains(['-', ':']) {
				rest = after.trim_start();
			} else {
				break;
			}
		}
	}

	let rest = rest.strip_prefix("- ").or_else(|| rest.strip_prefix("* ")).unwrap_or(rest);
	let rest = match rest.split_once(". ") {
		Some((number, item)) if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) => item,
		_ => rest,
	};
	(rest.replace("**", "").replace('`', "").trim().to_string(), severity)
}

fn split_sentences(unit: &str) -> Vec<String> {
	let mut sentences = Vec::new();
	let mut current = String::new();
	let mut chars = unit.chars().peekable();
	while let Some(c) = chars.next() {
		current.push(c);
		if matches!(c, '.' | '!' | '?') {
			while let Some(&next) = chars.peek() {
				if matches!(next, '.' | '!' | '?' | '"' | '\'' | ')') {
					current.push(next);
					chars.next();
				} else {
					break;
				}
			}
			if chars.peek().is_none_or(|c| c.is_whitespace()) {
				let sentence = current.trim().to_string();
				if !sentence.is_empty() {
					sentences.push(sentence);
				}
				current.clear();
			}
		}
	}
	let tail = current.trim();
	if !tail.is_empty() {
		sentences.push(tail.to_string());
	}
	sentences
}

fn sentences(text: &str) -> Vec<Sentence> {
	let normalized = text.replace("\r\n", "\n");
	let mut out = Vec::new();
	for paragraph in normalized.split("\n\n") {
		let lines: Vec<&str> = paragraph
			.lines()
			.map(str::trim)
			.filter(|l| !l.is_empty() && !l.starts_with('#'))
			.collect();
		if lines.is_empty() {
			continue;
		}
		let units: Vec<(String, u32)> = if lines.iter().any(|l| is_list_line(l)) {
			lines.iter().map(|l| clean_line(l)).collect()
		} else {
			vec![(lines.join(" "), 0)]
		};
		let mut paragraph_start = true;
		for (unit, tag_severity) in units {
			for text in split_sentences(&unit) {
				let severity = tag_severity + content_words(&text).filter(|w| SEVERITY_WORDS.contains(&w.as_str())).count() as u32;
				out.push(Sentence {
					text,
					index: out.len(),
					paragraph_start,
					severity,
				});
				paragraph_start = false;
			}
		}
	}
	out
}

fn content_words(text: &str) -> impl Iterator<Item = String> + '_ {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|w| w.chars().count() >= 3)
		.map(str::to_lowercase)
		.filter(|w| !STOP_WORDS.contains(&w.as_str()))
}

fn scores(sentences: &[Sentence], context: &HashSet<String>) -> Vec<f64> {
	let mut frequency: HashMap<String, usize> = HashMap::new();
	for sentence in sentences {
		for word in content_words(&sentence.text) {
			*frequency.entry(word).or_default() += 1;
		}
	}
	sentences
		.iter()
		.map(|s| {
			let words: Vec<String> = content_words(&s.text).collect();
			let density = words.iter().map(|w| frequency[w] as f64).sum::<f64>() / words.len().max(1) as f64;
			let position = if s.index == 0 {
				1.0
			} else if s.paragraph_start {
				0.3
			} else {
				0.0
			};
			let overlap = words.iter().filter(|w| context.contains(*w)).count() as f64 * 0.5;
			let figures = if s.text.chars().any(|c| c.is_ascii_digit()) { 0.2 } else { 0.0 };
			density + position + overlap + figures
		})
		.collect()
}

/// Indices of the `n` best sentences, restored to document order.
fn top_in_order(scores: &[f64], n: usize) -> Vec<usize> {
	let mut ranked: Vec<usize> = (0..scores.len()).collect();
	ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
	ranked.truncate(n);
	ranked.sort_unstable();
	ranked
}

fn terminated(sentence: &str) -> String {
	let trimmed = sentence.trim_end_matches([':', ';', ',']).trim_end();
	if trimmed.ends_with(['.', '!', '?']) {
		trimmed.to_string()
	} else {
		format!("{trimmed}.")
	}
}

fn capitalized(s: &str) -> String {
	let mut chars = s.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

pub fn summarize(text: &str, options: &SummaryOptions, context: Option<&str>) -> String {
	let sentences = sentences(text);
	if sentences.is_empty() {
		return String::new();
	}

	let context: HashSet<String> = [options.shared_context.as_deref(), context]
		.into_iter()
		.flatten()
		.flat_map(|c| content_words(c).collect::<Vec<_>>())
		.collect();
	let scores = scores(&sentences, &context);

	match options.kind {
		SummaryType::KeyPoints => {
			let count = match options.length {
				SummaryLength::Short => 3,
				SummaryLength::Medium => 5,
				SummaryLength::Long => 7,
			};
			let bullet = match options.format {
				SummaryFormat::Markdown => "- ",
				SummaryFormat::PlainText => "",
			};
			top_in_order(&scores, count)
				.into_iter()
				.map(|i| format!("{bullet}{}", terminated(&sentences[i].text)))
				.collect::<Vec<_>>()
				.join("\n")
		},
		SummaryType::Tldr => {
			let count = match options.length {
				SummaryLength::Short => 1,
				SummaryLength::Medium => 3,
				SummaryLength::Long => 5,
			};
			top_in_order(&scores, count)
				.into_iter()
				.map(|i| terminated(&sentences[i].text))
				.collect::<Vec<_>>()
				.join(" ")
		},
		SummaryType::Teaser => {
			let count = match options.length {
				SummaryLength::Short => 1,
				SummaryLength::Medium | SummaryLength::Long => 2,
			};
			let mut parts: Vec<String> = top_in_order(&scores, count)
				.into_iter()
				.map(|i| terminated(&sentences[i].text))
				.collect();
			parts.push(TEASER_HOOK.to_string());
			parts.join(" ")
		},
		SummaryType::Headline => headline(&sentences, &scores, options.length),
	}
}

/// Most severe sentences first, trimmed to a single line of
/// 8 to 12/17/22 words depending on length.
fn headline(sentences: &[Sentence], scores: &[f64], length: SummaryLength) -> String {
	const MIN_WORDS: usize = 8;
	let max_words = match length {
		SummaryLength::Short => 12,
		SummaryLength::Medium => 17,
		SummaryLength::Long => 22,
	};

	let mut ranked: Vec<usize> = (0..sentences.len()).collect();
	ranked.sort_by(|&a, &b| {
		sentences[b]
			.severity
			.cmp(&sentences[a].severity)
			.then(scores[b].total_cmp(&scores[a]))
			.then(a.cmp(&b))
	});

	let mut clauses: Vec<String> = Vec::new();
	let mut words = 0;
	for i in ranked {
		if words >= MIN_WORDS {
			break;
		}
		let clause = sentences[i].text.trim_end_matches(['.', '!', '?', ':', ';', ',']).to_string();
		words += clause.split_whitespace().count();
		clauses.push(clause);
	}

	let joined = clauses.join("; ");
	let line: Vec<&str> = joined.split_whitespace().take(max_words).collect();
	capitalized(line.join(" ").trim_end_matches([';', ',', ':']))
}

#[cfg(test)]
mod tests {
	use super::*;

	const LOG: &str = "[ERROR] 2024-01-15 03:47:22.123Z MainDB-Shard-01 Connection pool exhausted
[ERROR] 2024-01-15 03:47:22.456Z Auth-Service: Failed to acquire connection
[CRITICAL] 2024-01-15 03:47:25.789Z ALL-DATABASES: Master node unresponsive
[PANIC] 2024-01-15 03:47:29.234Z Load-Balancer: All active db connections terminated
Impact: 100% of users unable to authenticate, system in full outage
Recovery: Automatic failover to standby cluster initiated...";

	const ARTICLE: &str = "Title: How We Scaled Our Platform

Our platform grew from a handful of users to millions of users in two years.
Scaling the platform meant rethinking the database layer.

We sharded the database by region. Each region now scales independently.
Caching cut database load by sixty percent.";

	fn options(kind: SummaryType, length: SummaryLength) -> SummaryOptions {
		SummaryOptions {
			kind,
			length,
			..SummaryOptions::default()
		}
	}

	fn sentence_count(s: &str) -> usize {
		s.split(['.', '!', '?']).filter(|p| !p.trim().is_empty()).count()
	}

	#[test]
	fn log_lines_lose_tags_and_timestamps() {
		let (line, severity) = clean_line("[PANIC] 2024-01-15 03:47:29.234Z Load-Balancer: All terminated");
		assert_eq!(line, "Load-Balancer: All terminated");
		assert_eq!(severity, 4);
	}

	#[test]
	fn wrapped_lines_form_one_sentence() {
		let found = sentences("We grew from\na small team.\n\n- first point\n- second point");
		let texts: Vec<&str> = found.iter().map(|s| s.text.as_str()).collect();
		assert_eq!(texts, ["We grew from a small team.", "first point", "second point"]);
	}

	#[test]
	fn headline_leads_with_most_severe_entry() {
		let headline = summarize(LOG, &options(SummaryType::Headline, SummaryLength::Short), None);
		assert!(headline.starts_with("Load-Balancer: All active db connections terminated"), "{headline}");
		let words = headline.split_whitespace().count();
		assert!((8..=12).contains(&words), "{words} words in {headline}");
		assert!(!headline.contains('\n'));
	}

	#[test]
	fn tldr_respects_length() {
		let short = summarize(ARTICLE, &options(SummaryType::Tldr, SummaryLength::Short), None);
		assert_eq!(sentence_count(&short), 1);
		let medium = summarize(ARTICLE, &options(SummaryType::Tldr, SummaryLength::Medium), None);
		assert_eq!(sentence_count(&medium), 3);
	}

	#[test]
	fn teaser_ends_with_hook() {
		let teaser = summarize(ARTICLE, &options(SummaryType::Teaser, SummaryLength::Short), None);
		assert!(teaser.ends_with(TEASER_HOOK));
		assert!((1..=3).contains(&sentence_count(&teaser)));
	}

	#[test]
	fn key_points_are_bullets_in_markdown_only() {
		let markdown = summarize(ARTICLE, &options(SummaryType::KeyPoints, SummaryLength::Short), None);
		assert_eq!(markdown.lines().count(), 3);
		assert!(markdown.lines().all(|l| l.starts_with("- ")));

		let plain = SummaryOptions {
			format: SummaryFormat::PlainText,
			..options(SummaryType::KeyPoints, SummaryLength::Short)
		};
		assert!(!summarize(ARTICLE, &plain, None).contains("- "));
	}

	#[test]
	fn context_shifts_the_pick() {
		let plain = summarize(ARTICLE, &options(SummaryType::Tldr, SummaryLength::Short), None);
		let focused = summarize(
			ARTICLE,
			&options(SummaryType::Tldr, SummaryLength::Short),
			Some("caching caching load percent sixty"),
		);
		assert_ne!(plain, focused);
		assert!(focused.contains("Caching"));
	}

	#[test]
	fn empty_input_gives_empty_summary() {
		assert_eq!(summarize("  \n ", &SummaryOptions::default(), None), "");
	}
}
