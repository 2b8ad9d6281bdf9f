//! Deterministic language detection and translation used by the
//! `LanguageDetector` and `Translator` stand-ins.

use std::collections::BTreeMap;

pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr", "es", "de", "it", "pt", "nl", "ja", "zh", "ko", "ru", "ar", "hi"];

/// Accepts BCP 47 tags such as `en-US` by their primary subtag.
pub fn is_supported(tag: &str) -> bool {
	let primary = tag.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase();
	SUPPORTED_LANGUAGES.contains(&primary.as_str())
}

pub fn primary_subtag(tag: &str) -> String {
	tag.split(['-', '_']).next().unwrap_or_default().to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
	pub language: &'static str,
	pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

const LEXICONS: &[(&str, &[&str])] = &[
	("en", &[
		"the", "and", "is", "are", "of", "to", "in", "at", "for", "with", "on", "all", "this", "that", "it", "be", "was",
		"hello", "system", "status", "update", "available", "main", "network", "data", "nodes", "online", "report",
		"users", "we", "our", "from", "by", "have", "has", "not", "yes", "please", "thank", "you", "how", "what",
	]),
	("fr", &[
		"le", "la", "les", "et", "est", "sont", "de", "des", "du", "un", "une", "en", "bonjour", "merci", "comment",
		"vas", "tu", "je", "nous", "vous", "pour", "avec", "dans", "système", "statut", "fonctionne", "nominalement",
		"tous", "toutes", "nœuds", "ligne", "pas", "oui", "salut", "ça", "très",
	]),
	("es", &[
		"el", "la", "los", "las", "y", "es", "son", "de", "del", "en", "un", "una", "hola", "gracias", "cómo", "estás",
		"qué", "por", "para", "con", "está", "todos", "nodos", "sistema", "estado", "línea", "buenos", "días", "muy",
		"sí",
	]),
	("de", &[
		"der", "die", "das", "und", "ist", "sind", "nicht", "ein", "eine", "mit", "für", "hallo", "danke", "wie", "geht",
		"ich", "wir", "alle", "guten", "tag", "auf", "zu",
	]),
	("it", &[
		"il", "lo", "gli", "e", "è", "sono", "di", "della", "che", "ciao", "grazie", "come", "stai", "per", "con",
		"tutti", "sistema", "molto", "buongiorno",
	]),
	("pt", &[
		"o", "os", "as", "e", "é", "são", "de", "do", "da", "um", "uma", "olá", "obrigado", "como", "você", "está",
		"para", "com", "todos", "sistema", "bom", "dia", "não",
	]),
	("nl", &[
		"de", "het", "een", "en", "is", "zijn", "van", "hallo", "dank", "je", "wel", "hoe", "gaat", "met", "voor",
		"niet", "alle", "goedemorgen",
	]),
];

const MARKERS: &[(char, &str, f64)] = &[
	('¿', "es", 2.0),
	('¡', "es", 2.0),
	('ñ', "es", 1.0),
	('ç', "fr", 1.0),
	('œ', "fr", 1.0),
	('è', "fr", 0.5),
	('ê', "fr", 0.5),
	('à', "fr", 0.5),
	('ß', "de", 1.0),
	('ä', "de", 0.5),
	('ö', "de", 0.5),
	('ü', "de", 0.5),
	('ã', "pt", 1.0),
	('õ', "pt", 1.0),
];

fn script_language(c: char) -> Option<&'static str> {
	match c {
		'\u{3040}'..='\u{30FF}' => Some("ja"),
		'\u{AC00}'..='\u{D7AF}' | '\u{1100}'..='\u{11FF}' => Some("ko"),
		'\u{4E00}'..='\u{9FFF}' => Some("zh"),
		'\u{0400}'..='\u{04FF}' => Some("ru"),
		'\u{0600}'..='\u{06FF}' => Some("ar"),
		'\u{0900}'..='\u{097F}' => Some("hi"),
		_ => None,
	}
}

/// Ranks candidate languages for `text`, most confident first.
/// Text with no usable evidence is reported as `und`.
pub fn detect(text: &str) -> Vec<Detection> {
	let mut evidence: BTreeMap<&'static str, f64> = BTreeMap::new();

	let has_kana = text.chars().any(|c| matches!(c, '\u{3040}'..='\u{30FF}'));
	for c in text.chars() {
		if let Some(language) = script_language(c) {
			// Han characters inside Japanese text are kanji.
			let language = if language == "zh" && has_kana { "ja" } else { language };
			*evidence.entry(language).or_default() += 1.0;
		}
		if let Some((_, language, weight)) = MARKERS.iter().find(|(m, _, _)| *m == c.to_lowercase().next().unwrap_or(c)) {
			*evidence.entry(language).or_default() += weight;
		}
	}

	let mut latin_letters = 0usize;
	for word in text
		.split(|c: char| !c.is_alphabetic())
		.filter(|w| !w.is_empty() && w.chars().all(|c| script_language(c).is_none()))
	{
		latin_letters += word.chars().count();
		let lower = word.to_lowercase();
		let owners: Vec<&'static str> = LEXICONS
			.iter()
			.filter(|(_, words)| words.contains(&lower.as_str()))
			.map(|(language, _)| *language)
			.collect();
		if owners.is_empty() {
			continue;
		}
		let share = lower.chars().count() as f64 / owners.len() as f64;
		for language in owners {
			*evidence.entry(language).or_default() += share;
		}
	}

	let total: f64 = evidence.values().sum();
	if total == 0.0 {
		return if latin_letters > 0 {
			vec![
				Detection { language: "en", confidence: 0.55 },
				Detection { language: "und", confidence: 0.45 },
			]
		} else {
			vec![Detection { language: "und", confidence: 1.0 }]
		};
	}

	let mut ranked: Vec<Detection> = evidence
		.into_iter()
		.map(|(language, score)| Detection {
			language,
			confidence: (score / total * 10_000.0).round() / 10_000.0,
		})
		.filter(|d| d.confidence > 0.0)
		.collect();
	ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(a.language.cmp(b.language)));
	ranked
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

const PHRASES: &[(&str, &str, &str, &str)] = &[
	(
		"fr",
		"en",
		"Statut: Le système fonctionne nominalement. Tous les nœuds sont en ligne.",
		"Status: The system is operating nominally. All nodes are online.",
	),
	(
		"ja",
		"es",
		"こんにちは、システムの状態は正常です。すべてのノードがオンラインです。",
		"Hola, el estado del sistema es normal. Todos los nodos están en línea.",
	),
	(
		"ja",
		"en",
		"こんにちは、システムの状態は正常です。すべてのノードがオンラインです。",
		"Hello, the system status is normal. All nodes are online.",
	),
	("fr", "en", "Bonjour Scribe! Comment vas-tu?", "Hello Scribe! How are you?"),
	("es", "en", "¿Cómo estás?", "How are you?"),
];

/// English headword with its French, Spanish and German renderings.
const DICTIONARY: &[(&str, [&str; 3])] = &[
	("hello", ["bonjour", "hola", "hallo"]),
	("the", ["le", "el", "die"]),
	("system", ["système", "sistema", "System"]),
	("systems", ["systèmes", "sistemas", "Systeme"]),
	("status", ["statut", "estado", "Status"]),
	("all", ["tous", "todos", "alle"]),
	("nodes", ["nœuds", "nodos", "Knoten"]),
	("are", ["sont", "están", "sind"]),
	("is", ["est", "es", "ist"]),
	("and", ["et", "y", "und"]),
	("with", ["avec", "con", "mit"]),
	("of", ["de", "de", "von"]),
	("in", ["dans", "en", "in"]),
	("network", ["réseau", "red", "Netzwerk"]),
	("data", ["données", "datos", "Daten"]),
	("users", ["utilisateurs", "usuarios", "Benutzer"]),
	("regions", ["régions", "regiones", "Regionen"]),
	("security", ["sécurité", "seguridad", "Sicherheit"]),
	("successfully", ["avec succès", "con éxito", "erfolgreich"]),
	("operating", ["fonctionne", "funciona", "läuft"]),
	("nominally", ["nominalement", "nominalmente", "nominal"]),
	("online", ["en ligne", "en línea", "online"]),
	("backup", ["sauvegarde", "respaldo", "Sicherung"]),
	("power", ["alimentation", "energía", "Strom"]),
	("centers", ["centres", "centros", "Zentren"]),
	("critical", ["critiques", "críticos", "kritische"]),
	("stable", ["stable", "estable", "stabil"]),
	("performance", ["performance", "rendimiento", "Leistung"]),
	("zero", ["zéro", "cero", "null"]),
	("yes", ["oui", "sí", "ja"]),
	("no", ["non", "no", "nein"]),
	("good", ["bon", "bueno", "gut"]),
	("day", ["jour", "día", "Tag"]),
	("how", ["comment", "cómo", "wie"]),
	("you", ["vous", "tú", "du"]),
	("thank", ["merci", "gracias", "danke"]),
	("hours", ["heures", "horas", "Stunden"]),
	("time", ["temps", "tiempo", "Zeit"]),
];

fn dictionary_column(language: &str) -> Option<usize> {
	match language {
		"fr" => Some(0),
		"es" => Some(1),
		"de" => Some(2),
		_ => None,
	}
}

fn lookup_word(word: &str, source: &str, target: &str) -> Option<&'static str> {
	let lower = word.to_lowercase();
	match (source, target) {
		("en", _) => {
			let column = dictionary_column(target)?;
			DICTIONARY.iter().find(|(en, _)| *en == lower).map(|(_, forms)| forms[column])
		},
		(_, "en") => {
			let column = dictionary_column(source)?;
			DICTIONARY
				.iter()
				.find(|(_, forms)| !forms[column].contains(' ') && forms[column].to_lowercase() == lower)
				.map(|(en, _)| *en)
		},
		_ => None,
	}
}

fn match_case(original: &str, translated: &str) -> String {
	if original.chars().next().is_some_and(char::is_uppercase) {
		let mut chars = translated.chars();
		match chars.next() {
			Some(first) => first.to_uppercase().chain(chars).collect(),
			None => String::new(),
		}
	} else {
		translated.to_string()
	}
}

/// Word-by-word substitution; returns the new text and how many words actually changed.
fn substitute(text: &str, source: &str, target: &str) -> (String, usize) {
	let mut changed = 0;
	let mut out = String::with_capacity(text.len());
	for token in text.split_inclusive(char::is_whitespace) {
		let body_end = token.trim_end().len();
		let (body, trailing_space) = token.split_at(body_end);
		let core_start = body
			.char_indices()
			.find(|(_, c)| c.is_alphanumeric())
			.map_or(body.len(), |(i, _)| i);
		let core_end = body
			.char_indices()
			.rev()
			.find(|(_, c)| c.is_alphanumeric())
			.map_or(core_start, |(i, c)| i + c.len_utf8())
			.max(core_start);
		let core = &body[core_start..core_end];
		match lookup_word(core, source, target) {
			Some(translated) if !translated.eq_ignore_ascii_case(core) => {
				changed += 1;
				out.push_str(&body[..core_start]);
				out.push_str(&match_case(core, translated));
				out.push_str(&body[core_end..]);
			},
			_ => out.push_str(body),
		}
		out.push_str(trailing_space);
	}
	(out, changed)
}

/// Translates `text`. Unknown material is returned tagged with the target
/// language, so a translation between two different languages never
/// echoes its input.
pub fn translate(text: &str, source: &str, target: &str) -> String {
	let (source, target) = (primary_subtag(source), primary_subtag(target));
	if source == target || text.trim().is_empty() {
		return text.to_string();
	}

	let trimmed = text.trim();
	if let Some((_, _, _, output)) = PHRASES
		.iter()
		.find(|(from, to, input, _)| *from == source && *to == target && *input == trimmed)
	{
		return (*output).to_string();
	}

	let (translated, changed) = if source != "en" && target != "en" {
		let (pivot, first) = substitute(text, &source, "en");
		let (out, second) = substitute(&pivot, "en", &target);
		(out, first + second)
	} else {
		substitute(text, &source, &target)
	};

	if changed > 0 && translated != text {
		translated
	} else {
		format!("[{target}] {text}")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn french_greeting_is_detected() {
		let ranked = detect("Bonjour Scribe! Comment vas-tu?");
		assert_eq!(ranked[0].language, "fr");
		assert!(ranked[0].confidence > 0.5);
	}

	#[test]
	fn mixed_packet_ranks_english_before_spanish() {
		let ranked = detect("Hello! ¿Cómo estás? System status update available at the main console.");
		let languages: Vec<&str> = ranked.iter().map(|d| d.language).collect();
		assert_eq!(&languages[..2], ["en", "es"]);
		assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
	}

	#[test]
	fn scripts_decide_cjk_languages() {
		assert_eq!(detect("こんにちは、システムの状態は正常です。")[0].language, "ja");
		assert_eq!(detect("系统状态正常")[0].language, "zh");
		assert_eq!(detect("안녕하세요")[0].language, "ko");
	}

	#[test]
	fn no_evidence_is_undetermined() {
		assert_eq!(detect("1234 !!"), vec![Detection { language: "und", confidence: 1.0 }]);
	}

	#[test]
	fn phrase_table_handles_level_packets() {
		assert_eq!(
			translate("Statut: Le système fonctionne nominalement. Tous les nœuds sont en ligne.", "fr", "en"),
			"Status: The system is operating nominally. All nodes are online."
		);
	}

	#[test]
	fn word_substitution_keeps_punctuation_and_case() {
		assert_eq!(translate("Hello, the system is stable.", "en", "es"), "Hola, el sistema es estable.");
	}

	#[test]
	fn unknown_text_is_tagged() {
		assert_eq!(translate("Zebra quux", "en", "ja"), "[ja] Zebra quux");
		assert_eq!(translate("same", "en-US", "en"), "same");
	}

	#[test]
	fn region_tags_are_supported() {
		assert!(is_supported("pt-BR"));
		assert!(!is_supported("tlh"));
	}
}
