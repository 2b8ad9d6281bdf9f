//! Writing assistance behind the experimental `Writer`, `Rewriter`,
//! `Proofreader` and `LanguageModel` stand-ins.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
	AsIs,
	MoreFormal,
	MoreCasual,
}

impl Tone {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"as-is" => Some(Self::AsIs),
			"more-formal" => Some(Self::MoreFormal),
			"more-casual" => Some(Self::MoreCasual),
			_ => None,
		}
	}
}

const CONTRACTIONS: &[(&str, &str)] = &[
	("can't", "cannot"),
	("won't", "will not"),
	("don't", "do not"),
	("doesn't", "does not"),
	("isn't", "is not"),
	("aren't", "are not"),
	("it's", "it is"),
	("we'll", "we will"),
	("we're", "we are"),
	("I'm", "I am"),
	("you're", "you are"),
	("that's", "that is"),
];

const MISSPELLINGS: &[(&str, &str)] = &[
	("teh", "the"),
	("recieve", "receive"),
	("seperate", "separate"),
	("definately", "definitely"),
	("occured", "occurred"),
	("untill", "until"),
	("wich", "which"),
	("adress", "address"),
	("enviroment", "environment"),
	("succesful", "successful"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
	/// Character offsets into the original input.
	pub start: usize,
	pub end: usize,
	pub correction: String,
}

fn sentence_case(s: &str) -> String {
	let mut chars = s.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

fn replace_words(text: &str, pairs: impl Iterator<Item = (&'static str, &'static str)> + Clone) -> String {
	text.split(' ')
		.map(|word| {
			let trimmed = word.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '\'');
			let suffix = &word[trimmed.len()..];
			match pairs.clone().find(|(from, _)| from.eq_ignore_ascii_case(trimmed)) {
				Some((_, to)) if trimmed.starts_with(char::is_uppercase) => format!("{}{suffix}", sentence_case(to)),
				Some((_, to)) => format!("{to}{suffix}"),
				None => word.to_string(),
			}
		})
		.collect::<Vec<_>>()
		.join(" ")
}

pub fn write(task: &str, context: Option<&str>) -> String {
	let task = task.trim().trim_end_matches(['.', '!', '?']);
	if task.is_empty() {
		return String::new();
	}
	let mut draft = format!("{}.", sentence_case(task));
	if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
		draft.push_str(&format!(" Written with this in mind: {context}."));
	}
	draft
}

pub fn rewrite(text: &str, tone: Tone) -> String {
	let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
	match tone {
		Tone::AsIs => collapsed,
		Tone::MoreFormal => replace_words(&collapsed, CONTRACTIONS.iter().copied()),
		Tone::MoreCasual => replace_words(&collapsed, CONTRACTIONS.iter().map(|(short, long)| (*long, *short)).filter(|(long, _)| !long.contains(' '))),
	}
}

pub fn proofread(text: &str) -> (String, Vec<Correction>) {
	let mut corrected = String::with_capacity(text.len());
	let mut corrections = Vec::new();
	let mut offset = 0;

	for (i, word) in text.split(' ').enumerate() {
		if i > 0 {
			corrected.push(' ');
			offset += 1;
		}
		let length = word.chars().count();
		let core = word.trim_end_matches(|c: char| c.is_ascii_punctuation());
		let core_length = core.chars().count();
		match MISSPELLINGS.iter().find(|(wrong, _)| wrong.eq_ignore_ascii_case(core)) {
			Some((_, right)) => {
				let fixed = if core.starts_with(char::is_uppercase) { sentence_case(right) } else { (*right).to_string() };
				corrections.push(Correction {
					start: offset,
					end: offset + core_length,
					correction: fixed.clone(),
				});
				corrected.push_str(&fixed);
				corrected.push_str(&word[core.len()..]);
			},
			None => corrected.push_str(word),
		}
		offset += length;
	}

	if corrected.starts_with(char::is_lowercase) {
		let fixed = sentence_case(&corrected);
		let first_end = corrected.chars().take_while(|c| !c.is_whitespace()).count();
		if !corrections.iter().any(|c| c.start == 0) {
			corrections.insert(0, Correction {
				start: 0,
				end: first_end,
				correction: fixed.chars().take(first_end).collect(),
			});
		}
		corrected = fixed;
	}

	(corrected, corrections)
}

/// Canned replies from the simulated on-device model.
pub fn respond(prompt: &str, system_prompt: Option<&str>) -> String {
	let prompt = prompt.trim();
	let lower = prompt.to_lowercase();
	let reply = if prompt.is_empty() {
		"Please send a non-empty prompt.".to_string()
	} else if ["hello", "hi", "hey"].iter().any(|g| lower.split(|c: char| !c.is_alphabetic()).next() == Some(*g)) {
		"Hello! I am running entirely on this device. How can I help?".to_string()
	} else if let Some(question) = prompt.strip_suffix('?') {
		format!("You asked: \"{question}?\" I can only give simulated answers in this build.")
	} else {
		format!("Understood: {prompt}")
	};
	match system_prompt.map(str::trim).filter(|s| !s.is_empty()) {
		Some(system) => format!("[{system}] {reply}"),
		None => reply,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewrite_expands_contractions_when_formal() {
		assert_eq!(rewrite("We'll  ship it.  It's done.", Tone::MoreFormal), "We will ship it. It is done.");
		assert_eq!(rewrite("It is done.", Tone::AsIs), "It is done.");
	}

	#[test]
	fn proofread_reports_character_offsets() {
		let (corrected, corrections) = proofread("I recieve teh mail.");
		assert_eq!(corrected, "I receive the mail.");
		assert_eq!(corrections, vec![
			Correction { start: 2, end: 9, correction: "receive".into() },
			Correction { start: 10, end: 13, correction: "the".into() },
		]);
	}

	#[test]
	fn proofread_capitalizes_first_word() {
		let (corrected, corrections) = proofread("hello there");
		assert_eq!(corrected, "Hello there");
		assert_eq!(corrections[0].correction, "Hello");
	}

	#[test]
	fn writer_and_model_are_deterministic() {
		assert_eq!(write("a thank-you note to the team", None), "A thank-you note to the team.");
		assert!(respond("hello model", None).starts_with("Hello!"));
		assert_eq!(respond("status", Some("terse")), "[terse] Understood: status");
	}
}
