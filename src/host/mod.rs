//! Simulated on-device AI APIs.
//!
//! Each API is a global class object (`LanguageDetector`, `Translator`, ...)
//! with async `availability()` and `create(options)` statics. Created
//! instances expose the same method names as the browser APIs, and every
//! async call settles after the configured latency.

pub mod assist;
pub mod language;
pub mod summarize;

use std::{cell::Cell, fmt, rc::Rc, time::Duration};

use log::debug;
use serde::Serialize;

use crate::{
	interpreter::{Flow, Scope, type_error},
	timer,
	value::{ChunkStream, Promise, Value},
};
use summarize::{SummaryFormat, SummaryLength, SummaryOptions, SummaryType};

const INPUT_QUOTA: f64 = 4_000.0;

#[derive(Debug, Clone)]
pub struct HostConfig {
	/// Delay before each async API call settles and between stream chunks.
	pub latency: Duration,
	/// Installs `Writer`, `Rewriter`, `Proofreader` and `LanguageModel`.
	pub experimental_apis: bool,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			latency: Duration::ZERO,
			experimental_apis: false,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiKind {
	LanguageDetector,
	Translator,
	Summarizer,
	Writer,
	Rewriter,
	Proofreader,
	LanguageModel,
}

impl ApiKind {
	pub const ALL: [ApiKind; 7] = [
		ApiKind::LanguageDetector,
		ApiKind::Translator,
		ApiKind::Summarizer,
		ApiKind::Writer,
		ApiKind::Rewriter,
		ApiKind::Proofreader,
		ApiKind::LanguageModel,
	];

	pub fn global_name(self) -> &'static str {
		match self {
			ApiKind::LanguageDetector => "LanguageDetector",
			ApiKind::Translator => "Translator",
			ApiKind::Summarizer => "Summarizer",
			ApiKind::Writer => "Writer",
			ApiKind::Rewriter => "Rewriter",
			ApiKind::Proofreader => "Proofreader",
			ApiKind::LanguageModel => "LanguageModel",
		}
	}

	pub fn is_experimental(self) -> bool {
		!matches!(self, ApiKind::LanguageDetector | ApiKind::Translator | ApiKind::Summarizer)
	}
}

impl fmt::Display for ApiKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.global_name())
	}
}

#[derive(Debug, Clone, Default)]
pub struct Host {
	config: HostConfig,
}

impl Host {
	pub fn new(config: HostConfig) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &HostConfig {
		&self.config
	}

	pub fn is_available(&self, api: ApiKind) -> bool {
		!api.is_experimental() || self.config.experimental_apis
	}

	pub fn available_apis(&self) -> Vec<ApiKind> {
		ApiKind::ALL.into_iter().filter(|api| self.is_available(*api)).collect()
	}

	/// Defines a global for every available API.
	pub fn install(&self, globals: &Scope) {
		for api in self.available_apis() {
			debug!("Installing simulated {api} API");
			globals.define(api.global_name(), self.class(api));
		}
	}

	fn class(&self, api: ApiKind) -> Value {
		let latency = self.config.latency;
		match api {
			ApiKind::LanguageDetector => {
				api_class(api, latency, Rc::new(always_available), Rc::new(move |options| language_detector(latency, options)))
			},
			ApiKind::Translator => api_class(
				api,
				latency,
				Rc::new(translator_availability),
				Rc::new(move |options| translator(latency, options)),
			),
			ApiKind::Summarizer => {
				api_class(api, latency, Rc::new(always_available), Rc::new(move |options| summarizer(latency, options)))
			},
			ApiKind::Writer => api_class(api, latency, Rc::new(always_available), Rc::new(move |options| writer(latency, options))),
			ApiKind::Rewriter => {
				api_class(api, latency, Rc::new(always_available), Rc::new(move |options| rewriter(latency, options)))
			},
			ApiKind::Proofreader => {
				api_class(api, latency, Rc::new(always_available), Rc::new(move |_: Option<Value>| -> Flow<Value> { Ok(proofreader(latency)) }))
			},
			ApiKind::LanguageModel => {
				api_class(api, latency, Rc::new(always_available), Rc::new(move |options| language_model(latency, options)))
			},
		}
	}
}

// ---------------------------------------------------------------------------
// Plumbing shared by every API
// ---------------------------------------------------------------------------

type Factory = Rc<dyn Fn(Option<Value>) -> Flow<Value>>;

/// A promise that runs `f` once the latency has elapsed.
fn delayed(latency: Duration, f: impl FnOnce() -> Flow<Value> + 'static) -> Value {
	Value::promise(async move {
		timer::sleep(latency).await;
		f()
	})
}

fn api_class(api: ApiKind, latency: Duration, availability: Factory, create: Factory) -> Value {
	let static_method = |name: &'static str, factory: Factory| {
		(
			name,
			Value::native(name, move |_, args| {
				let factory = factory.clone();
				let options = args.into_iter().next();
				Ok(delayed(latency, move || factory(options)))
			}),
		)
	};
	Value::instance(
		"Function",
		[
			("name", Value::string(api.global_name())),
			static_method("availability", availability),
			static_method("create", create),
		],
	)
}

/// Lifecycle of one created instance; every method rejects after `destroy()`.
struct Instance {
	api: ApiKind,
	alive: Rc<Cell<bool>>,
	latency: Duration,
}

impl Instance {
	fn new(api: ApiKind, latency: Duration) -> Self {
		Self {
			api,
			alive: Rc::new(Cell::new(true)),
			latency,
		}
	}

	fn destroyed_error(api: ApiKind) -> Value {
		Value::error("InvalidStateError", format!("The {api} has been destroyed."))
	}

	/// An async method: returns a promise settling with `f(args)`.
	fn method(&self, name: &'static str, f: impl Fn(Vec<Value>) -> Flow<Value> + 'static) -> (&'static str, Value) {
		let (alive, latency, api) = (self.alive.clone(), self.latency, self.api);
		let f = Rc::new(f);
		(
			name,
			Value::native(name, move |_, args| {
				if !alive.get() {
					return Ok(Value::Promise(Promise::rejected(Self::destroyed_error(api))));
				}
				let f = f.clone();
				Ok(delayed(latency, move || f(args)))
			}),
		)
	}

	/// A streaming method: returns the chunk stream synchronously.
	fn streaming(&self, name: &'static str, f: impl Fn(Vec<Value>) -> Flow<String> + 'static) -> (&'static str, Value) {
		let (alive, latency, api) = (self.alive.clone(), self.latency, self.api);
		(
			name,
			Value::native(name, move |_, args| {
				if !alive.get() {
					return Err(Self::destroyed_error(api));
				}
				let text = f(args)?;
				Ok(Value::Stream(Rc::new(ChunkStream::new(chunks(&text), latency))))
			}),
		)
	}

	fn destroy(&self) -> (&'static str, Value) {
		let alive = self.alive.clone();
		(
			"destroy",
			Value::native("destroy", move |_, _| {
				alive.set(false);
				Ok(Value::Undefined)
			}),
		)
	}

	fn measure_input_usage(&self) -> (&'static str, Value) {
		self.method("measureInputUsage", |args| Ok(Value::Number(text_arg(&args).chars().count() as f64)))
	}
}

/// Splits text into word-sized chunks that concatenate back to the input.
pub fn chunks(text: &str) -> Vec<String> {
	const CJK_CHUNK: usize = 8;
	let mut out = Vec::new();
	for piece in text.split_inclusive(char::is_whitespace) {
		if piece.chars().count() > CJK_CHUNK * 2 && !piece.trim().contains(' ') && !piece.is_ascii() {
			let chars: Vec<char> = piece.chars().collect();
			out.extend(chars.chunks(CJK_CHUNK).map(|c| c.iter().collect::<String>()));
		} else {
			out.push(piece.to_string());
		}
	}
	out
}

fn text_arg(args: &[Value]) -> String {
	args.first().map(Value::to_display_string).unwrap_or_default()
}

fn option_string(options: Option<&Value>, key: &str) -> Option<String> {
	match options?.get_key(key)? {
		Value::Undefined | Value::Null => None,
		other => Some(other.to_display_string()),
	}
}

fn optional_string(value: Option<String>) -> Value {
	value.map_or(Value::Undefined, Value::Str)
}

fn enum_option<T>(options: Option<&Value>, key: &str, enum_name: &str, parse: fn(&str) -> Option<T>, default: T) -> Flow<T> {
	match option_string(options, key) {
		None => Ok(default),
		Some(raw) => parse(&raw).ok_or_else(|| {
			type_error(format!(
				"Failed to read the '{key}' property: The provided value '{raw}' is not a valid enum value of type {enum_name}."
			))
		}),
	}
}

// ---------------------------------------------------------------------------
// LanguageDetector
// ---------------------------------------------------------------------------

fn language_detector(latency: Duration, options: Option<Value>) -> Flow<Value> {
	let expected = options
		.as_ref()
		.and_then(|o| o.get_key("expectedInputLanguages"))
		.unwrap_or(Value::Undefined);
	let instance = Instance::new(ApiKind::LanguageDetector, latency);
	Ok(Value::instance(
		"LanguageDetector",
		[
			("expectedInputLanguages", expected),
			("inputQuota", Value::Number(INPUT_QUOTA)),
			instance.method("detect", |args| {
				let ranked = language::detect(&text_arg(&args))
					.into_iter()
					.map(|d| {
						Value::object([
							("detectedLanguage", Value::string(d.language)),
							("confidence", Value::Number(d.confidence)),
						])
					})
					.collect();
				Ok(Value::array(ranked))
			}),
			instance.measure_input_usage(),
			instance.destroy(),
		],
	))
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

fn required_target(options: Option<&Value>, operation: &str) -> Flow<String> {
	option_string(options, "targetLanguage").ok_or_else(|| {
		type_error(format!(
			"Failed to execute '{operation}' on 'Translator': Required member targetLanguage is undefined."
		))
	})
}

fn always_available(_: Option<Value>) -> Flow<Value> {
	Ok(Value::string("available"))
}

fn translator_availability(options: Option<Value>) -> Flow<Value> {
	let target = required_target(options.as_ref(), "availability")?;
	let source = option_string(options.as_ref(), "sourceLanguage");
	let supported = language::is_supported(&target) && source.as_deref().is_none_or(language::is_supported);
	Ok(Value::string(if supported { "available" } else { "unavailable" }))
}

fn translator(latency: Duration, options: Option<Value>) -> Flow<Value> {
	let target = required_target(options.as_ref(), "create")?;
	let source = option_string(options.as_ref(), "sourceLanguage");
	if !language::is_supported(&target) || !source.as_deref().is_none_or(language::is_supported) {
		return Err(Value::error(
			"NotSupportedError",
			format!(
				"Unable to create translator for the given source ({}) and target ({target}) languages.",
				source.as_deref().unwrap_or("auto")
			),
		));
	}

	let translate: Rc<dyn Fn(&str) -> String> = {
		let (source, target) = (source.clone(), target.clone());
		Rc::new(move |text: &str| {
			// Without a declared source language the input is detected per call.
			let source = source
				.clone()
				.unwrap_or_else(|| language::detect(text).first().map_or("en", |d| d.language).to_string());
			language::translate(text, &source, &target)
		})
	};

	let instance = Instance::new(ApiKind::Translator, latency);
	let streaming = translate.clone();
	Ok(Value::instance(
		"Translator",
		[
			("sourceLanguage", optional_string(source)),
			("targetLanguage", Value::Str(target)),
			("inputQuota", Value::Number(INPUT_QUOTA)),
			instance.method("translate", move |args| Ok(Value::Str(translate(&text_arg(&args))))),
			instance.streaming("translateStreaming", move |args| Ok(streaming(&text_arg(&args)))),
			instance.measure_input_usage(),
			instance.destroy(),
		],
	))
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

fn summarizer(latency: Duration, options: Option<Value>) -> Flow<Value> {
	let options = options.as_ref();
	let settings = SummaryOptions {
		kind: enum_option(options, "type", "SummarizerType", SummaryType::parse, SummaryType::KeyPoints)?,
		length: enum_option(options, "length", "SummarizerLength", SummaryLength::parse, SummaryLength::Short)?,
		format: enum_option(options, "format", "SummarizerFormat", SummaryFormat::parse, SummaryFormat::Markdown)?,
		shared_context: option_string(options, "sharedContext"),
	};
	let properties = [
		("type", Value::string(settings.kind.as_str())),
		("length", Value::string(settings.length.as_str())),
		("format", Value::string(settings.format.as_str())),
		("sharedContext", optional_string(settings.shared_context.clone())),
		("inputQuota", Value::Number(INPUT_QUOTA)),
	];

	let run = Rc::new(move |args: Vec<Value>| {
		let context = option_string(args.get(1), "context");
		summarize::summarize(&text_arg(&args), &settings, context.as_deref())
	});
	let streaming = run.clone();

	let instance = Instance::new(ApiKind::Summarizer, latency);
	let methods = [
		instance.method("summarize", move |args| Ok(Value::Str(run(args)))),
		instance.streaming("summarizeStreaming", move |args| Ok(streaming(args))),
		instance.measure_input_usage(),
		instance.destroy(),
	];
	Ok(Value::instance("Summarizer", properties.into_iter().chain(methods)))
}

// ---------------------------------------------------------------------------
// Experimental writing APIs
// ---------------------------------------------------------------------------

fn writer(latency: Duration, options: Option<Value>) -> Flow<Value> {
	let shared_context = option_string(options.as_ref(), "sharedContext");
	let instance = Instance::new(ApiKind::Writer, latency);
	Ok(Value::instance(
		"Writer",
		[
			("sharedContext", optional_string(shared_context.clone())),
			instance.method("write", move |args| {
				let context = option_string(args.get(1), "context").or_else(|| shared_context.clone());
				Ok(Value::Str(assist::write(&text_arg(&args), context.as_deref())))
			}),
			instance.destroy(),
		],
	))
}

fn rewriter(latency: Duration, options: Option<Value>) -> Flow<Value> {
	let tone = enum_option(options.as_ref(), "tone", "RewriterTone", assist::Tone::parse, assist::Tone::AsIs)?;
	let instance = Instance::new(ApiKind::Rewriter, latency);
	Ok(Value::instance(
		"Rewriter",
		[
			("tone", optional_string(option_string(options.as_ref(), "tone"))),
			instance.method("rewrite", move |args| {
				let tone = enum_option(args.get(1), "tone", "RewriterTone", assist::Tone::parse, tone)?;
				Ok(Value::Str(assist::rewrite(&text_arg(&args), tone)))
			}),
			instance.destroy(),
		],
	))
}

fn proofreader(latency: Duration) -> Value {
	let instance = Instance::new(ApiKind::Proofreader, latency);
	Value::instance(
		"Proofreader",
		[
			instance.method("proofread", |args| {
				let (corrected, corrections) = assist::proofread(&text_arg(&args));
				let corrections = corrections
					.into_iter()
					.map(|c| {
						Value::object([
							("startIndex", Value::Number(c.start as f64)),
							("endIndex", Value::Number(c.end as f64)),
							("correction", Value::Str(c.correction)),
						])
					})
					.collect();
				Ok(Value::object([
					("correctedInput", Value::Str(corrected)),
					("corrections", Value::array(corrections)),
				]))
			}),
			instance.destroy(),
		],
	)
}

fn language_model(latency: Duration, options: Option<Value>) -> Flow<Value> {
	// The first `system` entry of `initialPrompts` steers every reply.
	let system_prompt = options
		.as_ref()
		.and_then(|o| o.get_key("initialPrompts"))
		.and_then(|prompts| prompts.as_array())
		.and_then(|prompts| {
			prompts
				.into_iter()
				.find(|p| p.get_key("role").is_some_and(|r| r.as_str() == Some("system")))
		})
		.and_then(|p| p.get_key("content"))
		.map(|c| c.to_display_string());
	let instance = Instance::new(ApiKind::LanguageModel, latency);
	Ok(Value::instance(
		"LanguageModel",
		[
			instance.method("prompt", move |args| Ok(Value::Str(assist::respond(&text_arg(&args), system_prompt.as_deref())))),
			instance.destroy(),
		],
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{interpreter::Interpreter, parse_str};
	use futures::executor::block_on;

	fn eval(host: &Host, source: &str) -> Result<Value, Value> {
		let interpreter = Interpreter::new(crate::interpreter::DEFAULT_MAX_CALL_DEPTH);
		host.install(interpreter.globals());
		let program = parse_str(source).expect("parses");
		let scope = interpreter.globals().function();
		block_on(interpreter.drive(interpreter.run(&program, &scope)))
	}

	fn eval_ok(source: &str) -> Value {
		match eval(&Host::default(), source) {
			Ok(v) => v,
			Err(e) => panic!("script failed: {}", e.to_display_string()),
		}
	}

	fn eval_err(source: &str) -> String {
		match eval(&Host::default(), source) {
			Ok(v) => panic!("expected failure, got {}", v.inspect()),
			Err(e) => e.to_display_string(),
		}
	}

	#[test]
	fn experimental_apis_need_the_flag() {
		let host = Host::default();
		assert_eq!(host.available_apis(), [ApiKind::LanguageDetector, ApiKind::Translator, ApiKind::Summarizer]);
		assert_eq!(eval_ok("return typeof Writer;").as_str(), Some("undefined"));
		assert_eq!(eval_ok("return typeof LanguageDetector;").as_str(), Some("function"));

		let flagged = Host::new(HostConfig {
			experimental_apis: true,
			..HostConfig::default()
		});
		assert_eq!(flagged.available_apis().len(), ApiKind::ALL.len());
	}

	#[test]
	fn detector_ranks_languages() {
		let v = eval_ok(
			"const d = await LanguageDetector.create(); const r = await d.detect('Bonjour Scribe! Comment vas-tu?'); return r[0].detectedLanguage;",
		);
		assert_eq!(v.as_str(), Some("fr"));
	}

	#[test]
	fn availability_resolves_available() {
		assert_eq!(eval_ok("return await LanguageDetector.availability();").as_str(), Some("available"));
		assert_eq!(
			eval_ok("return await Translator.availability({ sourceLanguage: 'en', targetLanguage: 'tlh' });").as_str(),
			Some("unavailable")
		);
	}

	#[test]
	fn translator_requires_target_language() {
		assert!(eval_err("await Translator.create({ sourceLanguage: 'fr' })").starts_with("TypeError"));
	}

	#[test]
	fn translator_translates_and_streams() {
		let v = eval_ok(
			"const t = await Translator.create({ sourceLanguage: 'fr', targetLanguage: 'en' });
			return await t.translate('Statut: Le système fonctionne nominalement. Tous les nœuds sont en ligne.');",
		);
		assert_eq!(v.as_str(), Some("Status: The system is operating nominally. All nodes are online."));

		let streamed = eval_ok(
			"const t = await Translator.create({ targetLanguage: 'es' });
			const stream = t.translateStreaming('Hello, the system is stable.');
			let out = '';
			for await (const chunk of stream) { out += chunk; }
			return out;",
		);
		assert_eq!(streamed.as_str(), Some("Hola, el sistema es estable."));
	}

	#[test]
	fn destroyed_instances_reject() {
		let message = eval_err("const t = await Translator.create({ targetLanguage: 'es' }); t.destroy(); await t.translate('hi')");
		assert_eq!(message, "InvalidStateError: The Translator has been destroyed.");
	}

	#[test]
	fn summarizer_validates_type() {
		assert!(eval_err("await Summarizer.create({ type: 'poem' })").contains("SummarizerType"));
		let v = eval_ok("const s = await Summarizer.create({ type: 'headline' }); return s.type;");
		assert_eq!(v.as_str(), Some("headline"));
	}

	#[test]
	fn summarizer_uses_context_argument() {
		let v = eval_ok(
			"const s = await Summarizer.create({ type: 'tldr' });
			return await s.summarize('Cats sleep a lot. Dogs bark at night. Birds sing in the morning.', { context: 'dogs bark night' });",
		);
		assert_eq!(v.as_str(), Some("Dogs bark at night."));
	}

	#[test]
	fn chunks_concatenate_to_input() {
		let text = "Hola, el sistema es estable.";
		assert_eq!(chunks(text).concat(), text);
		assert_eq!(chunks(text).len(), 5);
	}
}
