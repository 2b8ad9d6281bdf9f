//! Runtime values of the script interpreter.
//!
//! Values are reference-counted and single-threaded: arrays and objects are
//! shared `Rc<RefCell<..>>` cells so aliasing behaves the way players expect
//! from JavaScript (`results.push(x)` is visible through every reference).

use std::{
	cell::RefCell,
	collections::VecDeque,
	fmt,
	future::Future,
	rc::Rc,
	time::Duration,
};

use futures::{
	FutureExt,
	future::{LocalBoxFuture, Shared},
};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::{ast::FunctionDef, interpreter::Scope, timer};

pub type NativeFn = Rc<dyn Fn(&Value, Vec<Value>) -> Result<Value, Value>>;

#[derive(Clone)]
pub enum Value {
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
	Array(Rc<RefCell<Vec<Value>>>),
	Object(Rc<RefCell<JsObject>>),
	Function(Rc<Callable>),
	Promise(Promise),
	Stream(Rc<ChunkStream>),
}

#[derive(Debug, Clone, Default)]
pub struct JsObject {
	/// Constructor-ish tag shown by `console.log` (`Object`, `Error`, `Translator`, ...).
	pub class: &'static str,
	pub properties: IndexMap<String, Value>,
}

pub enum Callable {
	Closure { def: Rc<FunctionDef>, scope: Scope },
	Native { name: String, func: NativeFn },
	/// Built-in array/string/number/promise member bound to its receiver.
	Method { receiver: Value, name: String },
	Constructor(Constructor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constructor {
	Promise,
	Error(&'static str),
}

impl Callable {
	pub fn name(&self) -> String {
		match self {
			Callable::Closure { def, .. } => def.name.clone().unwrap_or_default(),
			Callable::Native { name, .. } => name.clone(),
			Callable::Method { name, .. } => name.clone(),
			Callable::Constructor(Constructor::Promise) => "Promise".into(),
			Callable::Constructor(Constructor::Error(kind)) => (*kind).into(),
		}
	}
}

// ---------------------------------------------------------------------------
// Promises
// ---------------------------------------------------------------------------

/// A settle-once result shared by every `await` of the same promise.
#[derive(Clone)]
pub struct Promise(Shared<LocalBoxFuture<'static, Result<Value, Value>>>);

impl Promise {
	pub fn from_future<F>(future: F) -> Self
	where
		F: Future<Output = Result<Value, Value>> + 'static,
	{
		Promise(future.boxed_local().shared())
	}

	/// `Promise.resolve(v)`; an existing promise is adopted rather than wrapped.
	pub fn resolved(value: Value) -> Self {
		match value {
			Value::Promise(p) => p,
			other => Promise::from_future(futures::future::ready(Ok(other))),
		}
	}

	pub fn rejected(reason: Value) -> Self {
		Promise::from_future(futures::future::ready(Err(reason)))
	}

	/// Waits for the promise to settle.
	pub async fn settle(&self) -> Result<Value, Value> {
		self.0.clone().await
	}

	pub fn peek(&self) -> Option<Result<Value, Value>> {
		self.0.peek().cloned()
	}

	fn ptr_eq(&self, other: &Promise) -> bool {
		self.0.ptr_eq(&other.0)
	}
}

// ---------------------------------------------------------------------------
// Streams (`translateStreaming`, `summarizeStreaming`)
// ---------------------------------------------------------------------------

/// Single-consumer chunk stream, only iterable with `for await`.
pub struct ChunkStream {
	chunks: RefCell<VecDeque<String>>,
	latency: Duration,
}

impl ChunkStream {
	pub fn new(chunks: Vec<String>, latency: Duration) -> Self {
		Self {
			chunks: RefCell::new(chunks.into()),
			latency,
		}
	}

	pub async fn next_chunk(&self) -> Option<Value> {
		if self.chunks.borrow().is_empty() {
			return None;
		}
		timer::sleep(self.latency).await;
		self.chunks.borrow_mut().pop_front().map(Value::Str)
	}

	pub fn remaining(&self) -> usize {
		self.chunks.borrow().len()
	}
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

impl Value {
	pub fn string(s: impl Into<String>) -> Value {
		Value::Str(s.into())
	}

	pub fn array(items: Vec<Value>) -> Value {
		Value::Array(Rc::new(RefCell::new(items)))
	}

	pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
		Value::instance("Object", entries)
	}

	pub fn instance<K: Into<String>>(class: &'static str, entries: impl IntoIterator<Item = (K, Value)>) -> Value {
		let properties = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
		Value::Object(Rc::new(RefCell::new(JsObject { class, properties })))
	}

	pub fn native<F>(name: &str, func: F) -> Value
	where
		F: Fn(&Value, Vec<Value>) -> Result<Value, Value> + 'static,
	{
		Value::Function(Rc::new(Callable::Native {
			name: name.to_string(),
			func: Rc::new(func),
		}))
	}

	/// An `Error`-family object, e.g. `Value::error("TypeError", "x is not a function")`.
	pub fn error(kind: &'static str, message: impl Into<String>) -> Value {
		Value::instance(
			"Error",
			[("name", Value::string(kind)), ("message", Value::string(message))],
		)
	}

	pub fn promise<F>(future: F) -> Value
	where
		F: Future<Output = Result<Value, Value>> + 'static,
	{
		Value::Promise(Promise::from_future(future))
	}
}

// ---------------------------------------------------------------------------
// Conversions (JavaScript abstract operations, simplified)
// ---------------------------------------------------------------------------

impl Value {
	pub fn truthy(&self) -> bool {
		match self {
			Value::Undefined | Value::Null => false,
			Value::Bool(b) => *b,
			Value::Number(n) => *n != 0.0 && !n.is_nan(),
			Value::Str(s) => !s.is_empty(),
			_ => true,
		}
	}

	pub fn is_nullish(&self) -> bool {
		matches!(self, Value::Undefined | Value::Null)
	}

	pub fn to_number(&self) -> f64 {
		match self {
			Value::Undefined => f64::NAN,
			Value::Null => 0.0,
			Value::Bool(b) => {
				if *b {
					1.0
				} else {
					0.0
				}
			},
			Value::Number(n) => *n,
			Value::Str(s) => {
				let t = s.trim();
				if t.is_empty() { 0.0 } else { t.parse().unwrap_or(f64::NAN) }
			},
			Value::Array(items) => {
				let items = items.borrow();
				match items.len() {
					0 => 0.0,
					1 => items[0].to_number(),
					_ => f64::NAN,
				}
			},
			_ => f64::NAN,
		}
	}

	/// `String(value)`.
	pub fn to_display_string(&self) -> String {
		match self {
			Value::Undefined => "undefined".into(),
			Value::Null => "null".into(),
			Value::Bool(b) => b.to_string(),
			Value::Number(n) => format_number(*n),
			Value::Str(s) => s.clone(),
			Value::Array(items) => items
				.borrow()
				.iter()
				.map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
				.collect::<Vec<_>>()
				.join(","),
			Value::Object(obj) => {
				let obj = obj.borrow();
				if obj.class == "Error" {
					let name = obj.properties.get("name").map(Value::to_display_string).unwrap_or_else(|| "Error".into());
					let message = obj.properties.get("message").map(Value::to_display_string).unwrap_or_default();
					if message.is_empty() { name } else { format!("{name}: {message}") }
				} else {
					"[object Object]".into()
				}
			},
			Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
			Value::Promise(_) => "[object Promise]".into(),
			Value::Stream(_) => "[object ReadableStream]".into(),
		}
	}

	pub fn type_of(&self) -> &'static str {
		match self {
			Value::Undefined => "undefined",
			Value::Bool(_) => "boolean",
			Value::Number(_) => "number",
			Value::Str(_) => "string",
			Value::Function(_) => "function",
			// Host API classes (`LanguageDetector`, `Translator`, ...).
			Value::Object(o) if o.borrow().class == "Function" => "function",
			_ => "object",
		}
	}

	/// `===`
	pub fn strict_equals(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
			(Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
			(Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
			(Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
			(Value::Stream(a), Value::Stream(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}

	/// `==`
	pub fn loose_equals(&self, other: &Value) -> bool {
		match (self, other) {
			(a, b) if a.is_nullish() && b.is_nullish() => true,
			(a, b) if a.is_nullish() || b.is_nullish() => false,
			(Value::Number(_), Value::Str(_))
			| (Value::Str(_), Value::Number(_))
			| (Value::Bool(_), _)
			| (_, Value::Bool(_)) => {
				if matches!(self, Value::Array(_) | Value::Object(_)) || matches!(other, Value::Array(_) | Value::Object(_)) {
					self.to_display_string() == other.to_display_string()
				} else {
					self.to_number() == other.to_number()
				}
			},
			(Value::Str(s), Value::Array(_) | Value::Object(_)) => *s == other.to_display_string(),
			(Value::Array(_) | Value::Object(_), Value::Str(s)) => self.to_display_string() == *s,
			_ => self.strict_equals(other),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_number(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	/// Snapshot of the elements when the value is an array.
	pub fn as_array(&self) -> Option<Vec<Value>> {
		match self {
			Value::Array(items) => Some(items.borrow().clone()),
			_ => None,
		}
	}

	/// Own property of a plain object.
	pub fn get_key(&self, key: &str) -> Option<Value> {
		match self {
			Value::Object(obj) => obj.borrow().properties.get(key).cloned(),
			_ => None,
		}
	}

	pub fn has_key(&self, key: &str) -> bool {
		match self {
			Value::Object(obj) => obj.borrow().properties.contains_key(key),
			_ => false,
		}
	}

	/// `typeof value[name] === "function"` for object instances.
	pub fn has_method(&self, name: &str) -> bool {
		matches!(self.get_key(name), Some(Value::Function(_)))
	}

	pub fn class_name(&self) -> Option<&'static str> {
		match self {
			Value::Object(obj) => Some(obj.borrow().class),
			_ => None,
		}
	}

	/// The `message` of an `Error` object, or `String(value)` for anything else.
	pub fn error_message(&self) -> String {
		match self.get_key("message") {
			Some(message) if self.class_name() == Some("Error") => message.to_display_string(),
			_ => self.to_display_string(),
		}
	}
}

pub fn format_number(n: f64) -> String {
	if n.is_nan() {
		"NaN".into()
	} else if n.is_infinite() {
		if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
	} else if n == 0.0 {
		"0".into()
	} else if (1e-6..1e21).contains(&n.abs()) {
		// Shortest round-trip digits, never in exponent form.
		format!("{n}")
	} else {
		format!("{n:e}").replacen("e", if n.abs() >= 1.0 { "e+" } else { "e" }, 1)
	}
}

// ---------------------------------------------------------------------------
// console.log style inspection
// ---------------------------------------------------------------------------

const INSPECT_DEPTH: usize = 3;

impl Value {
	/// Node-style rendering used by `console.log` and sample outputs.
	/// Top-level strings are printed raw, nested ones quoted.
	pub fn inspect(&self) -> String {
		match self {
			Value::Str(s) => s.clone(),
			other => other.inspect_nested(0),
		}
	}

	fn inspect_nested(&self, depth: usize) -> String {
		match self {
			Value::Str(s) => format!("'{}'", s.replace('\'', "\\'")),
			Value::Array(items) => {
				let items = items.borrow();
				if items.is_empty() {
					"[]".into()
				} else if depth >= INSPECT_DEPTH {
					"[Array]".into()
				} else {
					let parts: Vec<String> = items.iter().map(|v| v.inspect_nested(depth + 1)).collect();
					format!("[ {} ]", parts.join(", "))
				}
			},
			Value::Object(obj) => {
				let obj = obj.borrow();
				if obj.class == "Error" {
					return self.to_display_string();
				}
				if obj.class == "Function" {
					let name = obj.properties.get("name").map(Value::to_display_string).unwrap_or_default();
					return format!("[class {name}]");
				}
				let prefix = if obj.class == "Object" { String::new() } else { format!("{} ", obj.class) };
				if obj.properties.is_empty() {
					format!("{prefix}{{}}")
				} else if depth >= INSPECT_DEPTH {
					format!("[{}]", obj.class)
				} else {
					let parts: Vec<String> = obj
						.properties
						.iter()
						.map(|(k, v)| format!("{}: {}", k, v.inspect_nested(depth + 1)))
						.collect();
					format!("{prefix}{{ {} }}", parts.join(", "))
				}
			},
			Value::Function(f) => {
				let name = f.name();
				if name.is_empty() { "[Function (anonymous)]".into() } else { format!("[Function: {name}]") }
			},
			Value::Promise(p) => match p.peek() {
				None => "Promise { <pending> }".into(),
				Some(Ok(v)) => format!("Promise {{ {} }}", v.inspect_nested(depth + 1)),
				Some(Err(e)) => format!("Promise {{ <rejected> {} }}", e.inspect_nested(depth + 1)),
			},
			Value::Stream(s) => format!("ReadableStream {{ pending: {} }}", s.remaining()),
			other => other.to_display_string(),
		}
	}
}

// ---------------------------------------------------------------------------
// JSON bridge
// ---------------------------------------------------------------------------

impl Value {
	/// `JSON.stringify` semantics: `None` where JavaScript would produce `undefined`.
	pub fn to_json(&self) -> Option<serde_json::Value> {
		use serde_json::Value as Json;
		match self {
			Value::Undefined | Value::Function(_) => None,
			Value::Null => Some(Json::Null),
			Value::Bool(b) => Some(Json::Bool(*b)),
			Value::Number(n) => Some(
				serde_json::Number::from_f64(*n)
					.map(|num| {
						if n.fract() == 0.0 && n.abs() < 9.0e15 {
							Json::Number((*n as i64).into())
						} else {
							Json::Number(num)
						}
					})
					.unwrap_or(Json::Null),
			),
			Value::Str(s) => Some(Json::String(s.clone())),
			Value::Array(items) => Some(Json::Array(
				items.borrow().iter().map(|v| v.to_json().unwrap_or(Json::Null)).collect(),
			)),
			Value::Object(obj) => {
				let obj = obj.borrow();
				let map = obj
					.properties
					.iter()
					.filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
					.collect();
				Some(Json::Object(map))
			},
			Value::Promise(_) | Value::Stream(_) => Some(Json::Object(Default::default())),
		}
	}

	pub fn from_json(json: &serde_json::Value) -> Value {
		use serde_json::Value as Json;
		match json {
			Json::Null => Value::Null,
			Json::Bool(b) => Value::Bool(*b),
			Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
			Json::String(s) => Value::Str(s.clone()),
			Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
			Json::Object(map) => Value::object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v)))),
		}
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::Str(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::Str(s)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Value::Number(n)
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		self.strict_equals(other)
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Str(s) => write!(f, "{s:?}"),
			other => f.write_str(&other.inspect_nested(0)),
		}
	}
}

/// JSON where `JSON.stringify` would produce it, the console rendering otherwise.
impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match (self, self.to_json()) {
			(Value::Undefined, _) => serializer.serialize_none(),
			(Value::Function(_) | Value::Promise(_) | Value::Stream(_), _) | (_, None) => serializer.serialize_str(&self.inspect()),
			(Value::Object(obj), _) if obj.borrow().class != "Object" => serializer.serialize_str(&self.inspect()),
			(_, Some(json)) => json.serialize(serializer),
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_display_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn numbers_print_like_javascript() {
		assert_eq!(format_number(2.0), "2");
		assert_eq!(format_number(0.95), "0.95");
		assert_eq!(format_number(-0.0), "0");
		assert_eq!(format_number(f64::NAN), "NaN");
		assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
		assert_eq!(format_number(1e20), "100000000000000000000");
		assert_eq!(format_number(-12345678901234567890.0), "-12345678901234567000");
		assert_eq!(format_number(1e21), "1e+21");
		assert_eq!(format_number(1.5e-7), "1.5e-7");
	}

	#[test]
	fn loose_equality_coerces_primitives() {
		assert!(Value::Number(1.0).loose_equals(&Value::string("1")));
		assert!(Value::Null.loose_equals(&Value::Undefined));
		assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
		assert!(!Value::Number(1.0).strict_equals(&Value::string("1")));
	}

	#[test]
	fn arrays_compare_by_identity() {
		let a = Value::array(vec![Value::Number(1.0)]);
		let b = Value::array(vec![Value::Number(1.0)]);
		assert_eq!(a, a.clone());
		assert_ne!(a, b);
	}

	#[test]
	fn inspect_renders_nested_structures() {
		let results = Value::array(vec![Value::object([
			("detectedLanguage", Value::string("fr")),
			("confidence", Value::Number(0.95)),
		])]);
		assert_eq!(results.inspect(), "[ { detectedLanguage: 'fr', confidence: 0.95 } ]");
		assert_eq!(Value::string("plain").inspect(), "plain");
		assert_eq!(Value::error("TypeError", "nope").inspect(), "TypeError: nope");
	}

	#[test]
	fn error_message_prefers_the_message_property() {
		assert_eq!(Value::error("Error", "boom").error_message(), "boom");
		assert_eq!(Value::Number(42.0).error_message(), "42");
	}

	#[test]
	fn json_round_trip_keeps_shape() {
		let json: serde_json::Value = serde_json::json!({ "a": [1, 2.5, "x"], "b": null });
		let value = Value::from_json(&json);
		assert_eq!(value.to_json(), Some(json));
	}

	#[test]
	fn has_method_sees_function_members() {
		let detector = Value::instance("LanguageDetector", [("detect", Value::native("detect", |_, _| Ok(Value::Undefined)))]);
		assert!(detector.has_method("detect"));
		assert!(!detector.has_method("translate"));
		assert_eq!(detector.type_of(), "object");
	}

	#[test]
	fn resolved_promise_adopts_existing_promise() {
		let inner = Promise::resolved(Value::Number(1.0));
		let outer = Promise::resolved(Value::Promise(inner.clone()));
		assert!(outer.ptr_eq(&inner));
		assert_eq!(futures::executor::block_on(outer.settle()), Ok(Value::Number(1.0)));
	}
}
