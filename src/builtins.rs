//! Language-level globals every script sees: `console`, `Math`, `JSON`,
//! `Promise`, the `Error` family, conversions and timers.

use std::{cell::Cell, rc::Rc, time::Duration};

use serde::Serialize;

use crate::{
	interpreter::{ConsoleLevel, Interpreter, WeakInterpreter, syntax_error, type_error},
	value::{Callable, Constructor, Value},
};

pub fn install(interpreter: &Interpreter) {
	use Value::*;

	let globals = interpreter.globals();

	globals.define("undefined", Undefined);
	globals.define("NaN", Number(f64::NAN));
	globals.define("Infinity", Number(f64::INFINITY));

	// ---- console ----
	let console_method = |name: &'static str, level: ConsoleLevel| {
		let weak = interpreter.downgrade();
		(
			name,
			Value::native(name, move |_, args| {
				let text = args.iter().map(Value::inspect).collect::<Vec<_>>().join(" ");
				if let Some(interpreter) = weak.upgrade() {
					interpreter.push_console(level, text);
				}
				Ok(Undefined)
			}),
		)
	};
	globals.define(
		"console",
		Value::instance(
			"console",
			[
				console_method("log", ConsoleLevel::Log),
				console_method("info", ConsoleLevel::Info),
				console_method("warn", ConsoleLevel::Warn),
				console_method("error", ConsoleLevel::Error),
				console_method("debug", ConsoleLevel::Debug),
			],
		),
	);

	// ---- Math ----
	let unary = |name: &'static str, f: fn(f64) -> f64| {
		(name, Value::native(name, move |_, args| Ok(Number(f(number_arg(&args, 0))))))
	};
	// Deterministic so level runs are reproducible.
	let seed = Rc::new(Cell::new(0x2545_F491_4F6C_DD1D_u64));
	globals.define(
		"Math",
		Value::instance(
			"Math",
			[
				("PI", Number(std::f64::consts::PI)),
				("E", Number(std::f64::consts::E)),
				unary("floor", f64::floor),
				unary("ceil", f64::ceil),
				unary("abs", f64::abs),
				unary("sqrt", f64::sqrt),
				unary("trunc", f64::trunc),
				unary("round", |x| (x + 0.5).floor()),
				unary("sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
				(
					"pow",
					Value::native("pow", |_, args| Ok(Number(number_arg(&args, 0).powf(number_arg(&args, 1))))),
				),
				(
					"min",
					Value::native("min", |_, args| {
						Ok(Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
							if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
						})))
					}),
				),
				(
					"max",
					Value::native("max", |_, args| {
						Ok(Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
							if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
						})))
					}),
				),
				(
					"random",
					Value::native("random", move |_, _| {
						let mut x = seed.get();
						x ^= x << 13;
						x ^= x >> 7;
						x ^= x << 17;
						seed.set(x);
						Ok(Number((x >> 11) as f64 / (1u64 << 53) as f64))
					}),
				),
			],
		),
	);

	// ---- JSON ----
	globals.define(
		"JSON",
		Value::instance(
			"JSON",
			[
				("stringify", Value::native("stringify", |_, args| json_stringify(&args))),
				(
					"parse",
					Value::native("parse", |_, args| {
						let text = args.first().map(Value::to_display_string).unwrap_or_default();
						serde_json::from_str::<serde_json::Value>(&text)
							.map(|json| Value::from_json(&json))
							.map_err(|e| syntax_error(format!("Unexpected token in JSON at line {} column {}", e.line(), e.column())))
					}),
				),
			],
		),
	);

	// ---- Object / Array ----
	globals.define(
		"Object",
		Value::instance(
			"Object",
			[
				("keys", Value::native("keys", |_, args| Ok(Value::array(entries(&args).into_iter().map(|(k, _)| Str(k)).collect())))),
				("values", Value::native("values", |_, args| Ok(Value::array(entries(&args).into_iter().map(|(_, v)| v).collect())))),
				(
					"entries",
					Value::native("entries", |_, args| {
						Ok(Value::array(
							entries(&args).into_iter().map(|(k, v)| Value::array(vec![Str(k), v])).collect(),
						))
					}),
				),
				(
					"assign",
					Value::native("assign", |_, args| {
						let target = args.first().cloned().unwrap_or(Undefined);
						let Object(object) = &target else {
							return Err(type_error("Cannot convert undefined or null to object"));
						};
						for source in &args[1..] {
							for (key, value) in entries(std::slice::from_ref(source)) {
								object.borrow_mut().properties.insert(key, value);
							}
						}
						Ok(target)
					}),
				),
				("freeze", Value::native("freeze", |_, args| Ok(args.into_iter().next().unwrap_or(Undefined)))),
			],
		),
	);
	globals.define(
		"Array",
		Value::instance(
			"Array",
			[
				("isArray", Value::native("isArray", |_, args| Ok(Bool(matches!(args.first(), Some(Array(_))))))),
				(
					"from",
					Value::native("from", |_, args| {
						Ok(Value::array(match args.first() {
							Some(Array(items)) => items.borrow().clone(),
							Some(Str(s)) => s.chars().map(|c| Str(c.to_string())).collect(),
							_ => Vec::new(),
						}))
					}),
				),
			],
		),
	);

	// ---- conversions ----
	globals.define("Number", Value::native("Number", |_, args| Ok(Number(args.first().map_or(0.0, Value::to_number)))));
	globals.define(
		"String",
		Value::native("String", |_, args| Ok(Str(args.first().map(Value::to_display_string).unwrap_or_default()))),
	);
	globals.define("Boolean", Value::native("Boolean", |_, args| Ok(Bool(args.first().is_some_and(Value::truthy)))));
	globals.define("isNaN", Value::native("isNaN", |_, args| Ok(Bool(number_arg(&args, 0).is_nan()))));
	globals.define("parseFloat", Value::native("parseFloat", |_, args| Ok(Number(parse_float(&string_arg(&args))))));
	globals.define(
		"parseInt",
		Value::native("parseInt", |_, args| {
			let radix = args.get(1).map(Value::to_number).filter(|r| *r >= 2.0 && *r <= 36.0).map_or(10, |r| r as u32);
			Ok(Number(parse_int(&string_arg(&args), radix)))
		}),
	);

	// ---- constructors ----
	globals.define("Promise", Function(Rc::new(Callable::Constructor(Constructor::Promise))));
	for kind in ["Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError"] {
		globals.define(kind, Function(Rc::new(Callable::Constructor(Constructor::Error(kind)))));
	}

	// ---- timers ----
	let weak = interpreter.downgrade();
	globals.define(
		"setTimeout",
		Value::native("setTimeout", move |_, mut args| set_timeout(&weak, &mut args)),
	);
	let weak = interpreter.downgrade();
	globals.define(
		"clearTimeout",
		Value::native("clearTimeout", move |_, args| {
			if let (Some(interpreter), Some(Number(id))) = (weak.upgrade(), args.first()) {
				interpreter.clear_timer(*id as u32);
			}
			Ok(Undefined)
		}),
	);
}

fn set_timeout(weak: &WeakInterpreter, args: &mut Vec<Value>) -> Result<Value, Value> {
	let Some(interpreter) = weak.upgrade() else {
		return Ok(Value::Undefined);
	};
	if args.is_empty() {
		return Err(type_error("The \"callback\" argument must be of type function. Received undefined"));
	}
	let callback = args.remove(0);
	if !matches!(callback, Value::Function(_)) {
		return Err(type_error(format!(
			"The \"callback\" argument must be of type function. Received {}",
			callback.inspect()
		)));
	}
	let delay = if args.is_empty() { 0.0 } else { args.remove(0).to_number() };
	let delay = if delay.is_finite() && delay > 0.0 { Duration::from_millis(delay as u64) } else { Duration::ZERO };
	let id = interpreter.schedule_timer(callback, delay, std::mem::take(args));
	Ok(Value::Number(id as f64))
}

fn number_arg(args: &[Value], index: usize) -> f64 {
	args.get(index).map_or(f64::NAN, Value::to_number)
}

fn string_arg(args: &[Value]) -> String {
	args.first().map(Value::to_display_string).unwrap_or_default()
}

/// Enumerable own entries, as `Object.entries` sees them.
fn entries(args: &[Value]) -> Vec<(String, Value)> {
	match args.first() {
		Some(Value::Object(object)) => object
			.borrow()
			.properties
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect(),
		Some(Value::Array(items)) => items
			.borrow()
			.iter()
			.enumerate()
			.map(|(i, v)| (i.to_string(), v.clone()))
			.collect(),
		Some(Value::Str(s)) => s.chars().enumerate().map(|(i, c)| (i.to_string(), Value::Str(c.to_string()))).collect(),
		_ => Vec::new(),
	}
}

fn json_stringify(args: &[Value]) -> Result<Value, Value> {
	let Some(json) = args.first().and_then(Value::to_json) else {
		return Ok(Value::Undefined);
	};
	let indent = match args.get(2) {
		Some(Value::Number(n)) if *n >= 1.0 => " ".repeat((*n as usize).min(10)),
		Some(Value::Str(s)) => s.chars().take(10).collect(),
		_ => String::new(),
	};
	if indent.is_empty() {
		return Ok(Value::Str(json.to_string()));
	}
	let mut out = Vec::new();
	let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
	let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
	json.serialize(&mut serializer)
		.map_err(|e| type_error(format!("Converting to JSON failed: {e}")))?;
	Ok(Value::Str(String::from_utf8_lossy(&out).into_owned()))
}

fn parse_float(text: &str) -> f64 {
	let text = text.trim_start();
	let starts_numeric = text
		.chars()
		.next()
		.is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-'));
	if !starts_numeric {
		return f64::NAN;
	}
	(1..=text.len())
		.rev()
		.filter(|end| text.is_char_boundary(*end))
		.find_map(|end| text[..end].parse::<f64>().ok())
		.unwrap_or(f64::NAN)
}

fn parse_int(text: &str, radix: u32) -> f64 {
	let text = text.trim();
	let (negative, digits) = match text.strip_prefix('-') {
		Some(rest) => (true, rest),
		None => (false, text.strip_prefix('+').unwrap_or(text)),
	};
	let digits = if radix == 16 {
		digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits)
	} else {
		digits
	};
	let prefix: String = digits.chars().take_while(|c| c.is_digit(radix)).collect();
	if prefix.is_empty() {
		return f64::NAN;
	}
	let value = prefix
		.chars()
		.filter_map(|c| c.to_digit(radix))
		.fold(0.0, |acc, d| acc * radix as f64 + d as f64);
	if negative { -value } else { value }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_int_and_float_take_numeric_prefixes() {
		assert_eq!(parse_int("42px", 10), 42.0);
		assert_eq!(parse_int("-0x1f", 16), -31.0);
		assert!(parse_int("abc", 10).is_nan());
		assert_eq!(parse_float("3.25 apples"), 3.25);
		assert!(parse_float("inf").is_nan());
	}

	#[test]
	fn stringify_honours_indent() {
		let value = Value::object([("a", Value::Number(1.0))]);
		assert_eq!(json_stringify(&[value.clone()]), Ok(Value::string(r#"{"a":1}"#)));
		assert_eq!(
			json_stringify(&[value, Value::Undefined, Value::Number(2.0)]),
			Ok(Value::string("{\n  \"a\": 1\n}"))
		);
		assert_eq!(json_stringify(&[Value::Undefined]), Ok(Value::Undefined));
	}

	#[test]
	fn object_entries_cover_arrays_and_objects() {
		let keys: Vec<String> = entries(&[Value::array(vec![Value::Null, Value::Null])]).into_iter().map(|(k, _)| k).collect();
		assert_eq!(keys, ["0", "1"]);
	}
}
