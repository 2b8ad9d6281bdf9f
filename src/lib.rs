pub mod ast;
mod builtins;
pub mod host;
pub mod interpreter;
pub mod levels;
pub mod runner;
pub mod session;
mod timer;
pub mod validator;
pub mod value;
#[cfg(target_arch = "wasm32")]
mod web;

use std::{rc::Rc, time::Duration};

use ast::{
	AssignOp, Block, CatchClause, ComparisonOp, DeclKind, Declarator, EqualityOp, Expression, FactorOp, ForInit,
	ForOfStatement, ForStatement, FunctionBody, FunctionDef, IfStatement, Pattern, Primary, Program, Statement,
	TemplatePart, TermOp, TryStatement, UnaryOp, UpdateOp, VariableDeclaration, WhileStatement,
};
use log::debug;
use pest::{Parser, error::LineColLocation, iterators::Pair};
use thiserror::Error;

pub use host::{ApiKind, Host, HostConfig};
pub use runner::{ExecutionOutcome, Runner, RunnerConfig, execute};
pub use session::{MemoryStore, Progress, ProgressStore, Session};
pub use validator::{ValidationResult, validate};

#[derive(pest_derive::Parser)]
#[grammar = "grammar.pest"]
struct ScriptParser;

/// Why a script did not produce its capture snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
	#[error("SyntaxError: {message} (line {line}, column {column})")]
	Syntax { message: String, line: usize, column: usize },
	/// An uncaught throw or rejection, rendered the way the console shows it.
	#[error("{0}")]
	Thrown(String),
	#[error("Code execution timed out after {}ms", .0.as_millis())]
	Timeout(Duration),
}

fn syntax_error(error: &pest::error::Error<Rule>) -> ScriptError {
	let (line, column) = match error.line_col {
		LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
	};
	let message = match error.line().chars().nth(column.saturating_sub(1)) {
		Some(c) if !c.is_whitespace() => format!("Unexpected token '{c}'"),
		_ => "Unexpected end of input".to_string(),
	};
	ScriptError::Syntax { message, line, column }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

fn unquote(raw: &str) -> &str {
	&raw[1..raw.len() - 1]
}

fn unescape(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());
	let mut chars = raw.chars().peekable();
	while let Some(c) = chars.next() {
		if c != '\\' {
			out.push(c);
			continue;
		}
		match chars.next() {
			Some('n') => out.push('\n'),
			Some('t') => out.push('\t'),
			Some('r') => out.push('\r'),
			Some('0') => out.push('\0'),
			Some('b') => out.push('\u{8}'),
			Some('f') => out.push('\u{c}'),
			Some('v') => out.push('\u{b}'),
			Some('x') => {
				let hex: String = chars.by_ref().take(2).collect();
				out.extend(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32));
			},
			Some('u') => {
				let hex: String = if chars.peek() == Some(&'{') {
					chars.next();
					chars.by_ref().take_while(|c| *c != '}').collect()
				} else {
					chars.by_ref().take(4).collect()
				};
				out.push(u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}'));
			},
			// Line continuation.
			Some('\n') => {},
			Some(other) => out.push(other),
			None => out.push('\\'),
		}
	}
	out
}

fn is_keyword(rule: Rule) -> bool {
	matches!(
		rule,
		Rule::kw_function
			| Rule::kw_if
			| Rule::kw_else
			| Rule::kw_while
			| Rule::kw_for
			| Rule::kw_of
			| Rule::kw_break
			| Rule::kw_continue
			| Rule::kw_return
			| Rule::kw_throw
			| Rule::kw_try
			| Rule::kw_catch
			| Rule::kw_finally
			| Rule::kw_new
	)
}

/// Inner pairs without the keyword tokens the grammar keeps for `!ident_char` checks.
fn children(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
	pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

fn parse_block(pair: Pair<Rule>) -> Block {
	Block {
		statements: pair.into_inner().map(parse_statement).collect(),
	}
}

fn parse_statement(pair: Pair<Rule>) -> Statement {
	match pair.as_rule() {
		Rule::block => Statement::Block(parse_block(pair)),
		Rule::var_decl => Statement::VariableDeclaration(parse_var_decl(pair)),
		Rule::function_decl => Statement::Function(Rc::new(parse_function(pair))),
		Rule::if_stmt => {
			let mut inner = children(pair);
			let condition = parse_expression(inner.next().unwrap());
			let then_branch = Box::new(parse_statement(inner.next().unwrap()));
			let else_branch = inner.next().map(|p| Box::new(parse_statement(p)));
			Statement::If(IfStatement {
				condition,
				then_branch,
				else_branch,
			})
		},
		Rule::while_stmt => {
			let mut inner = children(pair);
			let condition = parse_expression(inner.next().unwrap());
			let body = Box::new(parse_statement(inner.next().unwrap()));
			Statement::While(WhileStatement { condition, body })
		},
		Rule::for_stmt => {
			let (mut init, mut test, mut update, mut body) = (None, None, None, None);
			for part in children(pair) {
				match part.as_rule() {
					Rule::for_init => {
						let inner = part.into_inner().next().unwrap();
						init = Some(match inner.as_rule() {
							Rule::var_decl => ForInit::Declaration(parse_var_decl(inner)),
							_ => ForInit::Expression(parse_expression(inner)),
						});
					},
					Rule::for_test => test = part.into_inner().next().map(parse_expression),
					Rule::for_update => update = part.into_inner().next().map(parse_expression),
					_ => body = Some(parse_statement(part)),
				}
			}
			Statement::For(ForStatement {
				init,
				test,
				update,
				body: Box::new(body.unwrap_or(Statement::Empty)),
			})
		},
		Rule::for_of_stmt => {
			let mut inner = children(pair).peekable();
			let is_await = inner.next_if(|p| p.as_rule() == Rule::await_mark).is_some();
			let kind = parse_decl_kind(inner.next().unwrap().as_str());
			let target = parse_binding(inner.next().unwrap());
			let iterable = parse_expression(inner.next().unwrap());
			let body = Box::new(parse_statement(inner.next().unwrap()));
			Statement::ForOf(ForOfStatement {
				kind,
				target,
				iterable,
				body,
				is_await,
			})
		},
		Rule::break_stmt => Statement::Break,
		Rule::continue_stmt => Statement::Continue,
		Rule::return_stmt => Statement::Return(children(pair).next().map(parse_expression)),
		Rule::throw_stmt => Statement::Throw(parse_expression(children(pair).next().unwrap())),
		Rule::try_stmt => {
			let mut inner = children(pair);
			let block = parse_block(inner.next().unwrap());
			let (mut handler, mut finalizer) = (None, None);
			for clause in inner {
				match clause.as_rule() {
					Rule::catch_clause => {
						let mut parts = children(clause).peekable();
						let param = parts.next_if(|p| p.as_rule() == Rule::identifier).map(|p| p.as_str().to_string());
						let body = parse_block(parts.next().unwrap());
						handler = Some(CatchClause { param, body });
					},
					_ => finalizer = children(clause).next().map(parse_block),
				}
			}
			Statement::Try(TryStatement {
				block,
				handler,
				finalizer,
			})
		},
		Rule::expr_stmt => Statement::Expression(parse_expression(pair.into_inner().next().unwrap())),
		_ => Statement::Empty,
	}
}

fn parse_decl_kind(kind: &str) -> DeclKind {
	match kind {
		"const" => DeclKind::Const,
		"let" => DeclKind::Let,
		_ => DeclKind::Var,
	}
}

fn parse_var_decl(pair: Pair<Rule>) -> VariableDeclaration {
	let mut inner = pair.into_inner();
	let kind = parse_decl_kind(inner.next().unwrap().as_str());
	let declarators = inner
		.map(|declarator| {
			let mut parts = declarator.into_inner();
			let target = parse_binding(parts.next().unwrap());
			let init = parts.next().map(parse_expression);
			Declarator { target, init }
		})
		.collect();
	VariableDeclaration { kind, declarators }
}

fn parse_binding(pair: Pair<Rule>) -> Pattern {
	let inner = pair.into_inner().next().unwrap();
	match inner.as_rule() {
		Rule::array_pattern => Pattern::Array(
			inner
				.into_inner()
				.map(|slot| slot.into_inner().next().map(|id| id.as_str().to_string()))
				.collect(),
		),
		Rule::object_pattern => Pattern::Object(inner.into_inner().map(|id| id.as_str().to_string()).collect()),
		_ => Pattern::Identifier(inner.as_str().to_string()),
	}
}

/// `function_decl`, `function_expr` and `arrow_function` all land here.
fn parse_function(pair: Pair<Rule>) -> FunctionDef {
	let is_arrow = pair.as_rule() == Rule::arrow_function;
	let mut def = FunctionDef {
		name: None,
		params: Vec::new(),
		body: FunctionBody::Block(Block { statements: Vec::new() }),
		is_async: false,
		is_arrow,
	};
	for part in children(pair) {
		match part.as_rule() {
			Rule::async_mark => def.is_async = true,
			Rule::identifier => def.name = Some(part.as_str().to_string()),
			Rule::params | Rule::arrow_params => {
				def.params = part.into_inner().map(|p| p.as_str().to_string()).collect();
			},
			Rule::block => def.body = FunctionBody::Block(parse_block(part)),
			_ => def.body = FunctionBody::Expression(Box::new(parse_expression(part))),
		}
	}
	def
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

fn parse_binary_expr<O, F>(pair: Pair<Rule>, map_op: fn(&str) -> O, make_expr: F) -> Expression
where
	F: Fn(Box<Expression>, O, Box<Expression>) -> Expression,
{
	let mut inner = pair.into_inner();
	let mut left = parse_expression(inner.next().unwrap());
	while let Some(op_pair) = inner.next() {
		let op = map_op(op_pair.as_str());
		let right = parse_expression(inner.next().unwrap());
		left = make_expr(Box::new(left), op, Box::new(right));
	}
	left
}

/// Left fold for operators the grammar matches as plain literals (`??`, `||`, `&&`).
fn parse_chain(pair: Pair<Rule>, make_expr: fn(Box<Expression>, Box<Expression>) -> Expression) -> Expression {
	let mut inner = pair.into_inner();
	let first = parse_expression(inner.next().unwrap());
	inner.fold(first, |left, right| make_expr(Box::new(left), Box::new(parse_expression(right))))
}

fn parse_expression(pair: Pair<Rule>) -> Expression {
	match pair.as_rule() {
		Rule::expr => parse_expression(pair.into_inner().next().unwrap()),
		Rule::assignment => {
			let mut inner = pair.into_inner();
			let first = inner.next().unwrap();
			match (inner.next(), inner.next()) {
				(Some(op), Some(value)) => {
					let op = match op.as_str() {
						"+=" => AssignOp::Add,
						"-=" => AssignOp::Subtract,
						"*=" => AssignOp::Multiply,
						"/=" => AssignOp::Divide,
						"%=" => AssignOp::Remainder,
						"??=" => AssignOp::Nullish,
						_ => AssignOp::Assign,
					};
					Expression::Assignment(Box::new(parse_expression(first)), op, Box::new(parse_expression(value)))
				},
				_ => parse_expression(first),
			}
		},
		Rule::arrow_function | Rule::function_expr => Expression::Function(Rc::new(parse_function(pair))),
		Rule::conditional => {
			let mut inner = pair.into_inner();
			let test = parse_expression(inner.next().unwrap());
			match (inner.next(), inner.next()) {
				(Some(then), Some(otherwise)) => Expression::Conditional(
					Box::new(test),
					Box::new(parse_expression(then)),
					Box::new(parse_expression(otherwise)),
				),
				_ => test,
			}
		},
		Rule::nullish => parse_chain(pair, Expression::Nullish),
		Rule::logical_or => parse_chain(pair, Expression::LogicalOr),
		Rule::logical_and => parse_chain(pair, Expression::LogicalAnd),
		Rule::equality => parse_binary_expr(
			pair,
			|op| match op {
				"===" => EqualityOp::StrictEqual,
				"!==" => EqualityOp::StrictNotEqual,
				"!=" => EqualityOp::NotEqual,
				_ => EqualityOp::Equal,
			},
			Expression::Equality,
		),
		Rule::comparison => parse_binary_expr(
			pair,
			|op| match op {
				"<" => ComparisonOp::Less,
				">" => ComparisonOp::Greater,
				"<=" => ComparisonOp::LessEqual,
				">=" => ComparisonOp::GreaterEqual,
				"in" => ComparisonOp::In,
				_ => ComparisonOp::InstanceOf,
			},
			Expression::Comparison,
		),
		Rule::additive => parse_binary_expr(
			pair,
			|op| match op {
				"-" => TermOp::Subtract,
				_ => TermOp::Add,
			},
			Expression::Term,
		),
		Rule::multiplicative => parse_binary_expr(
			pair,
			|op| match op {
				"/" => FactorOp::Divide,
				"%" => FactorOp::Remainder,
				_ => FactorOp::Multiply,
			},
			Expression::Factor,
		),
		Rule::unary => {
			let mut ops = Vec::new();
			let mut operand = None;
			for part in pair.into_inner() {
				match part.as_rule() {
					Rule::unary_op => ops.push(match part.as_str() {
						"!" => UnaryOp::Not,
						"-" => UnaryOp::Negate,
						"+" => UnaryOp::Plus,
						"typeof" => UnaryOp::TypeOf,
						"await" => UnaryOp::Await,
						_ => UnaryOp::Void,
					}),
					_ => operand = Some(parse_expression(part)),
				}
			}
			let operand = operand.unwrap_or(Expression::Primary(Primary::Identifier("undefined".into())));
			// Operators apply right to left: `!await x` awaits first.
			ops.into_iter().rev().fold(operand, |expr, op| Expression::Unary(op, Box::new(expr)))
		},
		Rule::update => {
			let mut inner = pair.into_inner();
			let first = inner.next().unwrap();
			let update_op = |s: &str| if s == "++" { UpdateOp::Increment } else { UpdateOp::Decrement };
			if first.as_rule() == Rule::update_op {
				let target = parse_expression(inner.next().unwrap());
				Expression::Update(update_op(first.as_str()), true, Box::new(target))
			} else {
				let target = parse_expression(first);
				match inner.next() {
					Some(op) => Expression::Update(update_op(op.as_str()), false, Box::new(target)),
					None => target,
				}
			}
		},
		Rule::postfix => {
			let mut inner = pair.into_inner();
			let head = parse_expression(inner.next().unwrap());
			inner.fold(head, |object, op| match op.as_rule() {
				Rule::call_args => Expression::Call(Box::new(object), op.into_inner().map(parse_expression).collect()),
				Rule::member_dot => Expression::Member(Box::new(object), member_name(op), false),
				Rule::member_opt => Expression::Member(Box::new(object), member_name(op), true),
				_ => Expression::Index(Box::new(object), Box::new(parse_expression(op.into_inner().next().unwrap()))),
			})
		},
		Rule::new_expr => {
			let mut inner = children(pair);
			let mut callee_parts = inner.next().unwrap().into_inner();
			let base = Expression::Primary(Primary::Identifier(callee_parts.next().unwrap().as_str().to_string()));
			let callee = callee_parts.fold(base, |object, member| Expression::Member(Box::new(object), member_name(member), false));
			let args = inner.next().map(|args| args.into_inner().map(parse_expression).collect()).unwrap_or_default();
			Expression::New(Box::new(callee), args)
		},
		_ => Expression::Primary(parse_primary(pair)),
	}
}

fn member_name(pair: Pair<Rule>) -> String {
	pair.into_inner().next().map(|p| p.as_str().to_string()).unwrap_or_default()
}

fn parse_primary(pair: Pair<Rule>) -> Primary {
	match pair.as_rule() {
		Rule::number => Primary::Number(pair.as_str().parse().unwrap_or(f64::NAN)),
		Rule::string => Primary::String(unescape(unquote(pair.as_str()))),
		Rule::template => Primary::Template(
			pair.into_inner()
				.map(|part| match part.as_rule() {
					Rule::template_expr => TemplatePart::Expression(parse_expression(part.into_inner().next().unwrap())),
					_ => TemplatePart::Text(unescape(part.as_str())),
				})
				.collect(),
		),
		Rule::literal_kw => match pair.as_str() {
			"true" => Primary::Bool(true),
			"false" => Primary::Bool(false),
			_ => Primary::Null,
		},
		Rule::identifier => Primary::Identifier(pair.as_str().to_string()),
		Rule::array_literal => Primary::Array(pair.into_inner().map(parse_expression).collect()),
		Rule::object_literal => Primary::Object(
			pair.into_inner()
				.map(|property| {
					let mut inner = property.into_inner();
					let key = inner.next().unwrap();
					match inner.next() {
						Some(value) => (parse_property_key(key), parse_expression(value)),
						// Shorthand `{ name }`.
						None => {
							let name = key.as_str().to_string();
							(name.clone(), Expression::Primary(Primary::Identifier(name)))
						},
					}
				})
				.collect(),
		),
		Rule::paren_expr => Primary::Parenthesized(Box::new(parse_expression(pair.into_inner().next().unwrap()))),
		_ => Primary::Parenthesized(Box::new(parse_expression(pair))),
	}
}

fn parse_property_key(pair: Pair<Rule>) -> String {
	let key = pair.into_inner().next().unwrap();
	match key.as_rule() {
		Rule::string => unescape(unquote(key.as_str())),
		Rule::number => value::format_number(key.as_str().parse().unwrap_or(f64::NAN)),
		_ => key.as_str().to_string(),
	}
}

pub fn parse_str(input: &str) -> Result<Program, ScriptError> {
	let mut pairs = ScriptParser::parse(Rule::program, input).map_err(|e| syntax_error(&e))?;
	let body = match pairs.next() {
		Some(program) => program
			.into_inner()
			.filter(|p| p.as_rule() != Rule::EOI)
			.map(parse_statement)
			.collect(),
		None => Vec::new(),
	};
	debug!("Parsed {} top-level statements", body.len());
	Ok(Program { body })
}

// ---------------------------------------------------------------------------
// Process setup
// ---------------------------------------------------------------------------

/// Forwards Rust panics to the browser console. A no-op without the feature.
pub fn set_panic_hook() {
	#[cfg(feature = "console_error_panic_hook")]
	console_error_panic_hook::set_once();
}

/// Routes the `log` facade to the browser console or to stderr (`RUST_LOG`).
pub fn init_logging() {
	#[cfg(target_arch = "wasm32")]
	{
		if console_log::init_with_level(log::Level::Debug).is_err() {
			log::warn!("console_log already initialised");
		}
	}

	#[cfg(not(target_arch = "wasm32"))]
	{
		let env = env_logger::Env::default().default_filter_or("info");
		let _ = env_logger::Builder::from_env(env).try_init();
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	fn parse_ok(src: &str) -> Program {
		match parse_str(src) {
			Ok(program) => program,
			Err(e) => panic!("parse failed: {e}"),
		}
	}

	fn parse_err(src: &str) -> ScriptError {
		match parse_str(src) {
			Ok(program) => panic!("expected a syntax error, got {program:?}"),
			Err(e) => e,
		}
	}

	fn only_expression(src: &str) -> Expression {
		match parse_ok(src).body.as_slice() {
			[Statement::Expression(expr)] => expr.clone(),
			other => panic!("expected one expression statement, got {other:?}"),
		}
	}

	fn num(n: f64) -> Box<Expression> {
		Box::new(Expression::Primary(Primary::Number(n)))
	}

	fn ident(name: &str) -> Box<Expression> {
		Box::new(Expression::Primary(Primary::Identifier(name.into())))
	}

	#[test]
	fn binary_operators_fold_left() {
		assert_eq!(
			only_expression("1 - 2 - 3"),
			Expression::Term(Box::new(Expression::Term(num(1.0), TermOp::Subtract, num(2.0))), TermOp::Subtract, num(3.0))
		);
	}

	#[test]
	fn multiplication_binds_tighter() {
		assert_eq!(
			only_expression("1 + 2 * 3"),
			Expression::Term(num(1.0), TermOp::Add, Box::new(Expression::Factor(num(2.0), FactorOp::Multiply, num(3.0))))
		);
	}

	#[test]
	fn declarations_with_destructuring() {
		let program = parse_ok("const [first, , third] = xs; let { a, b } = obj, c;");
		let Statement::VariableDeclaration(decl) = &program.body[0] else { panic!("not a declaration") };
		assert_eq!(decl.kind, DeclKind::Const);
		assert_eq!(decl.declarators[0].target, Pattern::Array(vec![Some("first".into()), None, Some("third".into())]));
		let Statement::VariableDeclaration(decl) = &program.body[1] else { panic!("not a declaration") };
		assert_eq!(decl.declarators.len(), 2);
		assert_eq!(decl.declarators[0].target, Pattern::Object(vec!["a".into(), "b".into()]));
		assert!(decl.declarators[1].init.is_none());
	}

	#[test]
	fn await_and_member_calls() {
		let expr = only_expression("await detector.detect(leafMail)");
		let Expression::Unary(UnaryOp::Await, call) = expr else { panic!("not an await") };
		assert_eq!(call.describe(), "detector.detect(...)");
	}

	#[test]
	fn optional_chaining_and_keywords_as_properties() {
		let expr = only_expression("p?.then(f).catch(g).finally(h)");
		assert_eq!(expr.describe(), "p?.then(...).catch(...).finally(...)");
	}

	#[test]
	fn arrow_functions() {
		let Expression::Function(def) = only_expression("async (a, b) => a + b") else { panic!("not a function") };
		assert!(def.is_async && def.is_arrow);
		assert_eq!(def.params, ["a", "b"]);
		assert!(matches!(def.body, FunctionBody::Expression(_)));

		let Expression::Function(def) = only_expression("x => { return x; }") else { panic!("not a function") };
		assert!(!def.is_async);
		assert!(matches!(def.body, FunctionBody::Block(_)));
	}

	#[test]
	fn templates_and_escapes() {
		let Expression::Primary(Primary::Template(parts)) = only_expression("`n = ${n}\\n`") else {
			panic!("not a template")
		};
		assert_eq!(parts, vec![
			TemplatePart::Text("n = ".into()),
			TemplatePart::Expression(*ident("n")),
			TemplatePart::Text("\n".into()),
		]);
		assert_eq!(
			only_expression(r#"'it\'s é'"#),
			Expression::Primary(Primary::String("it's é".into()))
		);
	}

	#[test]
	fn object_literals() {
		let Expression::Assignment(_, AssignOp::Assign, value) = only_expression("o = { type: 'tldr', length, 'x-y': 1 }")
		else {
			panic!("not an assignment")
		};
		let Expression::Primary(Primary::Object(props)) = *value else { panic!("not an object") };
		let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
		assert_eq!(keys, ["type", "length", "x-y"]);
	}

	#[test]
	fn control_flow_statements() {
		let program = parse_ok(
			"if (a) { b(); } else if (c) d(); else { e(); }
			for (let i = 0; i < 3; i++) {}
			for await (const chunk of stream) { out += chunk; }
			while (x) break;
			try { f(); } catch (err) { g(err); } finally { h(); }
			try { f(); } catch { }",
		);
		assert_eq!(program.body.len(), 6);
		let Statement::If(if_stmt) = &program.body[0] else { panic!("not an if") };
		assert!(matches!(if_stmt.else_branch.as_deref(), Some(Statement::If(_))));
		let Statement::ForOf(for_of) = &program.body[2] else { panic!("not a for-of") };
		assert!(for_of.is_await);
		let Statement::Try(try_stmt) = &program.body[5] else { panic!("not a try") };
		assert_eq!(try_stmt.handler.as_ref().map(|h| h.param.clone()), Some(None));
	}

	#[test]
	fn comments_and_optional_semicolons() {
		let program = parse_ok("// header\nconst a = 1 /* inline */\nconst b = 2\n");
		assert_eq!(program.body.len(), 2);
	}

	#[test]
	fn new_with_member_callee() {
		let Expression::New(_, args) = only_expression("new Promise(r => r(1))") else { panic!("not new") };
		assert!(matches!(args[0], Expression::Function(_)));
		let Expression::New(callee, args) = only_expression("new Error('boom')") else { panic!("not new") };
		assert_eq!(*callee, *ident("Error"));
		assert_eq!(args.len(), 1);
	}

	#[test]
	fn incomplete_declaration_is_a_syntax_error() {
		let err = parse_err("const detector = await LanguageDetector.create();\nconst results = // Your code here\n");
		let ScriptError::Syntax { line, .. } = &err else { panic!("not a syntax error") };
		assert!(*line >= 2);
		assert!(err.to_string().starts_with("SyntaxError: Unexpected"));
	}

	#[test]
	fn unexpected_token_is_reported() {
		let err = parse_err("const = 5;");
		assert_eq!(err.to_string(), "SyntaxError: Unexpected token '=' (line 1, column 7)");
	}

	#[test]
	fn reserved_words_are_not_identifiers() {
		parse_err("const return = 1;");
		parse_ok("const office = 1; const format = 'plain-text';");
	}
}
