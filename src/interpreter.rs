//! Tree-walking interpreter for Signal Script.
//!
//! Every evaluation step is an `async fn` so host API calls can be awaited
//! and so a running script can be raced against a timer. Loops and calls
//! periodically yield, which lets a timeout win against `while (true) {}`.
//!
//! Background work (`setTimeout` callbacks, `.then` chains) is queued on the
//! interpreter and polled by [`Interpreter::drive`] alongside the main script.

use std::{
	cell::{Cell, RefCell},
	collections::{HashMap, HashSet},
	future::Future,
	rc::{Rc, Weak},
	task::Poll,
};

use async_recursion::async_recursion;
use futures::{
	FutureExt, StreamExt,
	channel::oneshot,
	future::{self, LocalBoxFuture},
	pin_mut,
	stream::FuturesUnordered,
};
use log::debug;
use serde::Serialize;

use crate::{
	ast::*,
	builtins, timer,
	value::{Callable, Constructor, Promise, Value, format_number},
};

/// Result of evaluating script code: `Err` carries a thrown script value.
pub type Flow<T> = Result<T, Value>;

const YIELD_EVERY: u32 = 64;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Longest string a script may build, in bytes.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

/// Arrays are dense, so their length is capped well below 2^32 - 1.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

pub fn type_error(message: impl Into<String>) -> Value {
	Value::error("TypeError", message)
}

pub fn reference_error(message: impl Into<String>) -> Value {
	Value::error("ReferenceError", message)
}

pub fn range_error(message: impl Into<String>) -> Value {
	Value::error("RangeError", message)
}

pub fn syntax_error(message: impl Into<String>) -> Value {
	Value::error("SyntaxError", message)
}

fn check_string_length(len: Option<usize>) -> Flow<()> {
	match len {
		Some(len) if len <= MAX_STRING_LENGTH => Ok(()),
		_ => Err(range_error("Invalid string length")),
	}
}

fn check_array_length(len: Option<usize>) -> Flow<()> {
	match len {
		Some(len) if len <= MAX_ARRAY_LENGTH => Ok(()),
		_ => Err(range_error("Invalid array length")),
	}
}

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Binding {
	value: Value,
	mutable: bool,
	lexical: bool,
}

struct Frame {
	vars: RefCell<HashMap<String, Binding>>,
	parent: Option<Scope>,
	function_boundary: bool,
}

/// A chain of variable frames. Cloning shares the frame.
#[derive(Clone)]
pub struct Scope(Rc<Frame>);

impl Scope {
	pub fn global() -> Self {
		Scope::with_parent(None, true)
	}

	fn with_parent(parent: Option<Scope>, function_boundary: bool) -> Self {
		Scope(Rc::new(Frame {
			vars: RefCell::new(HashMap::new()),
			parent,
			function_boundary,
		}))
	}

	pub fn block(&self) -> Self {
		Scope::with_parent(Some(self.clone()), false)
	}

	/// A frame that receives `var` declarations, like a function body.
	pub fn function(&self) -> Self {
		Scope::with_parent(Some(self.clone()), true)
	}

	/// Unconditional mutable binding in this frame (parameters, globals, hoisted functions).
	pub fn define(&self, name: &str, value: Value) {
		self.0.vars.borrow_mut().insert(
			name.to_string(),
			Binding {
				value,
				mutable: true,
				lexical: false,
			},
		);
	}

	pub fn declare_lexical(&self, name: &str, value: Value, mutable: bool) -> Flow<()> {
		let mut vars = self.0.vars.borrow_mut();
		if vars.contains_key(name) {
			return Err(syntax_error(format!("Identifier '{name}' has already been declared")));
		}
		vars.insert(
			name.to_string(),
			Binding {
				value,
				mutable,
				lexical: true,
			},
		);
		Ok(())
	}

	/// `var name [= value]`: lives in the nearest function frame and may be redeclared.
	pub fn declare_var(&self, name: &str, value: Option<Value>) -> Flow<()> {
		let target = self.function_scope();
		let mut vars = target.0.vars.borrow_mut();
		match vars.get_mut(name) {
			Some(binding) if binding.lexical => Err(syntax_error(format!("Identifier '{name}' has already been declared"))),
			Some(binding) => {
				if let Some(value) = value {
					binding.value = value;
				}
				Ok(())
			},
			None => {
				vars.insert(
					name.to_string(),
					Binding {
						value: value.unwrap_or(Value::Undefined),
						mutable: true,
						lexical: false,
					},
				);
				Ok(())
			},
		}
	}

	pub fn lookup(&self, name: &str) -> Option<Value> {
		let mut scope = Some(self);
		while let Some(current) = scope {
			if let Some(binding) = current.0.vars.borrow().get(name) {
				return Some(binding.value.clone());
			}
			scope = current.0.parent.as_ref();
		}
		None
	}

	/// Plain assignment. Unknown names become globals, as in sloppy-mode scripts.
	pub fn assign(&self, name: &str, value: Value) -> Flow<()> {
		let mut scope = self;
		loop {
			if let Some(binding) = scope.0.vars.borrow_mut().get_mut(name) {
				if !binding.mutable {
					return Err(type_error("Assignment to constant variable."));
				}
				binding.value = value;
				return Ok(());
			}
			match &scope.0.parent {
				Some(parent) => scope = parent,
				None => break,
			}
		}
		scope.define(name, value);
		Ok(())
	}

	fn function_scope(&self) -> Scope {
		let mut scope = self.clone();
		while !scope.0.function_boundary {
			match scope.0.parent.clone() {
				Some(parent) => scope = parent,
				None => break,
			}
		}
		scope
	}

	/// Fresh frame carrying copies of `names`, used for per-iteration `for (let ...)` bindings.
	fn fork(&self, names: &[String]) -> Scope {
		let vars = self.0.vars.borrow();
		let copied = names
			.iter()
			.filter_map(|name| vars.get(name).map(|binding| (name.clone(), binding.clone())))
			.collect();
		Scope(Rc::new(Frame {
			vars: RefCell::new(copied),
			parent: self.0.parent.clone(),
			function_boundary: false,
		}))
	}
}

// ---------------------------------------------------------------------------
// Console capture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
	Log,
	Info,
	Warn,
	Error,
	Debug,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleLine {
	pub level: ConsoleLevel,
	pub text: String,
}

// ---------------------------------------------------------------------------
// Statement completion
// ---------------------------------------------------------------------------

enum Completion {
	Normal,
	Break,
	Continue,
	Return(Value),
}

/// Assignable place, resolved once so compound assignment evaluates its target a single time.
enum Reference {
	Binding(String),
	Property(Value, String),
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

struct State {
	globals: Scope,
	console: RefCell<Vec<ConsoleLine>>,
	depth: Cell<usize>,
	max_call_depth: usize,
	ticks: Cell<u32>,
	spawned: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
	next_timer: Cell<u32>,
	cleared_timers: RefCell<HashSet<u32>>,
}

/// Cheap handle to one interpreter instance; clones share globals and console.
#[derive(Clone)]
pub struct Interpreter {
	state: Rc<State>,
}

#[derive(Clone)]
pub(crate) struct WeakInterpreter(Weak<State>);

impl WeakInterpreter {
	pub(crate) fn upgrade(&self) -> Option<Interpreter> {
		self.0.upgrade().map(|state| Interpreter { state })
	}
}

impl Interpreter {
	pub fn new(max_call_depth: usize) -> Self {
		let interpreter = Interpreter {
			state: Rc::new(State {
				globals: Scope::global(),
				console: RefCell::new(Vec::new()),
				depth: Cell::new(0),
				max_call_depth,
				ticks: Cell::new(0),
				spawned: RefCell::new(Vec::new()),
				next_timer: Cell::new(1),
				cleared_timers: RefCell::new(HashSet::new()),
			}),
		};
		builtins::install(&interpreter);
		interpreter
	}

	pub fn globals(&self) -> &Scope {
		&self.state.globals
	}

	pub fn console(&self) -> Vec<ConsoleLine> {
		self.state.console.borrow().clone()
	}

	pub(crate) fn push_console(&self, level: ConsoleLevel, text: String) {
		debug!("script console.{level:?}: {text}");
		self.state.console.borrow_mut().push(ConsoleLine { level, text });
	}

	/// Handle for natives stored in globals, which must not keep the interpreter alive.
	pub(crate) fn downgrade(&self) -> WeakInterpreter {
		WeakInterpreter(Rc::downgrade(&self.state))
	}

	/// Queues a future to be polled by [`Interpreter::drive`].
	pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
		self.state.spawned.borrow_mut().push(task.boxed_local());
	}

	pub(crate) fn schedule_timer(&self, callback: Value, delay: std::time::Duration, args: Vec<Value>) -> u32 {
		let id = self.state.next_timer.get();
		self.state.next_timer.set(id + 1);
		let interpreter = self.clone();
		self.spawn(async move {
			timer::sleep(delay).await;
			if interpreter.state.cleared_timers.borrow_mut().remove(&id) {
				return;
			}
			if let Err(thrown) = interpreter.call_value(&callback, Value::Undefined, args).await {
				debug!("uncaught error in timer callback: {}", thrown.error_message());
			}
		});
		id
	}

	pub(crate) fn clear_timer(&self, id: u32) {
		self.state.cleared_timers.borrow_mut().insert(id);
	}

	/// Polls `main` to completion while also driving queued background work.
	/// Background work still pending when `main` finishes is dropped.
	pub async fn drive<F: Future>(&self, main: F) -> F::Output {
		let mut background: FuturesUnordered<LocalBoxFuture<'static, ()>> = FuturesUnordered::new();
		pin_mut!(main);
		future::poll_fn(|cx| {
			loop {
				background.extend(self.state.spawned.borrow_mut().drain(..));
				if let Poll::Ready(output) = main.as_mut().poll(cx) {
					return Poll::Ready(output);
				}
				let mut progressed = false;
				while let Poll::Ready(Some(())) = background.poll_next_unpin(cx) {
					progressed = true;
				}
				if !progressed && self.state.spawned.borrow().is_empty() {
					return Poll::Pending;
				}
			}
		})
		.await
	}

	async fn tick(&self) {
		let ticks = self.state.ticks.get().wrapping_add(1);
		self.state.ticks.set(ticks);
		if ticks % YIELD_EVERY == 0 {
			timer::yield_now().await;
		}
	}

	// --------------------------------------------------
	// Programs and statements
	// --------------------------------------------------

	/// Runs a whole program in `scope`. A top-level `return` ends the script with its value.
	pub async fn run(&self, program: &Program, scope: &Scope) -> Flow<Value> {
		match self.exec_statements(&program.body, scope).await? {
			Completion::Return(value) => Ok(value),
			Completion::Normal => Ok(Value::Undefined),
			Completion::Break => Err(syntax_error("Illegal break statement")),
			Completion::Continue => Err(syntax_error("Illegal continue statement: no surrounding iteration statement")),
		}
	}

	fn hoist(&self, statements: &[Statement], scope: &Scope) -> Flow<()> {
		for statement in statements {
			match statement {
				Statement::Function(def) => {
					if let Some(name) = &def.name {
						scope.define(name, closure(def, scope));
					}
				},
				Statement::VariableDeclaration(decl) if decl.kind == DeclKind::Var => {
					for declarator in &decl.declarators {
						for name in declarator.target.names() {
							scope.declare_var(name, None)?;
						}
					}
				},
				_ => {},
			}
		}
		Ok(())
	}

	#[async_recursion(?Send)]
	async fn exec_statements(&self, statements: &[Statement], scope: &Scope) -> Flow<Completion> {
		self.hoist(statements, scope)?;
		for statement in statements {
			match self.exec_stmt(statement, scope).await? {
				Completion::Normal => {},
				other => return Ok(other),
			}
		}
		Ok(Completion::Normal)
	}

	#[async_recursion(?Send)]
	async fn exec_stmt(&self, statement: &Statement, scope: &Scope) -> Flow<Completion> {
		match statement {
			Statement::Block(block) => self.exec_statements(&block.statements, &scope.block()).await,
			Statement::Expression(expr) => {
				self.eval(expr, scope).await?;
				Ok(Completion::Normal)
			},
			Statement::VariableDeclaration(decl) => {
				self.declare(decl, scope).await?;
				Ok(Completion::Normal)
			},
			Statement::Function(_) | Statement::Empty => Ok(Completion::Normal),
			Statement::If(stmt) => {
				if self.eval(&stmt.condition, scope).await?.truthy() {
					self.exec_stmt(&stmt.then_branch, scope).await
				} else if let Some(else_branch) = &stmt.else_branch {
					self.exec_stmt(else_branch, scope).await
				} else {
					Ok(Completion::Normal)
				}
			},
			Statement::While(stmt) => {
				loop {
					self.tick().await;
					if !self.eval(&stmt.condition, scope).await?.truthy() {
						break;
					}
					match self.exec_stmt(&stmt.body, scope).await? {
						Completion::Break => break,
						Completion::Return(value) => return Ok(Completion::Return(value)),
						Completion::Normal | Completion::Continue => {},
					}
				}
				Ok(Completion::Normal)
			},
			Statement::For(stmt) => self.exec_for(stmt, scope).await,
			Statement::ForOf(stmt) => self.exec_for_of(stmt, scope).await,
			Statement::Break => Ok(Completion::Break),
			Statement::Continue => Ok(Completion::Continue),
			Statement::Return(expr) => {
				let value = match expr {
					Some(expr) => self.eval(expr, scope).await?,
					None => Value::Undefined,
				};
				Ok(Completion::Return(value))
			},
			Statement::Throw(expr) => Err(self.eval(expr, scope).await?),
			Statement::Try(stmt) => {
				let mut result = self.exec_statements(&stmt.block.statements, &scope.block()).await;
				if let Some(handler) = &stmt.handler {
					if let Err(thrown) = result {
						let catch_scope = scope.block();
						if let Some(param) = &handler.param {
							catch_scope.define(param, thrown);
						}
						result = self.exec_statements(&handler.body.statements, &catch_scope).await;
					}
				}
				if let Some(finalizer) = &stmt.finalizer {
					match self.exec_statements(&finalizer.statements, &scope.block()).await? {
						Completion::Normal => {},
						abrupt => return Ok(abrupt),
					}
				}
				result
			},
		}
	}

	async fn exec_for(&self, stmt: &ForStatement, scope: &Scope) -> Flow<Completion> {
		let loop_scope = scope.block();
		let mut per_iteration = Vec::new();
		match &stmt.init {
			Some(ForInit::Declaration(decl)) => {
				self.declare(decl, &loop_scope).await?;
				if decl.kind != DeclKind::Var {
					per_iteration = decl
						.declarators
						.iter()
						.flat_map(|d| d.target.names())
						.map(String::from)
						.collect();
				}
			},
			Some(ForInit::Expression(expr)) => {
				self.eval(expr, &loop_scope).await?;
			},
			None => {},
		}

		let mut iteration = loop_scope;
		loop {
			self.tick().await;
			if let Some(test) = &stmt.test {
				if !self.eval(test, &iteration).await?.truthy() {
					break;
				}
			}
			match self.exec_stmt(&stmt.body, &iteration).await? {
				Completion::Break => break,
				Completion::Return(value) => return Ok(Completion::Return(value)),
				Completion::Normal | Completion::Continue => {},
			}
			if !per_iteration.is_empty() {
				iteration = iteration.fork(&per_iteration);
			}
			if let Some(update) = &stmt.update {
				self.eval(update, &iteration).await?;
			}
		}
		Ok(Completion::Normal)
	}

	async fn exec_for_of(&self, stmt: &ForOfStatement, scope: &Scope) -> Flow<Completion> {
		let iterable = self.eval(&stmt.iterable, scope).await?;
		let mut index = 0;
		loop {
			self.tick().await;
			let next = match &iterable {
				Value::Array(items) => items.borrow().get(index).cloned(),
				Value::Str(s) => s.chars().nth(index).map(|c| Value::Str(c.to_string())),
				Value::Stream(stream) if stmt.is_await => stream.next_chunk().await,
				_ => return Err(type_error(format!("{} is not iterable", stmt.iterable.describe()))),
			};
			index += 1;
			let Some(mut item) = next else { break };
			if stmt.is_await {
				item = self.await_value(item).await?;
			}
			let body_scope = scope.block();
			self.bind_pattern(&stmt.target, Some(item), stmt.kind, &body_scope)?;
			match self.exec_stmt(&stmt.body, &body_scope).await? {
				Completion::Break => break,
				Completion::Return(value) => return Ok(Completion::Return(value)),
				Completion::Normal | Completion::Continue => {},
			}
		}
		Ok(Completion::Normal)
	}

	async fn declare(&self, decl: &VariableDeclaration, scope: &Scope) -> Flow<()> {
		for declarator in &decl.declarators {
			let value = match &declarator.init {
				Some(init) => Some(self.eval(init, scope).await?),
				None if decl.kind == DeclKind::Const => return Err(syntax_error("Missing initializer in const declaration")),
				None => None,
			};
			self.bind_pattern(&declarator.target, value, decl.kind, scope)?;
		}
		Ok(())
	}

	fn bind_pattern(&self, pattern: &Pattern, value: Option<Value>, kind: DeclKind, scope: &Scope) -> Flow<()> {
		let bindings = match pattern {
			Pattern::Identifier(name) => vec![(name.as_str(), value)],
			Pattern::Array(slots) => {
				let source = value.unwrap_or(Value::Undefined);
				let items = match &source {
					Value::Array(items) => items.borrow().clone(),
					Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
					other => return Err(type_error(format!("{} is not iterable", other.inspect()))),
				};
				slots
					.iter()
					.enumerate()
					.filter_map(|(i, slot)| {
						slot.as_deref()
							.map(|name| (name, Some(items.get(i).cloned().unwrap_or(Value::Undefined))))
					})
					.collect()
			},
			Pattern::Object(keys) => {
				let source = value.unwrap_or(Value::Undefined);
				if source.is_nullish() {
					return Err(type_error(format!("Cannot destructure '{}' as it is {}.", source.inspect(), source.inspect())));
				}
				let mut bindings = Vec::with_capacity(keys.len());
				for key in keys {
					bindings.push((key.as_str(), Some(self.get_property(&source, key)?)));
				}
				bindings
			},
		};

		for (name, value) in bindings {
			match kind {
				DeclKind::Var => scope.declare_var(name, value)?,
				DeclKind::Let => scope.declare_lexical(name, value.unwrap_or(Value::Undefined), true)?,
				DeclKind::Const => scope.declare_lexical(name, value.unwrap_or(Value::Undefined), false)?,
			}
		}
		Ok(())
	}

	// --------------------------------------------------
	// Expressions
	// --------------------------------------------------

	#[async_recursion(?Send)]
	pub async fn eval(&self, expr: &Expression, scope: &Scope) -> Flow<Value> {
		match expr {
			Expression::Assignment(target, op, value) => {
				let reference = self.reference(target, scope).await?;
				let result = match op {
					AssignOp::Assign => self.eval(value, scope).await?,
					AssignOp::Nullish => {
						let current = self.read(&reference, scope)?;
						if !current.is_nullish() {
							return Ok(current);
						}
						self.eval(value, scope).await?
					},
					AssignOp::Add => {
						let current = self.read(&reference, scope)?;
						add(&current, &self.eval(value, scope).await?)?
					},
					op => {
						let current = self.read(&reference, scope)?.to_number();
						let rhs = self.eval(value, scope).await?.to_number();
						Value::Number(match op {
							AssignOp::Subtract => current - rhs,
							AssignOp::Multiply => current * rhs,
							AssignOp::Divide => current / rhs,
							_ => current % rhs,
						})
					},
				};
				self.write(reference, result.clone(), scope)?;
				Ok(result)
			},
			Expression::Conditional(test, consequent, alternate) => {
				if self.eval(test, scope).await?.truthy() {
					self.eval(consequent, scope).await
				} else {
					self.eval(alternate, scope).await
				}
			},
			Expression::Nullish(left, right) => {
				let left = self.eval(left, scope).await?;
				if left.is_nullish() { self.eval(right, scope).await } else { Ok(left) }
			},
			Expression::LogicalOr(left, right) => {
				let left = self.eval(left, scope).await?;
				if left.truthy() { Ok(left) } else { self.eval(right, scope).await }
			},
			Expression::LogicalAnd(left, right) => {
				let left = self.eval(left, scope).await?;
				if left.truthy() { self.eval(right, scope).await } else { Ok(left) }
			},
			Expression::Equality(left, op, right) => {
				let left = self.eval(left, scope).await?;
				let right = self.eval(right, scope).await?;
				Ok(Value::Bool(match op {
					EqualityOp::Equal => left.loose_equals(&right),
					EqualityOp::NotEqual => !left.loose_equals(&right),
					EqualityOp::StrictEqual => left.strict_equals(&right),
					EqualityOp::StrictNotEqual => !left.strict_equals(&right),
				}))
			},
			Expression::Comparison(left, op, right) => {
				let left = self.eval(left, scope).await?;
				let right = self.eval(right, scope).await?;
				compare(&left, *op, &right).map(Value::Bool)
			},
			Expression::Term(left, op, right) => {
				let left = self.eval(left, scope).await?;
				let right = self.eval(right, scope).await?;
				Ok(match op {
					TermOp::Add => add(&left, &right)?,
					TermOp::Subtract => Value::Number(left.to_number() - right.to_number()),
				})
			},
			Expression::Factor(left, op, right) => {
				let left = self.eval(left, scope).await?.to_number();
				let right = self.eval(right, scope).await?.to_number();
				Ok(Value::Number(match op {
					FactorOp::Multiply => left * right,
					FactorOp::Divide => left / right,
					FactorOp::Remainder => left % right,
				}))
			},
			Expression::Unary(UnaryOp::TypeOf, operand) => {
				if let Expression::Primary(Primary::Identifier(name)) = &**operand {
					if scope.lookup(name).is_none() {
						return Ok(Value::string("undefined"));
					}
				}
				Ok(Value::string(self.eval(operand, scope).await?.type_of()))
			},
			Expression::Unary(op, operand) => {
				let value = self.eval(operand, scope).await?;
				match op {
					UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
					UnaryOp::Negate => Ok(Value::Number(-value.to_number())),
					UnaryOp::Plus => Ok(Value::Number(value.to_number())),
					UnaryOp::Void => Ok(Value::Undefined),
					UnaryOp::Await => self.await_value(value).await,
					UnaryOp::TypeOf => Ok(Value::string(value.type_of())),
				}
			},
			Expression::Update(op, is_prefix, target) => {
				let reference = self.reference(target, scope).await?;
				let old = self.read(&reference, scope)?.to_number();
				let new = match op {
					UpdateOp::Increment => old + 1.0,
					UpdateOp::Decrement => old - 1.0,
				};
				self.write(reference, Value::Number(new), scope)?;
				Ok(Value::Number(if *is_prefix { new } else { old }))
			},
			Expression::Call(callee, args) => {
				let (function, this) = match &**callee {
					Expression::Member(object, property, optional) => {
						let target = self.eval(object, scope).await?;
						if *optional && target.is_nullish() {
							return Ok(Value::Undefined);
						}
						(self.get_property(&target, property)?, target)
					},
					Expression::Index(object, key) => {
						let target = self.eval(object, scope).await?;
						let key = self.eval(key, scope).await?;
						(self.get_property(&target, &property_key(&key))?, target)
					},
					other => (self.eval(other, scope).await?, Value::Undefined),
				};
				if !matches!(function, Value::Function(_)) {
					return Err(type_error(format!("{} is not a function", callee.describe())));
				}
				let args = self.eval_list(args, scope).await?;
				self.tick().await;
				self.call_value(&function, this, args).await
			},
			Expression::Member(object, property, optional) => {
				let target = self.eval(object, scope).await?;
				if *optional && target.is_nullish() {
					return Ok(Value::Undefined);
				}
				self.get_property(&target, property)
			},
			Expression::Index(object, key) => {
				let target = self.eval(object, scope).await?;
				let key = self.eval(key, scope).await?;
				self.get_property(&target, &property_key(&key))
			},
			Expression::New(callee, args) => {
				let constructor = self.eval(callee, scope).await?;
				let args = self.eval_list(args, scope).await?;
				self.construct(&constructor, &callee.describe(), args).await
			},
			Expression::Function(def) => Ok(closure(def, scope)),
			Expression::Primary(primary) => self.eval_primary(primary, scope).await,
		}
	}

	async fn eval_primary(&self, primary: &Primary, scope: &Scope) -> Flow<Value> {
		match primary {
			Primary::Number(n) => Ok(Value::Number(*n)),
			Primary::String(s) => Ok(Value::Str(s.clone())),
			Primary::Bool(b) => Ok(Value::Bool(*b)),
			Primary::Null => Ok(Value::Null),
			Primary::Identifier(name) => scope
				.lookup(name)
				.ok_or_else(|| reference_error(format!("{name} is not defined"))),
			Primary::Template(parts) => {
				let mut out = String::new();
				for part in parts {
					match part {
						TemplatePart::Text(text) => out.push_str(text),
						TemplatePart::Expression(expr) => {
							let text = self.eval(expr, scope).await?.to_display_string();
							check_string_length(out.len().checked_add(text.len()))?;
							out.push_str(&text);
						},
					}
				}
				Ok(Value::Str(out))
			},
			Primary::Array(items) => Ok(Value::array(self.eval_list(items, scope).await?)),
			Primary::Object(entries) => {
				let mut properties = Vec::with_capacity(entries.len());
				for (key, expr) in entries {
					properties.push((key.clone(), self.eval(expr, scope).await?));
				}
				Ok(Value::object(properties))
			},
			Primary::Parenthesized(inner) => self.eval(inner, scope).await,
		}
	}

	async fn eval_list(&self, exprs: &[Expression], scope: &Scope) -> Flow<Vec<Value>> {
		let mut values = Vec::with_capacity(exprs.len());
		for expr in exprs {
			values.push(self.eval(expr, scope).await?);
		}
		Ok(values)
	}

	async fn reference(&self, target: &Expression, scope: &Scope) -> Flow<Reference> {
		match target {
			Expression::Primary(Primary::Identifier(name)) => Ok(Reference::Binding(name.clone())),
			Expression::Member(object, property, _) => Ok(Reference::Property(self.eval(object, scope).await?, property.clone())),
			Expression::Index(object, key) => {
				let object = self.eval(object, scope).await?;
				let key = self.eval(key, scope).await?;
				Ok(Reference::Property(object, property_key(&key)))
			},
			_ => Err(syntax_error("Invalid left-hand side in assignment")),
		}
	}

	fn read(&self, reference: &Reference, scope: &Scope) -> Flow<Value> {
		match reference {
			Reference::Binding(name) => scope
				.lookup(name)
				.ok_or_else(|| reference_error(format!("{name} is not defined"))),
			Reference::Property(object, key) => self.get_property(object, key),
		}
	}

	fn write(&self, reference: Reference, value: Value, scope: &Scope) -> Flow<()> {
		match reference {
			Reference::Binding(name) => scope.assign(&name, value),
			Reference::Property(object, key) => set_property(&object, &key, value),
		}
	}

	pub async fn await_value(&self, value: Value) -> Flow<Value> {
		match value {
			Value::Promise(promise) => {
				timer::yield_now().await;
				promise.settle().await
			},
			other => Ok(other),
		}
	}

	// --------------------------------------------------
	// Calls
	// --------------------------------------------------

	#[async_recursion(?Send)]
	pub async fn call_value(&self, callee: &Value, this: Value, args: Vec<Value>) -> Flow<Value> {
		let Value::Function(function) = callee else {
			return Err(type_error(format!("{} is not a function", callee.inspect())));
		};
		match &**function {
			Callable::Native { func, .. } => (**func)(&this, args),
			Callable::Method { receiver, name } => self.call_method(receiver, name, args).await,
			Callable::Closure { def, scope } => {
				if def.is_async {
					let settled = self.call_closure(def.clone(), scope.clone(), args).await;
					Ok(Value::Promise(match settled {
						Ok(value) => Promise::resolved(value),
						Err(reason) => Promise::rejected(reason),
					}))
				} else {
					self.call_closure(def.clone(), scope.clone(), args).await
				}
			},
			Callable::Constructor(Constructor::Error(kind)) => Ok(make_error(*kind, &args)),
			Callable::Constructor(Constructor::Promise) => Err(type_error("Promise constructor cannot be invoked without 'new'")),
		}
	}

	async fn call_closure(&self, def: Rc<FunctionDef>, captured: Scope, args: Vec<Value>) -> Flow<Value> {
		let depth = self.state.depth.get();
		if depth >= self.state.max_call_depth {
			return Err(range_error("Maximum call stack size exceeded"));
		}
		self.state.depth.set(depth + 1);

		let frame = captured.function();
		let mut args = args.into_iter();
		for param in &def.params {
			frame.define(param, args.next().unwrap_or(Value::Undefined));
		}
		let result = match &def.body {
			FunctionBody::Expression(expr) => self.eval(expr, &frame).await,
			FunctionBody::Block(block) => match self.exec_statements(&block.statements, &frame).await {
				Ok(Completion::Return(value)) => Ok(value),
				Ok(Completion::Normal) => Ok(Value::Undefined),
				Ok(Completion::Break) => Err(syntax_error("Illegal break statement")),
				Ok(Completion::Continue) => Err(syntax_error("Illegal continue statement: no surrounding iteration statement")),
				Err(thrown) => Err(thrown),
			},
		};

		self.state.depth.set(depth);
		result
	}

	async fn construct(&self, constructor: &Value, described: &str, args: Vec<Value>) -> Flow<Value> {
		match constructor {
			Value::Function(function) => match &**function {
				Callable::Constructor(Constructor::Error(kind)) => Ok(make_error(*kind, &args)),
				Callable::Constructor(Constructor::Promise) => {
					let executor = args.into_iter().next().unwrap_or(Value::Undefined);
					self.construct_promise(executor).await
				},
				_ => Err(type_error(format!("{described} is not a constructor"))),
			},
			Value::Object(_) if constructor.has_method("create") => Err(type_error("Illegal constructor")),
			_ => Err(type_error(format!("{described} is not a constructor"))),
		}
	}

	async fn construct_promise(&self, executor: Value) -> Flow<Value> {
		if !matches!(executor, Value::Function(_)) {
			return Err(type_error(format!("Promise resolver {} is not a function", executor.inspect())));
		}
		let (tx, rx) = oneshot::channel::<Flow<Value>>();
		let slot = Rc::new(RefCell::new(Some(tx)));
		let settle = |name: &str, fulfil: bool| {
			let slot = slot.clone();
			Value::native(name, move |_, args| {
				if let Some(tx) = slot.borrow_mut().take() {
					let value = args.into_iter().next().unwrap_or(Value::Undefined);
					let _ = tx.send(if fulfil { Ok(value) } else { Err(value) });
				}
				Ok(Value::Undefined)
			})
		};
		let resolve = settle("resolve", true);
		let reject = settle("reject", false);

		let promise = Promise::from_future(async move {
			match rx.await {
				Ok(Ok(Value::Promise(inner))) => inner.settle().await,
				Ok(settled) => settled,
				// Nobody can settle it any more.
				Err(oneshot::Canceled) => future::pending().await,
			}
		});

		if let Err(thrown) = self.call_value(&executor, Value::Undefined, vec![resolve, reject]).await {
			if let Some(tx) = slot.borrow_mut().take() {
				let _ = tx.send(Err(thrown));
			}
		}
		Ok(Value::Promise(promise))
	}

	// --------------------------------------------------
	// Properties
	// --------------------------------------------------

	pub fn get_property(&self, target: &Value, key: &str) -> Flow<Value> {
		let method = |receiver: &Value| {
			Value::Function(Rc::new(Callable::Method {
				receiver: receiver.clone(),
				name: key.to_string(),
			}))
		};
		Ok(match target {
			Value::Undefined | Value::Null => {
				return Err(type_error(format!(
					"Cannot read properties of {} (reading '{key}')",
					target.to_display_string()
				)));
			},
			Value::Str(s) => match key {
				"length" => Value::Number(s.encode_utf16().count() as f64),
				_ if STRING_METHODS.contains(&key) => method(target),
				_ => match key.parse::<usize>() {
					Ok(index) => s.chars().nth(index).map(|c| Value::Str(c.to_string())).unwrap_or(Value::Undefined),
					Err(_) => Value::Undefined,
				},
			},
			Value::Number(_) if NUMBER_METHODS.contains(&key) => method(target),
			Value::Bool(_) if key == "toString" => method(target),
			Value::Array(items) => match key {
				"length" => Value::Number(items.borrow().len() as f64),
				_ if ARRAY_METHODS.contains(&key) => method(target),
				_ => match key.parse::<usize>() {
					Ok(index) => items.borrow().get(index).cloned().unwrap_or(Value::Undefined),
					Err(_) => Value::Undefined,
				},
			},
			Value::Object(obj) => obj.borrow().properties.get(key).cloned().unwrap_or(Value::Undefined),
			Value::Function(function) => match (&**function, key) {
				(_, "name") => Value::Str(function.name()),
				(Callable::Constructor(Constructor::Promise), _) if PROMISE_STATICS.contains(&key) => method(target),
				_ => Value::Undefined,
			},
			Value::Promise(_) if PROMISE_METHODS.contains(&key) => method(target),
			_ => Value::Undefined,
		})
	}

	// --------------------------------------------------
	// Built-in methods
	// --------------------------------------------------

	#[async_recursion(?Send)]
	async fn call_method(&self, receiver: &Value, name: &str, args: Vec<Value>) -> Flow<Value> {
		match receiver {
			Value::Array(_) => self.array_method(receiver, name, args).await,
			Value::Str(s) => self.string_method(s, name, args).await,
			Value::Number(n) => number_method(*n, name, &args),
			Value::Bool(b) => Ok(Value::Str(b.to_string())),
			Value::Promise(promise) => Ok(self.promise_method(promise.clone(), name, args)),
			Value::Function(_) => self.promise_static(name, args),
			other => Err(type_error(format!("{}.{name} is not a function", other.inspect()))),
		}
	}

	async fn array_method(&self, receiver: &Value, name: &str, mut args: Vec<Value>) -> Flow<Value> {
		let Value::Array(items) = receiver else {
			return Err(type_error(format!("{name} called on non-array")));
		};
		let len = items.borrow().len();
		let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);

		match name {
			"push" => {
				let mut items = items.borrow_mut();
				items.extend(args);
				Ok(Value::Number(items.len() as f64))
			},
			"pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
			"shift" => {
				let mut items = items.borrow_mut();
				Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
			},
			"unshift" => {
				let mut items = items.borrow_mut();
				items.splice(0..0, args);
				Ok(Value::Number(items.len() as f64))
			},
			"slice" => {
				let start = relative_index(args.first(), len, 0);
				let end = relative_index(args.get(1), len, len).max(start);
				Ok(Value::array(items.borrow()[start..end].to_vec()))
			},
			"splice" => {
				let start = relative_index(args.first(), len, 0);
				let delete = match args.get(1) {
					Some(count) => (count.to_number().max(0.0) as usize).min(len - start),
					None => len - start,
				};
				let inserted = if args.len() > 2 { args.split_off(2) } else { Vec::new() };
				let removed: Vec<Value> = items.borrow_mut().splice(start..start + delete, inserted).collect();
				Ok(Value::array(removed))
			},
			"concat" => {
				let mut joined = items.borrow().clone();
				for value in args {
					match value.as_array() {
						Some(more) => {
							check_array_length(joined.len().checked_add(more.len()))?;
							joined.extend(more);
						},
						None => joined.push(value),
					}
				}
				check_array_length(Some(joined.len()))?;
				Ok(Value::array(joined))
			},
			"join" => {
				let separator = match args.first() {
					None | Some(Value::Undefined) => ",".to_string(),
					Some(sep) => sep.to_display_string(),
				};
				let parts: Vec<String> = items
					.borrow()
					.iter()
					.map(|v| if v.is_nullish() { String::new() } else { v.to_display_string() })
					.collect();
				let separators = separator.len().checked_mul(parts.len().saturating_sub(1));
				let total = parts.iter().try_fold(0usize, |acc, part| acc.checked_add(part.len()));
				check_string_length(separators.zip(total).and_then(|(a, b)| a.checked_add(b)))?;
				Ok(Value::Str(parts.join(&separator)))
			},
			"toString" => Ok(Value::Str(receiver.to_display_string())),
			"reverse" => {
				items.borrow_mut().reverse();
				Ok(receiver.clone())
			},
			"indexOf" => {
				let needle = arg(0);
				let position = items.borrow().iter().position(|v| v.strict_equals(&needle));
				Ok(Value::Number(position.map_or(-1.0, |p| p as f64)))
			},
			"includes" => {
				let needle = arg(0);
				let found = items.borrow().iter().any(|v| same_value_zero(v, &needle));
				Ok(Value::Bool(found))
			},
			"at" => {
				let index = arg(0).to_number().trunc();
				let index = if index < 0.0 { len as f64 + index } else { index };
				Ok(if index >= 0.0 {
					items.borrow().get(index as usize).cloned().unwrap_or(Value::Undefined)
				} else {
					Value::Undefined
				})
			},
			"flat" => {
				let mut flat = Vec::with_capacity(len);
				for value in items.borrow().iter() {
					match value.as_array() {
						Some(inner) => flat.extend(inner),
						None => flat.push(value.clone()),
					}
				}
				Ok(Value::array(flat))
			},
			"map" | "filter" | "forEach" | "find" | "findIndex" | "some" | "every" => {
				let callback = callback_arg(&args, name)?;
				let mut mapped = Vec::new();
				for index in 0..len {
					let Some(item) = items.borrow().get(index).cloned() else { break };
					let result = self
						.call_value(&callback, Value::Undefined, vec![item.clone(), Value::Number(index as f64), receiver.clone()])
						.await?;
					match name {
						"map" => mapped.push(result),
						"filter" if result.truthy() => mapped.push(item),
						"find" if result.truthy() => return Ok(item),
						"findIndex" if result.truthy() => return Ok(Value::Number(index as f64)),
						"some" if result.truthy() => return Ok(Value::Bool(true)),
						"every" if !result.truthy() => return Ok(Value::Bool(false)),
						_ => {},
					}
				}
				Ok(match name {
					"map" | "filter" => Value::array(mapped),
					"find" | "forEach" => Value::Undefined,
					"findIndex" => Value::Number(-1.0),
					"some" => Value::Bool(false),
					_ => Value::Bool(true),
				})
			},
			"reduce" => {
				let callback = callback_arg(&args, name)?;
				let mut start = 0;
				let mut accumulator = match args.get(1) {
					Some(initial) => initial.clone(),
					None => {
						start = 1;
						items
							.borrow()
							.first()
							.cloned()
							.ok_or_else(|| type_error("Reduce of empty array with no initial value"))?
					},
				};
				for index in start..len {
					let Some(item) = items.borrow().get(index).cloned() else { break };
					accumulator = self
						.call_value(
							&callback,
							Value::Undefined,
							vec![accumulator, item, Value::Number(index as f64), receiver.clone()],
						)
						.await?;
				}
				Ok(accumulator)
			},
			"sort" => {
				let comparator = args.first().filter(|v| matches!(v, Value::Function(_))).cloned();
				let mut sorted = items.borrow().clone();
				// Insertion sort: stable, and the comparator may be script code.
				for i in 1..sorted.len() {
					let mut j = i;
					while j > 0 {
						let order = match &comparator {
							Some(cmp) => self
								.call_value(cmp, Value::Undefined, vec![sorted[j - 1].clone(), sorted[j].clone()])
								.await?
								.to_number(),
							None => default_order(&sorted[j - 1], &sorted[j]),
						};
						if order > 0.0 {
							sorted.swap(j - 1, j);
							j -= 1;
						} else {
							break;
						}
					}
				}
				*items.borrow_mut() = sorted;
				Ok(receiver.clone())
			},
			_ => Err(type_error(format!("array.{name} is not a function"))),
		}
	}

	async fn string_method(&self, s: &str, name: &str, args: Vec<Value>) -> Flow<Value> {
		let chars: Vec<char> = s.chars().collect();
		let len = chars.len();
		let text_arg = |i: usize| args.get(i).map(Value::to_display_string).unwrap_or_default();
		let substring = |start: usize, end: usize| -> String { chars[start..end.max(start)].iter().collect() };

		Ok(match name {
			"toUpperCase" => Value::Str(s.to_uppercase()),
			"toLowerCase" => Value::Str(s.to_lowercase()),
			"trim" => Value::string(s.trim()),
			"trimStart" => Value::string(s.trim_start()),
			"trimEnd" => Value::string(s.trim_end()),
			"toString" => Value::string(s),
			"includes" => Value::Bool(s.contains(&text_arg(0))),
			"startsWith" => Value::Bool(s.starts_with(&text_arg(0))),
			"endsWith" => Value::Bool(s.ends_with(&text_arg(0))),
			"indexOf" => Value::Number(match s.find(&text_arg(0)) {
				Some(byte) => s[..byte].chars().count() as f64,
				None => -1.0,
			}),
			"slice" => {
				let start = relative_index(args.first(), len, 0);
				let end = relative_index(args.get(1), len, len);
				Value::Str(substring(start, end))
			},
			"substring" => {
				let clamp = |v: Option<&Value>, default: usize| match v {
					None | Some(Value::Undefined) => default,
					Some(v) => {
						let n = v.to_number();
						if n.is_nan() { 0 } else { n.clamp(0.0, len as f64) as usize }
					},
				};
				let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), len));
				Value::Str(substring(a.min(b), a.max(b)))
			},
			"charAt" => Value::Str(
				chars
					.get(args.first().map_or(0.0, Value::to_number) as usize)
					.map(|c| c.to_string())
					.unwrap_or_default(),
			),
			"at" => {
				let index = args.first().map_or(0.0, Value::to_number).trunc();
				let index = if index < 0.0 { len as f64 + index } else { index };
				if index >= 0.0 {
					chars.get(index as usize).map(|c| Value::Str(c.to_string())).unwrap_or(Value::Undefined)
				} else {
					Value::Undefined
				}
			},
			"split" => match args.first() {
				None | Some(Value::Undefined) => Value::array(vec![Value::string(s)]),
				Some(separator) => {
					let separator = separator.to_display_string();
					let parts: Vec<Value> = if separator.is_empty() {
						chars.iter().map(|c| Value::Str(c.to_string())).collect()
					} else {
						s.split(separator.as_str()).map(Value::string).collect()
					};
					let limit = args.get(1).filter(|v| !v.is_nullish()).map(|v| v.to_number() as i64 as u32 as usize);
					Value::array(match limit {
						Some(limit) => parts.into_iter().take(limit).collect(),
						None => parts,
					})
				},
			},
			"replace" | "replaceAll" => {
				let pattern = text_arg(0);
				let replacement = args.get(1).cloned().unwrap_or(Value::Undefined);
				let mut out = String::with_capacity(s.len());
				let mut rest = s;
				while let Some(at) = rest.find(&pattern) {
					out.push_str(&rest[..at]);
					let replaced = match &replacement {
						Value::Function(_) => self
							.call_value(&replacement, Value::Undefined, vec![Value::string(pattern.clone())])
							.await?
							.to_display_string(),
						other => other.to_display_string(),
					};
					out.push_str(&replaced);
					rest = &rest[at + pattern.len()..];
					if name == "replace" || pattern.is_empty() {
						break;
					}
				}
				out.push_str(rest);
				Value::Str(out)
			},
			"repeat" => {
				let count = args.first().map_or(0.0, Value::to_number);
				if count < 0.0 || count.is_infinite() {
					return Err(range_error(format!("Invalid count value: {}", format_number(count))));
				}
				let count = count as usize;
				check_string_length(s.len().checked_mul(count))?;
				Value::Str(s.repeat(count))
			},
			"padStart" | "padEnd" => {
				let target = args.first().map_or(0.0, Value::to_number).max(0.0) as usize;
				check_string_length(Some(target))?;
				let fill = match args.get(1) {
					None | Some(Value::Undefined) => " ".to_string(),
					Some(v) => v.to_display_string(),
				};
				if target <= len || fill.is_empty() {
					Value::string(s)
				} else {
					let padding: String = fill.chars().cycle().take(target - len).collect();
					Value::Str(if name == "padStart" { padding + s } else { format!("{s}{padding}") })
				}
			},
			"concat" => {
				let mut out = s.to_string();
				for value in &args {
					let text = value.to_display_string();
					check_string_length(out.len().checked_add(text.len()))?;
					out.push_str(&text);
				}
				Value::Str(out)
			},
			_ => return Err(type_error(format!("string.{name} is not a function"))),
		})
	}

	fn promise_method(&self, promise: Promise, name: &str, args: Vec<Value>) -> Value {
		let mut args = args.into_iter();
		let (on_fulfilled, on_rejected, on_finally) = match name {
			"then" => (args.next(), args.next(), None),
			"catch" => (None, args.next(), None),
			_ => (None, None, args.next()),
		};
		let interpreter = self.clone();
		let chained = Promise::from_future(async move {
			let settled = promise.settle().await;
			if let Some(callback @ Value::Function(_)) = on_finally {
				interpreter.call_value(&callback, Value::Undefined, Vec::new()).await?;
				return settled;
			}
			let next = match (settled, on_fulfilled, on_rejected) {
				(Ok(value), Some(callback @ Value::Function(_)), _) => interpreter.call_value(&callback, Value::Undefined, vec![value]).await?,
				(Err(reason), _, Some(callback @ Value::Function(_))) => interpreter.call_value(&callback, Value::Undefined, vec![reason]).await?,
				(settled, _, _) => settled?,
			};
			interpreter.await_value(next).await
		});
		let eager = chained.clone();
		self.spawn(async move {
			let _ = eager.settle().await;
		});
		Value::Promise(chained)
	}

	fn promise_static(&self, name: &str, args: Vec<Value>) -> Flow<Value> {
		let first = args.into_iter().next().unwrap_or(Value::Undefined);
		match name {
			"resolve" => Ok(Value::Promise(Promise::resolved(first))),
			"reject" => Ok(Value::Promise(Promise::rejected(first))),
			"all" | "allSettled" | "race" => {
				let Some(items) = first.as_array() else {
					return Err(type_error(format!("{} is not iterable", first.inspect())));
				};
				let promises: Vec<Promise> = items.into_iter().map(Promise::resolved).collect();
				Ok(match name {
					"all" => Value::promise(async move {
						let values = future::try_join_all(promises.iter().map(Promise::settle)).await?;
						Ok(Value::array(values))
					}),
					"allSettled" => Value::promise(async move {
						let outcomes = future::join_all(promises.iter().map(Promise::settle)).await;
						Ok(Value::array(
							outcomes
								.into_iter()
								.map(|outcome| match outcome {
									Ok(value) => Value::object([("status", Value::string("fulfilled")), ("value", value)]),
									Err(reason) => Value::object([("status", Value::string("rejected")), ("reason", reason)]),
								})
								.collect(),
						))
					}),
					_ => Value::promise(async move {
						if promises.is_empty() {
							return future::pending().await;
						}
						let racers = promises.iter().map(|p| p.settle().boxed_local());
						future::select_all(racers).await.0
					}),
				})
			},
			_ => Err(type_error(format!("Promise.{name} is not a function"))),
		}
	}
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ARRAY_METHODS: &[&str] = &[
	"push", "pop", "shift", "unshift", "slice", "splice", "concat", "join", "toString", "reverse", "indexOf", "includes", "at",
	"flat", "map", "filter", "forEach", "find", "findIndex", "some", "every", "reduce", "sort",
];

const STRING_METHODS: &[&str] = &[
	"toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "toString", "includes", "startsWith", "endsWith", "indexOf",
	"slice", "substring", "charAt", "at", "split", "replace", "replaceAll", "repeat", "padStart", "padEnd", "concat",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

const PROMISE_METHODS: &[&str] = &["then", "catch", "finally"];

const PROMISE_STATICS: &[&str] = &["resolve", "reject", "all", "allSettled", "race"];

fn closure(def: &Rc<FunctionDef>, scope: &Scope) -> Value {
	Value::Function(Rc::new(Callable::Closure {
		def: def.clone(),
		scope: scope.clone(),
	}))
}

fn make_error(kind: &'static str, args: &[Value]) -> Value {
	let message = match args.first() {
		None | Some(Value::Undefined) => String::new(),
		Some(message) => message.to_display_string(),
	};
	Value::error(kind, message)
}

fn callback_arg(args: &[Value], method: &str) -> Flow<Value> {
	match args.first() {
		Some(callback @ Value::Function(_)) => Ok(callback.clone()),
		other => Err(type_error(format!(
			"{} is not a function (in array.{method})",
			other.map_or_else(|| "undefined".to_string(), Value::inspect)
		))),
	}
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Flow<Value> {
	match name {
		"toFixed" => {
			let digits = args.first().map_or(0.0, Value::to_number);
			if !(0.0..=100.0).contains(&digits) {
				return Err(range_error("toFixed() digits argument must be between 0 and 100"));
			}
			Ok(Value::Str(if n.is_finite() {
				format!("{:.*}", digits as usize, n)
			} else {
				format_number(n)
			}))
		},
		_ => Ok(Value::Str(format_number(n))),
	}
}

pub fn property_key(key: &Value) -> String {
	key.to_display_string()
}

/// Resolves a possibly negative `slice`-style index against `len`.
fn relative_index(arg: Option<&Value>, len: usize, default: usize) -> usize {
	match arg {
		None | Some(Value::Undefined) => default,
		Some(value) => {
			let n = value.to_number();
			if n.is_nan() {
				0
			} else if n < 0.0 {
				(len as f64 + n.trunc()).max(0.0) as usize
			} else {
				n.trunc().min(len as f64) as usize
			}
		},
	}
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
		_ => a.strict_equals(b),
	}
}

fn default_order(a: &Value, b: &Value) -> f64 {
	match (a, b) {
		(Value::Undefined, Value::Undefined) => 0.0,
		(Value::Undefined, _) => 1.0,
		(_, Value::Undefined) => -1.0,
		_ => match a.to_display_string().cmp(&b.to_display_string()) {
			std::cmp::Ordering::Less => -1.0,
			std::cmp::Ordering::Equal => 0.0,
			std::cmp::Ordering::Greater => 1.0,
		},
	}
}

fn to_primitive(value: &Value) -> Value {
	match value {
		Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Promise(_) | Value::Stream(_) => {
			Value::Str(value.to_display_string())
		},
		other => other.clone(),
	}
}

fn add(left: &Value, right: &Value) -> Flow<Value> {
	let (left, right) = (to_primitive(left), to_primitive(right));
	if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
		let (left, right) = (left.to_display_string(), right.to_display_string());
		check_string_length(left.len().checked_add(right.len()))?;
		Ok(Value::Str(left + &right))
	} else {
		Ok(Value::Number(left.to_number() + right.to_number()))
	}
}

fn compare(left: &Value, op: ComparisonOp, right: &Value) -> Flow<bool> {
	match op {
		ComparisonOp::In => {
			let key = property_key(left);
			match right {
				Value::Object(_) => Ok(right.has_key(&key)),
				Value::Array(items) => Ok(key == "length" || key.parse::<usize>().is_ok_and(|i| i < items.borrow().len())),
				other => Err(type_error(format!("Cannot use 'in' operator to search for '{key}' in {}", other.inspect()))),
			}
		},
		ComparisonOp::InstanceOf => match right {
			Value::Function(function) => Ok(match &**function {
				Callable::Constructor(Constructor::Error(kind)) => {
					left.class_name() == Some("Error")
						&& (*kind == "Error" || left.get_key("name").and_then(|n| n.as_str().map(String::from)).as_deref() == Some(*kind))
				},
				Callable::Constructor(Constructor::Promise) => matches!(left, Value::Promise(_)),
				_ => false,
			}),
			Value::Object(_) => Ok(match (left.class_name(), right.get_key("name")) {
				(Some(class), Some(Value::Str(name))) => class == name,
				_ => false,
			}),
			_ => Err(type_error("Right-hand side of 'instanceof' is not callable")),
		},
		_ => {
			let (left, right) = (to_primitive(left), to_primitive(right));
			if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
				return Ok(match op {
					ComparisonOp::Less => a < b,
					ComparisonOp::Greater => a > b,
					ComparisonOp::LessEqual => a <= b,
					_ => a >= b,
				});
			}
			let (a, b) = (left.to_number(), right.to_number());
			Ok(match op {
				ComparisonOp::Less => a < b,
				ComparisonOp::Greater => a > b,
				ComparisonOp::LessEqual => a <= b,
				_ => a >= b,
			})
		},
	}
}

pub fn set_property(target: &Value, key: &str, value: Value) -> Flow<()> {
	match target {
		Value::Undefined | Value::Null => Err(type_error(format!(
			"Cannot set properties of {} (setting '{key}')",
			target.to_display_string()
		))),
		Value::Array(items) => {
			let mut items = items.borrow_mut();
			if key == "length" {
				let len = value.to_number();
				if len < 0.0 || len.fract() != 0.0 || len > MAX_ARRAY_LENGTH as f64 {
					return Err(range_error("Invalid array length"));
				}
				items.resize(len as usize, Value::Undefined);
			} else if let Ok(index) = key.parse::<usize>() {
				if index >= items.len() {
					check_array_length(index.checked_add(1))?;
					items.resize(index + 1, Value::Undefined);
				}
				items[index] = value;
			}
			Ok(())
		},
		Value::Object(obj) => {
			obj.borrow_mut().properties.insert(key.to_string(), value);
			Ok(())
		},
		_ => Ok(()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parse_str;
	use futures::executor::block_on;

	fn run_with_depth(src: &str, depth: usize) -> (Flow<Value>, Interpreter) {
		let program = parse_str(src).expect("parse failed");
		let interpreter = Interpreter::new(depth);
		let scope = interpreter.globals().function();
		let result = block_on(interpreter.drive(interpreter.run(&program, &scope)));
		(result, interpreter)
	}

	fn eval_ok(src: &str) -> Value {
		match run_with_depth(src, DEFAULT_MAX_CALL_DEPTH).0 {
			Ok(value) => value,
			Err(thrown) => panic!("script threw: {}", thrown.inspect()),
		}
	}

	fn eval_err(src: &str) -> String {
		match run_with_depth(src, DEFAULT_MAX_CALL_DEPTH).0 {
			Ok(value) => panic!("expected a throw, got {}", value.inspect()),
			Err(thrown) => thrown.to_display_string(),
		}
	}

	#[test]
	fn arithmetic_and_precedence() {
		assert_eq!(eval_ok("return 1 + 2 * 3 - 4 / 2;"), Value::Number(5.0));
		assert_eq!(eval_ok("return 7 % 3;"), Value::Number(1.0));
		assert_eq!(eval_ok("return '1' + 2;"), Value::string("12"));
		assert_eq!(eval_ok("return [1, 2] + '';"), Value::string("1,2"));
	}

	#[test]
	fn closures_capture_per_iteration_bindings() {
		let src = r#"
			const fns = [];
			for (let i = 0; i < 3; i++) { fns.push(() => i); }
			return fns.map(f => f()).join(',');
		"#;
		assert_eq!(eval_ok(src), Value::string("0,1,2"));
	}

	#[test]
	fn const_reassignment_is_a_type_error() {
		assert_eq!(eval_err("const x = 1; x = 2;"), "TypeError: Assignment to constant variable.");
	}

	#[test]
	fn redeclaring_let_is_a_syntax_error() {
		assert_eq!(eval_err("let a = 1; let a = 2;"), "SyntaxError: Identifier 'a' has already been declared");
	}

	#[test]
	fn undefined_names_raise_reference_errors() {
		assert_eq!(eval_err("return missing + 1;"), "ReferenceError: missing is not defined");
		assert_eq!(eval_ok("return typeof missing;"), Value::string("undefined"));
	}

	#[test]
	fn reading_through_undefined_names_the_property() {
		assert_eq!(
			eval_err("let d; d.detect('x');"),
			"TypeError: Cannot read properties of undefined (reading 'detect')"
		);
		assert_eq!(eval_ok("let d; return d?.detect('x');"), Value::Undefined);
	}

	#[test]
	fn calling_a_non_function_reports_the_callee() {
		assert_eq!(eval_err("const o = {}; o.run();"), "TypeError: o.run is not a function");
	}

	#[test]
	fn try_catch_finally_ordering() {
		let src = r#"
			const log = [];
			try { log.push('try'); throw new Error('boom'); }
			catch (e) { log.push(e.message); }
			finally { log.push('finally'); }
			return log.join(' ');
		"#;
		assert_eq!(eval_ok(src), Value::string("try boom finally"));
	}

	#[test]
	fn async_functions_and_await() {
		let src = r#"
			async function double(x) { return x * 2; }
			const value = await double(21);
			return value;
		"#;
		assert_eq!(eval_ok(src), Value::Number(42.0));
	}

	#[test]
	fn promise_chains_run_without_await() {
		let src = r#"
			let seen = 0;
			const p = Promise.resolve(5).then(v => { seen = v; return v + 1; });
			const after = await p;
			return [seen, after].join(',');
		"#;
		assert_eq!(eval_ok(src), Value::string("5,6"));
	}

	#[test]
	fn set_timeout_resolves_promises() {
		let src = r#"
			const v = await new Promise(resolve => setTimeout(() => resolve('late'), 5));
			return v;
		"#;
		assert_eq!(eval_ok(src), Value::string("late"));
	}

	#[test]
	fn rejected_await_can_be_caught() {
		let src = r#"
			try { await Promise.reject(new TypeError('nope')); }
			catch (e) { return e instanceof TypeError ? e.message : 'wrong'; }
		"#;
		assert_eq!(eval_ok(src), Value::string("nope"));
	}

	#[test]
	fn destructuring_and_array_helpers() {
		let src = r#"
			const [first, , third] = [1, 2, 3];
			const { name, size } = { name: 'x', size: 4 };
			const total = [1, 2, 3, 4].filter(n => n % 2 === 0).reduce((a, b) => a + b, 0);
			return `${first}${third}${name}${size}${total}`;
		"#;
		assert_eq!(eval_ok(src), Value::string("13x46"));
	}

	#[test]
	fn sort_with_comparator_is_stable() {
		let src = r#"
			const rows = [{ k: 'b', c: 0.5 }, { k: 'a', c: 0.9 }, { k: 'c', c: 0.5 }];
			rows.sort((x, y) => y.c - x.c);
			return rows.map(r => r.k).join('');
		"#;
		assert_eq!(eval_ok(src), Value::string("abc"));
	}

	#[test]
	fn string_helpers() {
		assert_eq!(eval_ok("return 'a-b-c'.split('-').length;"), Value::Number(3.0));
		assert_eq!(eval_ok("return ' Hi '.trim().toUpperCase().padEnd(4, '!');"), Value::string("HI!!"));
		assert_eq!(eval_ok("return 'aXbX'.replaceAll('X', '.');"), Value::string("a.b."));
		assert_eq!(eval_ok("return (0.956).toFixed(2);"), Value::string("0.96"));
	}

	#[test]
	fn split_limit_wraps_like_uint32() {
		assert_eq!(eval_ok("return 'a-b-c'.split('-', -1).length;"), Value::Number(3.0));
		assert_eq!(eval_ok("return 'a-b-c'.split('-', 2).length;"), Value::Number(2.0));
		assert_eq!(eval_ok("return 'a-b-c'.split('-', 0).length;"), Value::Number(0.0));
	}

	#[test]
	fn oversized_strings_and_arrays_throw_range_errors() {
		assert_eq!(eval_err("return 'ab'.repeat(1e19);"), "RangeError: Invalid string length");
		assert_eq!(eval_err("return 'x'.padStart(1099511627776);"), "RangeError: Invalid string length");
		assert_eq!(eval_err("return 'x'.repeat(536870912);"), "RangeError: Invalid string length");
		assert_eq!(eval_err("const a = []; a[4294967294] = 1;"), "RangeError: Invalid array length");
		assert_eq!(eval_err("const a = []; a.length = 4294967296;"), "RangeError: Invalid array length");
		assert_eq!(eval_ok("return ''.repeat(1e19);"), Value::string(""));
		assert_eq!(eval_ok("const a = []; a[3] = 1; return a.length;"), Value::Number(4.0));
	}

	#[test]
	fn for_of_over_plain_object_is_rejected() {
		assert_eq!(eval_err("const o = {}; for (const x of o) {}"), "TypeError: o is not iterable");
	}

	#[test]
	fn runaway_recursion_hits_the_depth_limit() {
		let (result, _) = run_with_depth("function f() { return f(); } f();", 16);
		let thrown = result.expect_err("should overflow");
		assert_eq!(thrown.to_display_string(), "RangeError: Maximum call stack size exceeded");
	}

	#[test]
	fn top_level_break_is_illegal() {
		assert_eq!(eval_err("break;"), "SyntaxError: Illegal break statement");
	}

	#[test]
	fn while_loop_with_continue_and_break() {
		let src = r#"
			let i = 0; let odd = 0;
			while (true) {
				i++;
				if (i > 9) break;
				if (i % 2 === 0) continue;
				odd += 1;
			}
			return odd;
		"#;
		assert_eq!(eval_ok(src), Value::Number(5.0));
	}

	#[test]
	fn console_output_is_captured() {
		let (_, interpreter) = run_with_depth("console.log('hello', 42, { a: [1] }); console.warn('careful');", 8);
		let lines = interpreter.console();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0].text, "hello 42 { a: [ 1 ] }");
		assert_eq!(lines[1].level, ConsoleLevel::Warn);
	}
}
