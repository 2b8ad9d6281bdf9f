use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
	pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
	pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
	Block(Block),
	Expression(Expression),
	VariableDeclaration(VariableDeclaration),
	Function(Rc<FunctionDef>),
	If(IfStatement),
	While(WhileStatement),
	For(ForStatement),
	ForOf(ForOfStatement),
	Break,
	Continue,
	Return(Option<Expression>),
	Throw(Expression),
	Try(TryStatement),
	Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
	Const,
	Let,
	Var,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
	pub kind: DeclKind,
	pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
	pub target: Pattern,
	pub init: Option<Expression>,
}

/// Binding target of a declaration or `for ... of` head.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
	Identifier(String),
	/// `[a, , b]`; holes are `None`.
	Array(Vec<Option<String>>),
	/// `{ a, b }` shorthand destructuring only.
	Object(Vec<String>),
}

impl Pattern {
	pub fn names(&self) -> Vec<&str> {
		match self {
			Pattern::Identifier(name) => vec![name.as_str()],
			Pattern::Array(slots) => slots.iter().flatten().map(String::as_str).collect(),
			Pattern::Object(keys) => keys.iter().map(String::as_str).collect(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
	pub name: Option<String>,
	pub params: Vec<String>,
	pub body: FunctionBody,
	pub is_async: bool,
	pub is_arrow: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
	Block(Block),
	Expression(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
	pub condition: Expression,
	pub then_branch: Box<Statement>,
	pub else_branch: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
	pub condition: Expression,
	pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
	pub init: Option<ForInit>,
	pub test: Option<Expression>,
	pub update: Option<Expression>,
	pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
	Declaration(VariableDeclaration),
	Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForOfStatement {
	pub kind: DeclKind,
	pub target: Pattern,
	pub iterable: Expression,
	pub body: Box<Statement>,
	pub is_await: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
	pub block: Block,
	pub handler: Option<CatchClause>,
	pub finalizer: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
	pub param: Option<String>,
	pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
	Assignment(Box<Expression>, AssignOp, Box<Expression>),
	Conditional(Box<Expression>, Box<Expression>, Box<Expression>),
	Nullish(Box<Expression>, Box<Expression>),
	LogicalOr(Box<Expression>, Box<Expression>),
	LogicalAnd(Box<Expression>, Box<Expression>),
	Equality(Box<Expression>, EqualityOp, Box<Expression>),
	Comparison(Box<Expression>, ComparisonOp, Box<Expression>),
	Term(Box<Expression>, TermOp, Box<Expression>),
	Factor(Box<Expression>, FactorOp, Box<Expression>),
	Unary(UnaryOp, Box<Expression>),
	Update(UpdateOp, bool, Box<Expression>), // op, is_prefix, target
	Call(Box<Expression>, Vec<Expression>),
	Member(Box<Expression>, String, bool), // object, property, optional chaining
	Index(Box<Expression>, Box<Expression>),
	New(Box<Expression>, Vec<Expression>),
	Function(Rc<FunctionDef>),
	Primary(Primary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
	Assign,
	Add,
	Subtract,
	Multiply,
	Divide,
	Remainder,
	Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOp {
	Equal,
	NotEqual,
	StrictEqual,
	StrictNotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
	Less,
	Greater,
	LessEqual,
	GreaterEqual,
	In,
	InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermOp {
	Add,
	Subtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorOp {
	Multiply,
	Divide,
	Remainder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
	Not,
	Negate,
	Plus,
	TypeOf,
	Await,
	Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
	Increment,
	Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primary {
	Number(f64),
	String(String),
	Template(Vec<TemplatePart>),
	Bool(bool),
	Null,
	Identifier(String),
	Array(Vec<Expression>),
	Object(Vec<(String, Expression)>),
	Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
	Text(String),
	Expression(Expression),
}

impl Expression {
	/// Source-like rendering of a callee, used in `... is not a function` messages.
	pub fn describe(&self) -> String {
		match self {
			Expression::Primary(Primary::Identifier(name)) => name.clone(),
			Expression::Primary(Primary::Parenthesized(inner)) => inner.describe(),
			Expression::Member(object, property, optional) => {
				let dot = if *optional { "?." } else { "." };
				format!("{}{}{}", object.describe(), dot, property)
			},
			Expression::Index(object, _) => format!("{}[...]", object.describe()),
			Expression::Call(callee, _) => format!("{}(...)", callee.describe()),
			_ => "expression".to_string(),
		}
	}
}
