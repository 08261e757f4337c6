//! Syntax tree for the annotated Python subset.
//!
//! The parser builds these nodes once; lowering only ever borrows them.

use crate::token::Span;

#[derive(Debug, PartialEq, Clone)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(String),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Name(String),
    Constant(Constant),
    Attribute {
        object: Box<Expression>,
        name: String,
    },
    List(Vec<Expression>),
    Tuple(Vec<Expression>),
    Set(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<Expression>,
    },
    /// `ops` and `comparators` have equal length; a chain has more than one.
    Compare {
        left: Box<Expression>,
        ops: Vec<CompareOperator>,
        comparators: Vec<Expression>,
    },
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
        keywords: Vec<Keyword>,
    },
    Subscript {
        object: Box<Expression>,
        index: Box<Expression>,
    },
    Slice {
        lower: Option<Box<Expression>>,
        upper: Option<Box<Expression>>,
        step: Option<Box<Expression>>,
    },
    IfExp {
        condition: Box<Expression>,
        body: Box<Expression>,
        orelse: Box<Expression>,
    },
    FString(Vec<FStringPart>),
    Comprehension {
        kind: ComprehensionKind,
        element: Box<Expression>,
    },
    Lambda,
    Starred(Box<Expression>),
}

impl Expression {
    pub fn name(value: impl Into<String>) -> Self {
        Self::Name(value.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Short label used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Constant(_) => "constant",
            Self::Attribute { .. } => "attribute",
            Self::List(_) => "list literal",
            Self::Tuple(_) => "tuple literal",
            Self::Set(_) => "set literal",
            Self::Dict(_) => "dict literal",
            Self::BinaryOp { .. } => "binary operation",
            Self::UnaryOp { .. } => "unary operation",
            Self::BoolOp { .. } => "boolean operation",
            Self::Compare { .. } => "comparison",
            Self::Call { .. } => "call",
            Self::Subscript { .. } => "subscript",
            Self::Slice { .. } => "slice",
            Self::IfExp { .. } => "conditional expression",
            Self::FString(_) => "f-string",
            Self::Comprehension { kind, .. } => kind.label(),
            Self::Lambda => "lambda",
            Self::Starred(_) => "starred expression",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Keyword {
    pub name: String,
    pub value: Expression,
}

#[derive(Debug, PartialEq, Clone)]
pub enum FStringPart {
    Literal(String),
    Substitution {
        value: Expression,
        conversion: Option<char>,
        format_spec: Option<String>,
    },
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

impl ComprehensionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::List => "list comprehension",
            Self::Set => "set comprehension",
            Self::Dict => "dict comprehension",
            Self::Generator => "generator expression",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LeftShift,
    RightShift,
    BitAnd,
    BitOr,
    BitXor,
    MatMul,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Invert,
    Not,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BoolOperator {
    And,
    Or,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Parameter {
    pub name: String,
    pub annotation: Option<Expression>,
    pub default: Option<Expression>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ExceptHandler {
    pub exception_type: Option<Expression>,
    pub name: Option<String>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Parameter>,
    pub returns: Option<Expression>,
    pub decorators: Vec<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<Expression>,
    pub keywords: Vec<Keyword>,
    pub decorators: Vec<Expression>,
    pub body: Vec<Statement>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum StatementKind {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return(Option<Expression>),
    Expr(Expression),
    AnnAssign {
        target: Expression,
        annotation: Expression,
        value: Option<Expression>,
    },
    /// `a = b = v` keeps every target in source order.
    Assign {
        targets: Vec<Expression>,
        value: Expression,
    },
    AugAssign {
        target: Expression,
        op: BinaryOperator,
        value: Expression,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    For {
        target: Expression,
        iterable: Expression,
        body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Try {
        body: Vec<Statement>,
        handlers: Vec<ExceptHandler>,
        else_body: Vec<Statement>,
        finally_body: Vec<Statement>,
    },
    Raise(Option<Expression>),
    Assert {
        condition: Expression,
        message: Option<Expression>,
    },
    Global(Vec<String>),
    /// Source text of the import, kept for a comment in the output.
    Import(String),
    Break,
    Continue,
    Pass,
    /// A recognised form the compiler never lowers (`with`, `del`, ...).
    Unsupported(&'static str),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub statements: Vec<Statement>,
}
