use std::fmt;
use std::fmt::{Display, Formatter};

use crate::cwl::common::error::ErrorInfo;
use crate::cwl::common::lexer::Direction;
use crate::cwl::common::utils::indent;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Type {
    Int,
    Bool,
    String,
    Dir,
    World,
    Agent,
    Void,
}

impl Type {
    /// Types `print` accepts.
    pub fn is_printable(&self) -> bool {
        matches!(self, Type::Int | Type::Bool | Type::String | Type::Dir)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::Int => "int",
            Type::Bool => "bool",
            Type::String => "string",
            Type::Dir => "dir",
            Type::World => "world",
            Type::Agent => "agent",
            Type::Void => "void",
        })
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Program {
    pub name: String,
    pub declarations: Vec<Declaration>,
    pub main: FuncDecl,
    pub error_info: ErrorInfo,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Declaration {
    Var(VarDecl),
    Func(FuncDecl),
}

#[derive(Debug, PartialEq, Clone)]
pub struct VarDecl {
    pub vars: Vec<VarBinding>,
    pub error_info: ErrorInfo,
}

/// A declared global. `ty` stays `None` until semantic analysis attaches the resolved type.
#[derive(Debug, PartialEq, Clone)]
pub struct VarBinding {
    pub name: String,
    pub ty: Option<Type>,
    pub error_info: ErrorInfo,
}

#[derive(Debug, PartialEq, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: StmtList,
    pub error_info: ErrorInfo,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub error_info: ErrorInfo,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct StmtList {
    pub statements: Vec<Statement>,
}

impl StmtList {
    pub fn new(statements: Vec<Statement>) -> Self { StmtList { statements } }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expression>,
    pub error_info: ErrorInfo,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Statement {
    Assign { target: Identifier, value: Expression, error_info: ErrorInfo },
    Call(Call),
    Print { args: Vec<Expression>, error_info: ErrorInfo },
    If { cond: Expression, then_block: StmtList, else_block: Option<StmtList>, error_info: ErrorInfo },
    While { cond: Expression, body: StmtList, error_info: ErrorInfo },
    Break(ErrorInfo),
    Return(Option<Expression>, ErrorInfo),
}

/// `World` and `Agent` are the keyword spellings; any other spelling is `Named` and reaches the
/// same slots through name normalization.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Identifier {
    Named(String),
    World,
    Agent,
}

impl Identifier {
    pub fn named<S: Into<String>>(str: S) -> Self { Identifier::Named(str.into()) }

    pub fn name(&self) -> &str {
        match self {
            Identifier::Named(name) => name,
            Identifier::World => "world",
            Identifier::Agent => "agent",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    String(String),
    Direction(Direction),
}

impl Literal {
    pub fn get_type(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Bool(_) => Type::Bool,
            Literal::String(_) => Type::String,
            Literal::Direction(_) => Type::Dir,
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::String(s) => write!(f, "{}", s),
            Literal::Direction(d) => write!(f, "{}", d),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    Binary(BinaryOperator, Box<Expression>, Box<Expression>, ErrorInfo),
    Unary(UnaryOperator, Box<Expression>, ErrorInfo),
    Literal(Literal, ErrorInfo),
    Identifier(Identifier, ErrorInfo),
    Call(Call),
}

impl Expression {
    pub fn error_info(&self) -> ErrorInfo {
        match self {
            Expression::Binary(_, _, _, i) => *i,
            Expression::Unary(_, _, i) => *i,
            Expression::Literal(_, i) => *i,
            Expression::Identifier(_, i) => *i,
            Expression::Call(call) => call.error_info,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum UnaryOperator {
    Bang,
}

impl UnaryOperator {
    pub fn symbol(&self) -> &str {
        match self {
            UnaryOperator::Bang => "!",
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum BinaryOperator {
    Minus,
    Plus,
    Div,
    Mult,

    BangEqual,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &str {
        match self {
            BinaryOperator::Minus => "-",
            BinaryOperator::Plus => "+",
            BinaryOperator::Div => "/",
            BinaryOperator::Mult => "*",
            BinaryOperator::BangEqual => "!=",
            BinaryOperator::EqualEqual => "==",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }
}

// Readable tree dump, one node per line, children indented by two spaces.
impl Program {
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        line(&mut out, 0, format!("Program(Name='{}')", self.name));
        line(&mut out, 1, "Declarations:");
        for decl in &self.declarations {
            match decl {
                Declaration::Var(v) => var_decl(&mut out, 2, v),
                Declaration::Func(f) => func_decl(&mut out, 2, f),
            }
        }
        line(&mut out, 1, "Main Function:");
        func_decl(&mut out, 2, &self.main);
        out
    }
}

fn line<S: AsRef<str>>(out: &mut String, depth: usize, text: S) {
    out.push_str(&indent(depth));
    out.push_str(text.as_ref());
    out.push('\n');
}

fn var_decl(out: &mut String, depth: usize, decl: &VarDecl) {
    let vars = decl.vars
        .iter()
        .map(|v| match v.ty {
            Some(ty) => format!("{}: {}", v.name, ty),
            None => v.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    line(out, depth, format!("VarDecl([{}])", vars));
}

fn func_decl(out: &mut String, depth: usize, decl: &FuncDecl) {
    let params = decl.params
        .iter()
        .map(|p| format!("{}: {}", p.name, p.ty))
        .collect::<Vec<_>>()
        .join(", ");
    line(out, depth, format!(
        "FuncDecl(Name='{}', Params=[{}], ReturnType='{}')", decl.name, params, decl.return_type));
    line(out, depth + 1, "Body (StmtList):");
    stmt_list(out, depth + 2, &decl.body);
}

fn stmt_list(out: &mut String, depth: usize, list: &StmtList) {
    line(out, depth, "StmtList (");
    for s in &list.statements {
        statement(out, depth + 1, s);
    }
    line(out, depth, ")");
}

fn statement(out: &mut String, depth: usize, stmt: &Statement) {
    match stmt {
        Statement::Assign { target, value, .. } => {
            line(out, depth, format!("Assign(Target='{}')", target.name()));
            expression(out, depth + 1, value);
        }
        Statement::Call(call) => {
            line(out, depth, format!("Call(Func='{}')", call.name));
            for arg in &call.args {
                expression(out, depth + 1, arg);
            }
        }
        Statement::Print { args, .. } => {
            line(out, depth, "Print");
            for arg in args {
                expression(out, depth + 1, arg);
            }
        }
        Statement::If { cond, then_block, else_block, .. } => {
            line(out, depth, "If");
            expression(out, depth + 1, cond);
            line(out, depth + 1, "Then:");
            stmt_list(out, depth + 2, then_block);
            if let Some(e) = else_block {
                line(out, depth + 1, "Else:");
                stmt_list(out, depth + 2, e);
            }
        }
        Statement::While { cond, body, .. } => {
            line(out, depth, "While");
            expression(out, depth + 1, cond);
            stmt_list(out, depth + 1, body);
        }
        Statement::Break(_) => line(out, depth, "Break"),
        Statement::Return(expr, _) => {
            line(out, depth, format!("Return(HasValue={})", expr.is_some()));
            if let Some(e) = expr {
                expression(out, depth + 1, e);
            }
        }
    }
}

fn expression(out: &mut String, depth: usize, expr: &Expression) {
    match expr {
        Expression::Binary(op, e1, e2, _) => {
            line(out, depth, format!("Binary(Op='{}')", op.symbol()));
            expression(out, depth + 1, e1);
            expression(out, depth + 1, e2);
        }
        Expression::Unary(op, e, _) => {
            line(out, depth, format!("Unary(Op='{}')", op.symbol()));
            expression(out, depth + 1, e);
        }
        Expression::Literal(lit, _) =>
            line(out, depth, format!("Literal(Value='{}', Type='{}')", lit, lit.get_type())),
        Expression::Identifier(Identifier::World, _) => line(out, depth, "World"),
        Expression::Identifier(Identifier::Agent, _) => line(out, depth, "Agent"),
        Expression::Identifier(Identifier::Named(name), _) =>
            line(out, depth, format!("Identifier(Name='{}')", name)),
        Expression::Call(call) => {
            line(out, depth, format!("Call(Func='{}')", call.name));
            for arg in &call.args {
                expression(out, depth + 1, arg);
            }
        }
    }
}
