use either::Either;
use either::Either::{Left, Right};

use crate::cwl::common::lexer::Token;
use crate::cwl::common::utils::indent;

/// One production of the grammar. A CST node is tagged with the production that built it.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Production {
    Program,
    TopItems,
    MainDecl,
    VarDecl,
    IdList,
    FuncDecl,
    Params,
    Param,
    StmtList,
    Stmt,
    Assign,
    CallStmt,
    PrintStmt,
    IfStmt,
    WhileStmt,
    BreakStmt,
    ReturnStmt,
    Args,
    Call,
    Expr,
    OrExpr,
    AndExpr,
    RelExpr,
    AddExpr,
    MulExpr,
    Unary,
    Primary,
}

impl Production {
    pub fn name(&self) -> &'static str {
        match self {
            Production::Program => "program",
            Production::TopItems => "top_items",
            Production::MainDecl => "main_decl",
            Production::VarDecl => "var_decl",
            Production::IdList => "id_list",
            Production::FuncDecl => "func_decl",
            Production::Params => "params",
            Production::Param => "param",
            Production::StmtList => "stmt_list",
            Production::Stmt => "stmt",
            Production::Assign => "assign_stmt",
            Production::CallStmt => "call_stmt",
            Production::PrintStmt => "print_stmt",
            Production::IfStmt => "if_stmt",
            Production::WhileStmt => "while_stmt",
            Production::BreakStmt => "break_stmt",
            Production::ReturnStmt => "return_stmt",
            Production::Args => "args",
            Production::Call => "call",
            Production::Expr => "expr",
            Production::OrExpr => "or_expr",
            Production::AndExpr => "and_expr",
            Production::RelExpr => "rel_expr",
            Production::AddExpr => "add_expr",
            Production::MulExpr => "mul_expr",
            Production::Unary => "unary",
            Production::Primary => "primary",
        }
    }
}

pub type CstChild = Either<CstNode, Token>;

#[derive(Debug, PartialEq, Clone)]
pub struct CstNode {
    pub production: Production,
    pub children: Vec<CstChild>,
}

impl CstNode {
    pub fn new(production: Production) -> Self {
        CstNode { production, children: Vec::new() }
    }

    pub fn push_node(&mut self, node: CstNode) {
        self.children.push(Left(node))
    }

    pub fn push_token(&mut self, token: Token) {
        self.children.push(Right(token))
    }

    pub fn nodes(&self) -> impl Iterator<Item=&CstNode> {
        self.children.iter().filter_map(|c| c.as_ref().left())
    }

    pub fn tokens(&self) -> impl Iterator<Item=&Token> {
        self.children.iter().filter_map(|c| c.as_ref().right())
    }

    pub fn find_node(&self, production: Production) -> Option<&CstNode> {
        self.nodes().find(|n| n.production == production)
    }

    /// Line of the first token under this node, 0 for an empty node.
    pub fn line(&self) -> usize {
        self.children
            .iter()
            .find_map(|c| match c {
                Left(node) => Some(node.line()).filter(|l| *l > 0),
                Right(token) => Some(token.line),
            })
            .unwrap_or(0)
    }

    pub fn serialize(&self) -> String {
        fn aux(node: &CstNode, depth: usize, out: &mut String) {
            out.push_str(&format!("{}{}\n", indent(depth), node.production.name()));
            for child in &node.children {
                match child {
                    Left(n) => aux(n, depth + 1, out),
                    Right(t) => out.push_str(&format!("{}{}\n", indent(depth + 1), t)),
                }
            }
        }
        let mut out = String::new();
        aux(self, 0, &mut out);
        out
    }
}
