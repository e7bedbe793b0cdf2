use either::Either::{Left, Right};

use crate::cwl::ast::{
    BinaryOperator, Call, Declaration, Expression, FuncDecl, Identifier, Literal, Param, Program,
    Statement, StmtList, Type, UnaryOperator, VarBinding, VarDecl,
};
use crate::cwl::common::error::{ErrorInfo, SyntaxError};
use crate::cwl::common::lexer::{Token, TokenType};
use crate::cwl::cst::{CstNode, Production};

type LowerResult<A> = Result<A, SyntaxError>;

/// Builds the AST from a parse tree. Punctuation is dropped and operator chains are folded to the
/// left. The CST is only read.
#[tracing::instrument(level = "debug", skip_all)]
pub fn lower(cst: &CstNode) -> LowerResult<Program> {
    let program = program(cst)?;
    tracing::debug!(declarations = program.declarations.len(), "lowered program");
    Ok(program)
}

fn malformed(node: &CstNode, expected: &str) -> SyntaxError {
    SyntaxError::new(expected, format!("malformed {}", node.production.name()), node.line())
}

fn expect(node: &CstNode, production: Production) -> LowerResult<&CstNode> {
    if node.production == production {
        Ok(node)
    } else {
        Err(malformed(node, production.name()))
    }
}

fn child(node: &CstNode, production: Production) -> LowerResult<&CstNode> {
    node.find_node(production).ok_or_else(|| malformed(node, production.name()))
}

fn first_child(node: &CstNode) -> LowerResult<&CstNode> {
    node.nodes().next().ok_or_else(|| malformed(node, "a child node"))
}

fn identifier(node: &CstNode) -> LowerResult<&Token> {
    node.tokens()
        .find(|t| matches!(t.get_type(), TokenType::Identifier(_)))
        .ok_or_else(|| malformed(node, "ID"))
}

fn keyword_line(node: &CstNode) -> ErrorInfo {
    ErrorInfo::new(node.line())
}

fn type_of(token: &Token) -> Option<Type> {
    match token.get_type() {
        TokenType::IntType => Some(Type::Int),
        TokenType::BoolType => Some(Type::Bool),
        TokenType::StringType => Some(Type::String),
        _ => None,
    }
}

fn program(node: &CstNode) -> LowerResult<Program> {
    let node = expect(node, Production::Program)?;
    let name = identifier(node)?.lexeme.clone();
    let declarations = child(node, Production::TopItems)?
        .nodes()
        .map(|item| match item.production {
            Production::VarDecl => var_decl(item).map(Declaration::Var),
            Production::FuncDecl => func_decl(item).map(Declaration::Func),
            _ => Err(malformed(item, "var_decl or func_decl")),
        })
        .collect::<LowerResult<Vec<_>>>()?;
    let main = main_decl(child(node, Production::MainDecl)?)?;
    Ok(Program { name, declarations, main, error_info: keyword_line(node) })
}

fn main_decl(node: &CstNode) -> LowerResult<FuncDecl> {
    Ok(FuncDecl {
        name: identifier(node)?.lexeme.clone(),
        params: Vec::new(),
        return_type: Type::Void,
        body: stmt_list(child(node, Production::StmtList)?)?,
        error_info: keyword_line(node),
    })
}

fn var_decl(node: &CstNode) -> LowerResult<VarDecl> {
    let vars = child(node, Production::IdList)?
        .tokens()
        .filter_map(|t| match t.get_type() {
            TokenType::Identifier(name) =>
                Some(VarBinding { name: name.clone(), ty: None, error_info: t.error_info() }),
            _ => None,
        })
        .collect::<Vec<_>>();
    if vars.is_empty() {
        return Err(malformed(node, "ID"));
    }
    Ok(VarDecl { vars, error_info: keyword_line(node) })
}

fn func_decl(node: &CstNode) -> LowerResult<FuncDecl> {
    let params = match node.find_node(Production::Params) {
        Some(params) => params.nodes().map(param).collect::<LowerResult<Vec<_>>>()?,
        None => Vec::new(),
    };
    // Parameter types sit inside `param` nodes, so a type token directly under the declaration is
    // the return type.
    let return_type = node.tokens().find_map(type_of).unwrap_or(Type::Void);
    Ok(FuncDecl {
        name: identifier(node)?.lexeme.clone(),
        params,
        return_type,
        body: stmt_list(child(node, Production::StmtList)?)?,
        error_info: keyword_line(node),
    })
}

fn param(node: &CstNode) -> LowerResult<Param> {
    let node = expect(node, Production::Param)?;
    let name = identifier(node)?;
    let ty = node.tokens().find_map(type_of).ok_or_else(|| malformed(node, "TYPE"))?;
    Ok(Param { name: name.lexeme.clone(), ty, error_info: name.error_info() })
}

fn stmt_list(node: &CstNode) -> LowerResult<StmtList> {
    let node = expect(node, Production::StmtList)?;
    node.nodes()
        .map(|s| expect(s, Production::Stmt).and_then(first_child).and_then(statement))
        .collect::<LowerResult<Vec<_>>>()
        .map(StmtList::new)
}

fn statement(node: &CstNode) -> LowerResult<Statement> {
    let error_info = keyword_line(node);
    match node.production {
        Production::Assign => {
            let target = match node.tokens().next().map(|t| t.get_type()) {
                Some(TokenType::World) => Identifier::World,
                Some(TokenType::Agent) => Identifier::Agent,
                Some(TokenType::Identifier(name)) => Identifier::named(name.as_str()),
                _ => return Err(malformed(node, "assignment target")),
            };
            let value = expression(child(node, Production::Expr)?)?;
            Ok(Statement::Assign { target, value, error_info })
        }
        Production::CallStmt => call(child(node, Production::Call)?).map(Statement::Call),
        Production::PrintStmt => Ok(Statement::Print { args: args(node)?, error_info }),
        Production::IfStmt => {
            let cond = expression(child(node, Production::Expr)?)?;
            let mut blocks = node.nodes().filter(|n| n.production == Production::StmtList);
            let then_block = stmt_list(blocks.next().ok_or_else(|| malformed(node, "stmt_list"))?)?;
            let else_block = blocks.next().map(stmt_list).transpose()?;
            Ok(Statement::If { cond, then_block, else_block, error_info })
        }
        Production::WhileStmt => Ok(Statement::While {
            cond: expression(child(node, Production::Expr)?)?,
            body: stmt_list(child(node, Production::StmtList)?)?,
            error_info,
        }),
        Production::BreakStmt => Ok(Statement::Break(error_info)),
        Production::ReturnStmt => Ok(Statement::Return(
            node.find_node(Production::Expr).map(expression).transpose()?,
            error_info,
        )),
        _ => Err(malformed(node, "statement")),
    }
}

fn call(node: &CstNode) -> LowerResult<Call> {
    let node = expect(node, Production::Call)?;
    let name = identifier(node)?;
    Ok(Call { name: name.lexeme.clone(), args: args(node)?, error_info: name.error_info() })
}

// Missing `args` node means an empty argument list.
fn args(node: &CstNode) -> LowerResult<Vec<Expression>> {
    match node.find_node(Production::Args) {
        Some(args) => args.nodes().map(expression).collect(),
        None => Ok(Vec::new()),
    }
}

fn expression(node: &CstNode) -> LowerResult<Expression> {
    match node.production {
        Production::Expr => expression(first_child(node)?),
        Production::OrExpr | Production::AndExpr | Production::RelExpr | Production::AddExpr
        | Production::MulExpr => chain(node),
        Production::Unary => unary(node),
        Production::Primary => primary(node),
        _ => Err(malformed(node, "expression")),
    }
}

fn chain(node: &CstNode) -> LowerResult<Expression> {
    let mut children = node.children.iter();
    let mut expr = match children.next() {
        Some(Left(first)) => expression(first)?,
        _ => return Err(malformed(node, "operand")),
    };
    while let Some(op) = children.next() {
        let op = match op {
            Right(token) => token,
            Left(_) => return Err(malformed(node, "operator")),
        };
        let right = match children.next() {
            Some(Left(right)) => expression(right)?,
            _ => return Err(malformed(node, "operand")),
        };
        let operator = binary_operator(op).ok_or_else(|| malformed(node, "operator"))?;
        expr = Expression::Binary(operator, Box::new(expr), Box::new(right), op.error_info());
    }
    Ok(expr)
}

fn binary_operator(token: &Token) -> Option<BinaryOperator> {
    match token.get_type() {
        TokenType::Plus => Some(BinaryOperator::Plus),
        TokenType::Minus => Some(BinaryOperator::Minus),
        TokenType::Star => Some(BinaryOperator::Mult),
        TokenType::Slash => Some(BinaryOperator::Div),
        TokenType::EqualEqual => Some(BinaryOperator::EqualEqual),
        TokenType::BangEqual => Some(BinaryOperator::BangEqual),
        TokenType::Less => Some(BinaryOperator::Less),
        TokenType::LessEqual => Some(BinaryOperator::LessEqual),
        TokenType::Greater => Some(BinaryOperator::Greater),
        TokenType::GreaterEqual => Some(BinaryOperator::GreaterEqual),
        TokenType::AndAnd => Some(BinaryOperator::And),
        TokenType::OrOr => Some(BinaryOperator::Or),
        _ => None,
    }
}

fn unary(node: &CstNode) -> LowerResult<Expression> {
    let operand = expression(first_child(node)?)?;
    match node.tokens().next() {
        Some(bang) if bang.get_type() == &TokenType::Bang =>
            Ok(Expression::Unary(UnaryOperator::Bang, Box::new(operand), bang.error_info())),
        Some(_) => Err(malformed(node, "NOT")),
        None => Ok(operand),
    }
}

fn primary(node: &CstNode) -> LowerResult<Expression> {
    if let Some(inner) = node.nodes().next() {
        return match inner.production {
            Production::Call => call(inner).map(Expression::Call),
            // Parentheses only group.
            Production::Expr => expression(inner),
            _ => Err(malformed(node, "call or expression")),
        };
    }
    let token = node.tokens().next().ok_or_else(|| malformed(node, "primary"))?;
    let info = token.error_info();
    Ok(match token.get_type() {
        TokenType::IntLiteral(i) => Expression::Literal(Literal::Int(*i), info),
        TokenType::StringLiteral(s) => Expression::Literal(Literal::String(s.clone()), info),
        TokenType::BoolLiteral(b) => Expression::Literal(Literal::Bool(*b), info),
        TokenType::DirectionLiteral(d) => Expression::Literal(Literal::Direction(*d), info),
        TokenType::World => Expression::Identifier(Identifier::World, info),
        TokenType::Agent => Expression::Identifier(Identifier::Agent, info),
        TokenType::Identifier(name) => Expression::Identifier(Identifier::named(name.as_str()), info),
        _ => return Err(malformed(node, "primary")),
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::cwl::common::lexer::Direction;
    use crate::cwl::tests::{unsafe_lower, unsafe_parse};

    use super::*;

    fn main_body(statements: &str) -> Vec<Statement> {
        let source = format!("program p begin func main() begin {} end end", statements);
        unsafe_lower(vec![source.as_str()]).main.body.statements
    }

    fn assigned(statement: &str) -> Expression {
        match main_body(statement).remove(0) {
            Statement::Assign { value, .. } => value,
            s => panic!("Expected an assignment, got {:?}", s),
        }
    }

    fn int(i: i64) -> Box<Expression> {
        Box::new(Expression::Literal(Literal::Int(i), ErrorInfo::new(1)))
    }

    fn ident(name: &str) -> Box<Expression> {
        Box::new(Expression::Identifier(Identifier::named(name), ErrorInfo::new(1)))
    }

    #[test]
    fn precedence() {
        let info = ErrorInfo::new(1);
        assert_eq!(
            assigned("x = 1 + 2 * 3;"),
            Expression::Binary(
                BinaryOperator::Plus,
                int(1),
                Box::new(Expression::Binary(BinaryOperator::Mult, int(2), int(3), info)),
                info,
            ),
        );
    }

    #[test]
    fn chains_fold_left() {
        let info = ErrorInfo::new(1);
        assert_eq!(
            assigned("x = 10 - 4 - 3;"),
            Expression::Binary(
                BinaryOperator::Minus,
                Box::new(Expression::Binary(BinaryOperator::Minus, int(10), int(4), info)),
                int(3),
                info,
            ),
        );
    }

    #[test]
    fn grouping_is_dropped() {
        let info = ErrorInfo::new(1);
        assert_eq!(
            assigned("x = (a || b) && !c;"),
            Expression::Binary(
                BinaryOperator::And,
                Box::new(Expression::Binary(BinaryOperator::Or, ident("a"), ident("b"), info)),
                Box::new(Expression::Unary(UnaryOperator::Bang, ident("c"), info)),
                info,
            ),
        );
    }

    #[test]
    fn world_agent_and_literals() {
        let body = main_body(r#"World = init_world(2, 3); agent = set_agent(world, 0, 1, W); s = "hi";"#);
        assert_eq!(
            body[0],
            Statement::Assign {
                target: Identifier::named("World"),
                value: Expression::Call(Call {
                    name: "init_world".to_owned(),
                    args: vec![*int(2), *int(3)],
                    error_info: ErrorInfo::new(1),
                }),
                error_info: ErrorInfo::new(1),
            },
        );
        match &body[1] {
            Statement::Assign { target: Identifier::Agent, value: Expression::Call(call), .. } => {
                assert_eq!(call.args[0], Expression::Identifier(Identifier::World, ErrorInfo::new(1)));
                assert_eq!(call.args[3], Expression::Literal(Literal::Direction(Direction::West), ErrorInfo::new(1)));
            }
            s => panic!("Expected an agent assignment, got {:?}", s),
        }
        match &body[2] {
            Statement::Assign { value, .. } =>
                assert_eq!(value, &Expression::Literal(Literal::String("hi".to_owned()), ErrorInfo::new(1))),
            s => panic!("Expected an assignment, got {:?}", s),
        }
    }

    #[test]
    fn declarations() {
        let program = unsafe_lower(vec![
            "program cleaner begin",
            "var a, b;",
            "func twice(n: int, loud: bool): int begin return n * 2; end",
            "func noop() begin return; end",
            "func main() begin end",
            "end",
        ]);
        assert_eq!(program.name, "cleaner");
        assert_eq!(program.declarations.len(), 3);
        match &program.declarations[0] {
            Declaration::Var(decl) => assert_eq!(
                decl.vars.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
                vec!["a", "b"],
            ),
            d => panic!("Expected a var declaration, got {:?}", d),
        }
        match &program.declarations[1] {
            Declaration::Func(f) => {
                assert_eq!(f.name, "twice");
                assert_eq!(f.return_type, Type::Int);
                assert_eq!(
                    f.params.iter().map(|p| (p.name.as_str(), p.ty)).collect::<Vec<_>>(),
                    vec![("n", Type::Int), ("loud", Type::Bool)],
                );
                assert_eq!(f.error_info.line, 3);
            }
            d => panic!("Expected a function, got {:?}", d),
        }
        match &program.declarations[2] {
            Declaration::Func(f) => {
                assert_eq!(f.return_type, Type::Void);
                assert_eq!(f.body.statements, vec![Statement::Return(None, ErrorInfo::new(4))]);
            }
            d => panic!("Expected a function, got {:?}", d),
        }
        assert_eq!(program.main.return_type, Type::Void);
    }

    #[test]
    fn if_else_and_while() {
        let body = main_body("if a then break; else x = 1; end while b do print(x, 2); end");
        match &body[0] {
            Statement::If { then_block, else_block: Some(else_block), .. } => {
                assert_eq!(then_block.statements, vec![Statement::Break(ErrorInfo::new(1))]);
                assert_eq!(else_block.statements.len(), 1);
            }
            s => panic!("Expected if/else, got {:?}", s),
        }
        match &body[1] {
            Statement::While { body, .. } => match &body.statements[0] {
                Statement::Print { args, .. } => assert_eq!(args.len(), 2),
                s => panic!("Expected print, got {:?}", s),
            },
            s => panic!("Expected while, got {:?}", s),
        }
    }

    #[test]
    fn lowering_leaves_the_parse_tree_untouched() {
        let cst = unsafe_parse(vec!["program p begin func main() begin x = 1 + 2; end end"]);
        let before = cst.clone();
        lower(&cst).unwrap();
        assert_eq!(cst, before);
    }

    #[test]
    fn malformed_tree() {
        let error = lower(&CstNode::new(Production::Program)).unwrap_err();
        assert_eq!(error.found, "malformed program");
        let error = lower(&CstNode::new(Production::Expr)).unwrap_err();
        assert_eq!(error.expected, "program");
    }

    #[test]
    fn serialized_ast() {
        let program = unsafe_lower(vec![
            "program demo begin var n;",
            "func main() begin n = 5 + 3; if !(n == 8) then print(\"no\"); end end",
            "end",
        ]);
        assert_eq!(
            program.serialize(),
            vec![
                "Program(Name='demo')",
                "  Declarations:",
                "    VarDecl([n])",
                "  Main Function:",
                "    FuncDecl(Name='main', Params=[], ReturnType='void')",
                "      Body (StmtList):",
                "        StmtList (",
                "          Assign(Target='n')",
                "            Binary(Op='+')",
                "              Literal(Value='5', Type='int')",
                "              Literal(Value='3', Type='int')",
                "          If",
                "            Unary(Op='!')",
                "              Binary(Op='==')",
                "                Identifier(Name='n')",
                "                Literal(Value='8', Type='int')",
                "            Then:",
                "              StmtList (",
                "                Print",
                "                  Literal(Value='no', Type='string')",
                "              )",
                "        )",
                "",
            ].join("\n"),
        );
    }
}
