use std::mem;

use crate::cwl::common::error::SyntaxError;
use crate::cwl::common::lexer::{Token, TokenType};
use crate::cwl::common::utils::normalize;
use crate::cwl::cst::{CstNode, Production};

/// Deepest allowed nesting of blocks and expressions. Every operand of an operator chain counts as
/// one level, since lowering folds chains into nested binary nodes.
pub const MAX_NESTING: usize = 128;

#[tracing::instrument(level = "debug", skip_all)]
pub fn parse(tokens: &[Token]) -> ParseResult<CstNode> {
    let cst = Parser { tokens, current: 0, depth: 0 }.program()?;
    tracing::debug!(
        items = cst.find_node(Production::TopItems).map(|n| n.children.len()).unwrap_or(0),
        "parsed program",
    );
    Ok(cst)
}

pub type ParseResult<A> = Result<A, SyntaxError>;

struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn program(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Program);
        node.push_token(self.consume(TokenType::Program)?);
        node.push_token(self.consume_identifier()?);
        node.push_token(self.consume(TokenType::Begin)?);
        node.push_node(self.top_items()?);
        node.push_node(self.main_decl()?);
        node.push_token(self.consume(TokenType::End)?);
        if let Some(extra) = self.tokens.get(self.current) {
            return Err(SyntaxError::new("end of input", extra.to_string(), extra.line));
        }
        Ok(node)
    }

    fn top_items(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::TopItems);
        loop {
            match self.peek_type() {
                Some(TokenType::Var) => node.push_node(self.var_decl()?),
                Some(TokenType::Func) if !self.starts_main() => node.push_node(self.func_decl()?),
                _ => return Ok(node),
            }
        }
    }

    // `func` followed by an identifier spelling `main` in any case.
    fn starts_main(&self) -> bool {
        matches!(self.peek_n_type(1), Some(TokenType::Identifier(name)) if normalize(name) == "main")
    }

    fn main_decl(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::MainDecl);
        node.push_token(self.consume(TokenType::Func)?);
        if !self.starts_main_name() {
            return self.error("main");
        }
        node.push_token(self.advance());
        node.push_token(self.consume(TokenType::OpenParen)?);
        node.push_token(self.consume(TokenType::CloseParen)?);
        node.push_token(self.consume(TokenType::Begin)?);
        node.push_node(self.stmt_list()?);
        node.push_token(self.consume(TokenType::End)?);
        Ok(node)
    }

    fn starts_main_name(&self) -> bool {
        matches!(self.peek_type(), Some(TokenType::Identifier(name)) if normalize(name) == "main")
    }

    fn var_decl(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::VarDecl);
        node.push_token(self.consume(TokenType::Var)?);
        let mut ids = CstNode::new(Production::IdList);
        ids.push_token(self.consume_identifier()?);
        while let Some(comma) = self.matches(TokenType::Comma) {
            ids.push_token(comma);
            ids.push_token(self.consume_identifier()?);
        }
        node.push_node(ids);
        node.push_token(self.consume(TokenType::Semicolon)?);
        Ok(node)
    }

    fn func_decl(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::FuncDecl);
        node.push_token(self.consume(TokenType::Func)?);
        node.push_token(self.consume_identifier()?);
        node.push_token(self.consume(TokenType::OpenParen)?);
        if !self.peek_is(TokenType::CloseParen) {
            node.push_node(self.params()?);
        }
        node.push_token(self.consume(TokenType::CloseParen)?);
        if let Some(colon) = self.matches(TokenType::Colon) {
            node.push_token(colon);
            node.push_token(self.consume_type()?);
        }
        node.push_token(self.consume(TokenType::Begin)?);
        node.push_node(self.stmt_list()?);
        node.push_token(self.consume(TokenType::End)?);
        Ok(node)
    }

    fn params(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Params);
        node.push_node(self.param()?);
        while let Some(comma) = self.matches(TokenType::Comma) {
            node.push_token(comma);
            node.push_node(self.param()?);
        }
        Ok(node)
    }

    fn param(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Param);
        node.push_token(self.consume_identifier()?);
        node.push_token(self.consume(TokenType::Colon)?);
        node.push_token(self.consume_type()?);
        Ok(node)
    }

    fn stmt_list(&mut self) -> ParseResult<CstNode> {
        self.nested(|p| {
            let mut node = CstNode::new(Production::StmtList);
            while p.starts_statement() {
                node.push_node(p.stmt()?);
            }
            Ok(node)
        })
    }

    fn starts_statement(&self) -> bool {
        matches!(
            self.peek_type(),
            Some(TokenType::Identifier(_) | TokenType::World | TokenType::Agent | TokenType::Print
                 | TokenType::If | TokenType::While | TokenType::Break | TokenType::Return)
        )
    }

    fn stmt(&mut self) -> ParseResult<CstNode> {
        let inner = match self.peek_type() {
            Some(TokenType::Identifier(_)) => match self.peek_n_type(1) {
                Some(TokenType::Equal) => self.assign()?,
                Some(TokenType::OpenParen) => self.call_stmt()?,
                _ => {
                    self.advance();
                    return self.error("ASSIGN or LPAREN");
                }
            },
            Some(TokenType::World | TokenType::Agent) => self.assign()?,
            Some(TokenType::Print) => self.print_stmt()?,
            Some(TokenType::If) => self.if_stmt()?,
            Some(TokenType::While) => self.while_stmt()?,
            Some(TokenType::Break) => self.break_stmt()?,
            Some(TokenType::Return) => self.return_stmt()?,
            _ => return self.error("statement"),
        };
        let mut node = CstNode::new(Production::Stmt);
        node.push_node(inner);
        Ok(node)
    }

    fn assign(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Assign);
        node.push_token(self.advance());
        node.push_token(self.consume(TokenType::Equal)?);
        node.push_node(self.expr()?);
        node.push_token(self.consume(TokenType::Semicolon)?);
        Ok(node)
    }

    fn call_stmt(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::CallStmt);
        node.push_node(self.call()?);
        node.push_token(self.consume(TokenType::Semicolon)?);
        Ok(node)
    }

    fn print_stmt(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::PrintStmt);
        node.push_token(self.consume(TokenType::Print)?);
        node.push_token(self.consume(TokenType::OpenParen)?);
        if !self.peek_is(TokenType::CloseParen) {
            node.push_node(self.args()?);
        }
        node.push_token(self.consume(TokenType::CloseParen)?);
        node.push_token(self.consume(TokenType::Semicolon)?);
        Ok(node)
    }

    fn if_stmt(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::IfStmt);
        node.push_token(self.consume(TokenType::If)?);
        node.push_node(self.expr()?);
        node.push_token(self.consume(TokenType::Then)?);
        node.push_node(self.stmt_list()?);
        if let Some(else_token) = self.matches(TokenType::Else) {
            node.push_token(else_token);
            node.push_node(self.stmt_list()?);
        }
        node.push_token(self.consume(TokenType::End)?);
        Ok(node)
    }

    fn while_stmt(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::WhileStmt);
        node.push_token(self.consume(TokenType::While)?);
        node.push_node(self.expr()?);
        node.push_token(self.consume(TokenType::Do)?);
        node.push_node(self.stmt_list()?);
        node.push_token(self.consume(TokenType::End)?);
        Ok(node)
    }

    fn break_stmt(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::BreakStmt);
        node.push_token(self.consume(TokenType::Break)?);
        node.push_token(self.consume(TokenType::Semicolon)?);
        Ok(node)
    }

    fn return_stmt(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::ReturnStmt);
        node.push_token(self.consume(TokenType::Return)?);
        if !self.peek_is(TokenType::Semicolon) {
            node.push_node(self.expr()?);
        }
        node.push_token(self.consume(TokenType::Semicolon)?);
        Ok(node)
    }

    fn call(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Call);
        node.push_token(self.consume_identifier()?);
        node.push_token(self.consume(TokenType::OpenParen)?);
        if !self.peek_is(TokenType::CloseParen) {
            node.push_node(self.args()?);
        }
        node.push_token(self.consume(TokenType::CloseParen)?);
        Ok(node)
    }

    fn args(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Args);
        node.push_node(self.expr()?);
        while let Some(comma) = self.matches(TokenType::Comma) {
            node.push_token(comma);
            node.push_node(self.expr()?);
        }
        Ok(node)
    }

    fn expr(&mut self) -> ParseResult<CstNode> {
        self.nested(|p| {
            let mut node = CstNode::new(Production::Expr);
            node.push_node(p.or_expr()?);
            Ok(node)
        })
    }

    fn or_expr(&mut self) -> ParseResult<CstNode> {
        self.chain(
            Production::OrExpr,
            |t| matches!(t, TokenType::OrOr),
            |p| p.and_expr(),
        )
    }

    fn and_expr(&mut self) -> ParseResult<CstNode> {
        self.chain(
            Production::AndExpr,
            |t| matches!(t, TokenType::AndAnd),
            |p| p.rel_expr(),
        )
    }

    // Relational operators do not chain: `a < b < c` stops after `a < b`.
    fn rel_expr(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::RelExpr);
        node.push_node(self.add_expr()?);
        if let Some(op) = self.matches_where(|t| matches!(
            t,
            TokenType::EqualEqual | TokenType::BangEqual | TokenType::Less | TokenType::LessEqual
            | TokenType::Greater | TokenType::GreaterEqual
        )) {
            node.push_token(op);
            node.push_node(self.add_expr()?);
        }
        Ok(node)
    }

    fn add_expr(&mut self) -> ParseResult<CstNode> {
        self.chain(
            Production::AddExpr,
            |t| matches!(t, TokenType::Plus | TokenType::Minus),
            |p| p.mul_expr(),
        )
    }

    fn mul_expr(&mut self) -> ParseResult<CstNode> {
        self.chain(
            Production::MulExpr,
            |t| matches!(t, TokenType::Star | TokenType::Slash),
            |p| p.unary(),
        )
    }

    fn unary(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Unary);
        match self.matches(TokenType::Bang) {
            Some(bang) => {
                node.push_token(bang);
                node.push_node(self.nested(|p| p.unary())?);
            }
            None => node.push_node(self.primary()?),
        }
        Ok(node)
    }

    fn primary(&mut self) -> ParseResult<CstNode> {
        let mut node = CstNode::new(Production::Primary);
        match self.peek_type() {
            Some(TokenType::IntLiteral(_) | TokenType::StringLiteral(_) | TokenType::BoolLiteral(_)
                 | TokenType::DirectionLiteral(_) | TokenType::World | TokenType::Agent) =>
                node.push_token(self.advance()),
            Some(TokenType::Identifier(_)) =>
                if self.peek_n_type(1) == Some(&TokenType::OpenParen) {
                    node.push_node(self.call()?)
                } else {
                    node.push_token(self.advance())
                },
            Some(TokenType::OpenParen) => {
                node.push_token(self.advance());
                node.push_node(self.expr()?);
                node.push_token(self.consume(TokenType::CloseParen)?);
            }
            _ => return self.error("expression"),
        }
        Ok(node)
    }

    // Left-associative operator chain. Each extra operand counts one nesting level until the chain
    // ends.
    fn chain<F, Next>(&mut self, production: Production, is_op: F, next: Next) -> ParseResult<CstNode>
        where F: Fn(&TokenType) -> bool,
              Next: Fn(&mut Parser<'a>) -> ParseResult<CstNode> {
        let mut node = CstNode::new(production);
        node.push_node(next(self)?);
        let outer = self.depth;
        let result = loop {
            match self.matches_where(&is_op) {
                Some(op) => {
                    node.push_token(op);
                    if self.enter().is_err() {
                        break self.error(format!(
                            "a shorter operator chain (at most {} operands and nesting levels)",
                            MAX_NESTING,
                        ));
                    }
                    match next(self) {
                        Ok(operand) => node.push_node(operand),
                        Err(e) => break Err(e),
                    }
                }
                None => break Ok(node),
            }
        };
        self.depth = outer;
        result
    }

    fn nested<A, F: FnOnce(&mut Self) -> ParseResult<A>>(&mut self, f: F) -> ParseResult<A> {
        self.enter()?;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn enter(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(SyntaxError::new(
                format!("at most {} levels of nesting", MAX_NESTING),
                self.found(),
                self.line(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn matches(&mut self, expected: TokenType) -> Option<Token> {
        self.matches_where(|t| mem::discriminant(t) == mem::discriminant(&expected))
    }

    fn matches_where<F: Fn(&TokenType) -> bool>(&mut self, f: F) -> Option<Token> {
        match self.peek_type() {
            Some(t) if f(t) => Some(self.advance()),
            _ => None,
        }
    }

    // Compares variants only, so `consume(TokenType::identifier(""))` accepts any identifier.
    fn consume(&mut self, expected: TokenType) -> ParseResult<Token> {
        match self.matches(expected.clone()) {
            Some(token) => Ok(token),
            None => self.error(expected.name()),
        }
    }

    fn consume_identifier(&mut self) -> ParseResult<Token> {
        self.consume(TokenType::identifier(""))
    }

    fn consume_type(&mut self) -> ParseResult<Token> {
        match self.matches_where(|t| matches!(t, TokenType::IntType | TokenType::BoolType | TokenType::StringType)) {
            Some(token) => Ok(token),
            None => self.error("TYPE"),
        }
    }

    fn peek_is(&self, expected: TokenType) -> bool {
        self.peek_type().map(|t| mem::discriminant(t) == mem::discriminant(&expected)).unwrap_or(false)
    }

    fn peek_type(&self) -> Option<&'a TokenType> {
        self.peek_n_type(0)
    }

    fn peek_n_type(&self, n: usize) -> Option<&'a TokenType> {
        self.tokens.get(self.current + n).map(|t| t.get_type())
    }

    // Callers check `peek_type` first; past the end this only repeats the last token.
    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.current).or_else(|| self.tokens.last()).cloned();
        self.current += 1;
        token.unwrap_or_else(|| Token::new(1, TokenType::End, ""))
    }

    fn found(&self) -> String {
        self.tokens
            .get(self.current)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "end of input".to_owned())
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.current)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error<A, S: Into<String>>(&self, expected: S) -> ParseResult<A> {
        Err(SyntaxError::new(expected, self.found(), self.line()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::cwl::common::tests::unsafe_tokenize;
    use crate::cwl::tests::unsafe_parse;

    use super::*;

    fn parse_error(program: Vec<&str>) -> SyntaxError {
        parse(&unsafe_tokenize(program)).unwrap_err()
    }

    fn productions(node: &CstNode) -> Vec<Production> {
        node.nodes().map(|n| n.production).collect()
    }

    #[test]
    fn minimal_program() {
        let cst = unsafe_parse(vec!["program p begin func main() begin end end"]);
        assert_eq!(cst.production, Production::Program);
        assert_eq!(productions(&cst), vec![Production::TopItems, Production::MainDecl]);
        assert_eq!(cst.tokens().count(), 4);
    }

    #[test]
    fn top_items_in_order() {
        let cst = unsafe_parse(vec![
            "program p begin",
            "  var a, b;",
            "  func f(x: int, y: bool): int begin return x; end",
            "  var c;",
            "  func Main() begin f(1, true); end",
            "end",
        ]);
        let items = cst.find_node(Production::TopItems).unwrap();
        assert_eq!(
            productions(items),
            vec![Production::VarDecl, Production::FuncDecl, Production::VarDecl],
        );
        let main = cst.find_node(Production::MainDecl).unwrap();
        assert_eq!(main.line(), 5);
    }

    #[test]
    fn parse_is_deterministic() {
        let tokens = unsafe_tokenize(vec![
            "program p begin func main() begin",
            "  x = (1 + 2) * 3 / 4 - 5;",
            "  if !b && c || d then print(x); else while x > 0 do x = x - 1; end end",
            "end end",
        ]);
        assert_eq!(parse(&tokens).unwrap(), parse(&tokens).unwrap());
    }

    #[test]
    fn chains_keep_all_operands_in_one_node() {
        let cst = unsafe_parse(vec!["program p begin func main() begin x = 1 + 2 - 3; end end"]);
        let serialized = cst.serialize();
        assert_eq!(serialized.matches("add_expr").count(), 1);
        assert_eq!(serialized.matches("mul_expr").count(), 3);
    }

    #[test]
    fn else_if_is_a_nested_if_with_its_own_end() {
        unsafe_parse(vec![
            "program p begin func main() begin",
            "  if a then x = 1; else if b then x = 2; else x = 3; end end",
            "end end",
        ]);
        let error = parse_error(vec![
            "program p begin func main() begin",
            "  if a then x = 1; else if b then x = 2; end",
            "end end",
        ]);
        assert_eq!(error.expected, "END");
    }

    #[test]
    fn empty_print_is_syntactically_valid() {
        let cst = unsafe_parse(vec!["program p begin func main() begin print(); end end"]);
        assert!(!cst.serialize().contains("args"));
    }

    #[test]
    fn world_and_agent_keywords_are_assignable() {
        let cst = unsafe_parse(vec![
            "program p begin func main() begin",
            "  world = init_world(3, 3);",
            "  agent = set_agent(world, 0, 0, N);",
            "end end",
        ]);
        assert_eq!(cst.serialize().matches("assign_stmt").count(), 2);
    }

    #[test]
    fn missing_semicolon() {
        let error = parse_error(vec!["program p begin func main() begin", "x = 1", "end end"]);
        assert_eq!(error, SyntaxError::new("SEMI", "[END] 'end'", 3));
    }

    #[test]
    fn identifier_statement_needs_assign_or_call() {
        let error = parse_error(vec!["program p begin func main() begin x; end end"]);
        assert_eq!(error.expected, "ASSIGN or LPAREN");
    }

    #[test]
    fn tokens_after_final_end() {
        let error = parse_error(vec!["program p begin func main() begin end end", "print(1);"]);
        assert_eq!(error, SyntaxError::new("end of input", "[PRINT] 'print'", 2));
    }

    #[test]
    fn missing_main() {
        let error = parse_error(vec!["program p begin var x; end"]);
        assert_eq!(error.expected, "FUNC");
    }

    #[test]
    fn unexpected_end_of_input() {
        let error = parse_error(vec!["program p begin func main() begin x = (1 +"]);
        assert_eq!(error, SyntaxError::new("expression", "end of input", 1));
    }

    #[test]
    fn nesting_limit() {
        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        unsafe_parse(vec!["program p begin func main() begin x = ", shallow.as_str(), "; end end"]);

        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let error = parse_error(vec!["program p begin func main() begin x = ", deep.as_str(), "; end end"]);
        assert!(error.expected.contains("nesting"));
    }

    #[test]
    fn long_chains_count_towards_nesting() {
        let long = vec!["1"; 300].join(" + ");
        let error = parse_error(vec!["program p begin func main() begin x = ", long.as_str(), "; end end"]);
        assert!(error.expected.starts_with("a shorter operator chain"));
        assert_eq!(error.found, "[INT] '1'");

        let fits = vec!["1"; 100].join(" + ");
        unsafe_parse(vec!["program p begin func main() begin x = ", fits.as_str(), "; end end"]);
    }
}
