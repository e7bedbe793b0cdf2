use std::fmt;
use std::fmt::{Display, Formatter};

use crate::cwl::common::error::{CwlError, ErrorInfo, Phase};

#[tracing::instrument(level = "debug", skip_all)]
pub fn tokenize(source: &str) -> LexResult<Vec<Token>> {
    let tokens = Lexer::new(source).get_lexems()?;
    tracing::debug!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

// Lexing stops at the first unrecognized input, so at most one error is ever reported.
pub type LexResult<A> = Result<A, LexicalError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn letter(&self) -> char {
        match self {
            Direction::North => 'N',
            Direction::East => 'E',
            Direction::South => 'S',
            Direction::West => 'W',
        }
    }

    pub fn turn_right(&self) -> Direction {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }

    /// Column and row offsets of one step. Rows grow southwards.
    pub fn delta(&self) -> (i64, i64) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    // Punctuation.
    OpenParen,
    CloseParen,
    Comma,
    Semicolon,
    Colon,
    // Operators.
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    AndAnd,
    OrOr,
    // Keywords.
    Program,
    Begin,
    End,
    Var,
    Func,
    Return,
    If,
    Then,
    Else,
    While,
    Do,
    Print,
    Break,
    World,
    Agent,
    IntType,
    BoolType,
    StringType,

    BoolLiteral(bool),
    DirectionLiteral(Direction),
    IntLiteral(i64),
    StringLiteral(String),
    Identifier(String),
}

impl TokenType {
    pub fn identifier<S: Into<String>>(str: S) -> Self { TokenType::Identifier(str.into()) }
    #[cfg(test)]
    pub fn string_literal<S: Into<String>>(str: S) -> Self { TokenType::StringLiteral(str.into()) }

    /// The terminal name used in grammar positions and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TokenType::OpenParen => "LPAREN",
            TokenType::CloseParen => "RPAREN",
            TokenType::Comma => "COMMA",
            TokenType::Semicolon => "SEMI",
            TokenType::Colon => "COLON",
            TokenType::Plus => "PLUS",
            TokenType::Minus => "MINUS",
            TokenType::Star => "STAR",
            TokenType::Slash => "SLASH",
            TokenType::Bang => "NOT",
            TokenType::BangEqual => "NEQ",
            TokenType::Equal => "ASSIGN",
            TokenType::EqualEqual => "EQ",
            TokenType::Less => "LT",
            TokenType::LessEqual => "LE",
            TokenType::Greater => "GT",
            TokenType::GreaterEqual => "GE",
            TokenType::AndAnd => "AND",
            TokenType::OrOr => "OR",
            TokenType::Program => "PROGRAM",
            TokenType::Begin => "BEGIN",
            TokenType::End => "END",
            TokenType::Var => "VAR",
            TokenType::Func => "FUNC",
            TokenType::Return => "RETURN",
            TokenType::If => "IF",
            TokenType::Then => "THEN",
            TokenType::Else => "ELSE",
            TokenType::While => "WHILE",
            TokenType::Do => "DO",
            TokenType::Print => "PRINT",
            TokenType::Break => "BREAK",
            TokenType::World => "WORLD",
            TokenType::Agent => "AGENT",
            TokenType::IntType | TokenType::BoolType | TokenType::StringType => "TYPE",
            TokenType::BoolLiteral(_) => "BOOL",
            TokenType::DirectionLiteral(_) => "DIR",
            TokenType::IntLiteral(_) => "INT",
            TokenType::StringLiteral(_) => "STR",
            TokenType::Identifier(_) => "ID",
        }
    }
}

impl Display for TokenType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub line: usize,
    pub r#type: TokenType,
    pub lexeme: String,
}

impl Token {
    pub fn new<S: Into<String>>(line: usize, r#type: TokenType, lexeme: S) -> Self {
        Token { line, r#type, lexeme: lexeme.into() }
    }
    pub fn get_type(&self) -> &TokenType { &self.r#type }

    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo { line: self.line }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] '{}'", self.r#type, self.lexeme)
    }
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum LexicalError {
    #[error("unrecognized character '{character}'")]
    UnexpectedCharacter { line: usize, character: char },
    #[error("unterminated string literal")]
    UnterminatedString { line: usize },
    #[error("unterminated block comment")]
    UnterminatedComment { line: usize },
    #[error("unknown escape sequence '\\{escape}' in string literal")]
    UnknownEscape { line: usize, escape: char },
    #[error("integer literal {literal} does not fit in 64 bits")]
    IntegerOverflow { line: usize, literal: String },
}

impl CwlError for LexicalError {
    fn get_info(&self) -> ErrorInfo {
        let line = match self {
            LexicalError::UnexpectedCharacter { line, .. } => line,
            LexicalError::UnterminatedString { line } => line,
            LexicalError::UnterminatedComment { line } => line,
            LexicalError::UnknownEscape { line, .. } => line,
            LexicalError::IntegerOverflow { line, .. } => line,
        };
        ErrorInfo { line: *line }
    }

    fn phase(&self) -> Phase { Phase::Lexical }
}

struct Lexer {
    source: Vec<char>,
    current: usize,
    start: usize,
    line: usize,
    lexems: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            current: 0,
            start: 0,
            line: 1,
            lexems: Vec::new(),
        }
    }

    pub fn get_lexems(mut self) -> LexResult<Vec<Token>> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()?;
        }
        Ok(self.lexems)
    }

    fn is_at_end(&self) -> bool { self.current >= self.source.len() }

    fn add_token_type(&mut self, tt: TokenType) {
        let lexeme = self.current_lexeme();
        tracing::trace!(line = self.line, kind = tt.name(), %lexeme, "token");
        self.lexems.push(Token::new(self.line, tt, lexeme));
    }

    fn matches(&mut self, expected: char) -> bool {
        let result = self.peek_test(expected);
        if result {
            self.current += 1;
        }
        result
    }

    fn scan_token(&mut self) -> LexResult<()> {
        let c = self.advance();
        match c {
            '(' => self.add_token_type(TokenType::OpenParen),
            ')' => self.add_token_type(TokenType::CloseParen),
            ',' => self.add_token_type(TokenType::Comma),
            ';' => self.add_token_type(TokenType::Semicolon),
            ':' => self.add_token_type(TokenType::Colon),
            '+' => self.add_token_type(TokenType::Plus),
            '-' => self.add_token_type(TokenType::Minus),
            '*' => self.add_token_type(TokenType::Star),

            '!' => self.add_either('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.add_either('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.add_either('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.add_either('=', TokenType::GreaterEqual, TokenType::Greater),
            '&' =>
                if self.matches('&') {
                    self.add_token_type(TokenType::AndAnd)
                } else {
                    return self.unexpected(c);
                },
            '|' =>
                if self.matches('|') {
                    self.add_token_type(TokenType::OrOr)
                } else {
                    return self.unexpected(c);
                },

            '/' =>
                if self.matches('/') {
                    self.skip_line_comment();
                } else if self.matches('*') {
                    self.skip_multiline_comment()?;
                } else {
                    self.add_token_type(TokenType::Slash)
                },

            ' ' | '\r' | '\t' => (),
            '\n' => self.line += 1,
            '"' => {
                let literal = self.read_string_literal()?;
                self.add_token_type(literal)
            }
            c if c.is_ascii_digit() => {
                let num = self.read_number_literal()?;
                self.add_token_type(num)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self.read_identifier();
                self.add_token_type(ident)
            }
            c => return self.unexpected(c),
        }
        Ok(())
    }

    fn add_either(&mut self, next: char, long: TokenType, short: TokenType) {
        let m = self.matches(next);
        self.add_token_type(if m { long } else { short })
    }

    fn unexpected<A>(&self, character: char) -> LexResult<A> {
        Err(LexicalError::UnexpectedCharacter { line: self.line, character })
    }

    fn advance(&mut self) -> char {
        let result = self.source[self.current];
        self.current += 1;
        result
    }

    fn skip_line_comment(&mut self) {
        while self.peek_test(negated_char_test('\n')) {
            self.advance();
        }
    }

    fn skip_multiline_comment(&mut self) -> LexResult<()> {
        let opened_at = self.line;
        while !self.is_at_end() {
            if self.peek_test('*') && self.peek_n_test(1, '/') {
                self.current += 2; // Skip past closing comment
                return Ok(());
            }
            if self.advance() == '\n' {
                self.line += 1;
            }
        }
        Err(LexicalError::UnterminatedComment { line: opened_at })
    }

    fn peek_test<F: CharTest>(&self, f: F) -> bool {
        self.peek_n_test(0, f)
    }
    fn peek_n_test<F: CharTest>(&self, n: usize, f: F) -> bool {
        self.source.get(self.current + n).map(|e| f.char_test(*e)).unwrap_or(false)
    }

    fn read_number_literal(&mut self) -> LexResult<TokenType> {
        while self.peek_test(|e: char| e.is_ascii_digit()) {
            self.advance();
        }
        let literal = self.current_lexeme();
        literal
            .parse::<i64>()
            .map(TokenType::IntLiteral)
            .map_err(|_| LexicalError::IntegerOverflow { line: self.line, literal })
    }

    // Strings cannot span lines. Escapes are decoded here so later phases only see values.
    fn read_string_literal(&mut self) -> LexResult<TokenType> {
        let mut literal = String::new();
        loop {
            if self.is_at_end() || self.peek_test('\n') {
                return Err(LexicalError::UnterminatedString { line: self.line });
            }
            match self.advance() {
                '"' => return Ok(TokenType::StringLiteral(literal)),
                '\\' => {
                    if self.is_at_end() {
                        return Err(LexicalError::UnterminatedString { line: self.line });
                    }
                    let escape = self.advance();
                    literal.push(match escape {
                        'n' => '\n',
                        't' => '\t',
                        '"' => '"',
                        '\\' => '\\',
                        _ => return Err(LexicalError::UnknownEscape { line: self.line, escape }),
                    });
                }
                c => literal.push(c),
            }
        }
    }

    fn read_identifier(&mut self) -> TokenType {
        while self.peek_test(|e: char| e.is_ascii_alphanumeric() || e == '_') {
            self.advance();
        }
        let word = self.current_lexeme();
        Lexer::get_keyword(&word).unwrap_or(TokenType::Identifier(word))
    }

    fn current_lexeme(&self) -> String {
        self.source[self.start..self.current].iter().collect()
    }

    // Keywords and direction letters are case-sensitive; `World` is an ordinary identifier.
    fn get_keyword(word: &str) -> Option<TokenType> {
        match word {
            "program" => Some(TokenType::Program),
            "begin" => Some(TokenType::Begin),
            "end" => Some(TokenType::End),
            "var" => Some(TokenType::Var),
            "func" => Some(TokenType::Func),
            "return" => Some(TokenType::Return),
            "if" => Some(TokenType::If),
            "then" => Some(TokenType::Then),
            "else" => Some(TokenType::Else),
            "while" => Some(TokenType::While),
            "do" => Some(TokenType::Do),
            "print" => Some(TokenType::Print),
            "break" => Some(TokenType::Break),
            "world" => Some(TokenType::World),
            "agent" => Some(TokenType::Agent),
            "int" => Some(TokenType::IntType),
            "bool" => Some(TokenType::BoolType),
            "string" => Some(TokenType::StringType),
            "true" => Some(TokenType::BoolLiteral(true)),
            "false" => Some(TokenType::BoolLiteral(false)),
            "N" => Some(TokenType::DirectionLiteral(Direction::North)),
            "E" => Some(TokenType::DirectionLiteral(Direction::East)),
            "S" => Some(TokenType::DirectionLiteral(Direction::South)),
            "W" => Some(TokenType::DirectionLiteral(Direction::West)),
            _ => None,
        }
    }
}

trait CharTest {
    fn char_test(&self, c: char) -> bool;
}

fn negated_char_test(c: char) -> impl CharTest {
    move |c2: char| c2 != c
}

impl CharTest for char {
    fn char_test(&self, c: char) -> bool { self == &c }
}

impl<F> CharTest for F where F: Fn(char) -> bool {
    fn char_test(&self, c: char) -> bool { self(c) }
}
