use std::fmt::{Debug, Display};

use nonempty::NonEmpty;

/// The pipeline phase an error belongs to. Used to prefix every diagnostic.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Lexical,
    Syntax,
    Semantic,
    Runtime,
}

impl Phase {
    pub fn banner(&self) -> &'static str {
        match self {
            Phase::Lexical => "LEXICAL ERROR",
            Phase::Syntax => "SYNTAX ERROR",
            Phase::Semantic => "SEMANTIC ERROR",
            Phase::Runtime => "RUNTIME ERROR",
        }
    }
}

pub trait CwlError: Debug + Display {
    fn get_info(&self) -> ErrorInfo;
    fn phase(&self) -> Phase;
    fn get_message(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ErrorInfo {
    pub line: usize,
}

impl ErrorInfo {
    pub fn new(line: usize) -> Self { ErrorInfo { line } }
}

pub type CwlResult<A> = Result<A, NonEmpty<Box<dyn CwlError>>>;

pub fn convert_errors<A, E: CwlError + 'static>(result: Result<A, NonEmpty<E>>) -> CwlResult<A> {
    result.map_err(|e| e.map::<Box<dyn CwlError>, _>(|a| Box::new(a)))
}

pub fn convert_error<A, E: CwlError + 'static>(result: Result<A, E>) -> CwlResult<A> {
    convert_errors(result.map_err(NonEmpty::new))
}

/// Formats a single diagnostic as `[PHASE ERROR] line N: message`.
pub fn report(error: &dyn CwlError) -> String {
    format!("[{}] line {}: {}", error.phase().banner(), error.get_info().line, error.get_message())
}

/// Raised by the parser and by CST lowering. Parsing is fail-fast, so there is never more than one.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("expected {expected}, but found {found}")]
pub struct SyntaxError {
    pub expected: String,
    pub found: String,
    pub line: usize,
}

impl SyntaxError {
    pub fn new<S: Into<String>, F: Into<String>>(expected: S, found: F, line: usize) -> Self {
        SyntaxError { expected: expected.into(), found: found.into(), line }
    }
}

impl CwlError for SyntaxError {
    fn get_info(&self) -> ErrorInfo {
        ErrorInfo { line: self.line }
    }

    fn phase(&self) -> Phase { Phase::Syntax }
}
