use crate::cwl::analyze::{analyze, ValidatedProgram};
use crate::cwl::common::error::CwlError;
#[cfg(test)]
use crate::cwl::common::error::{convert_error, convert_errors, CwlResult};
use crate::cwl::common::lexer::tokenize;
use crate::cwl::cst::CstNode;
use crate::cwl::interpreter::result::RuntimeError;
use crate::cwl::interpreter::{execute, InterpreterConfig};
use crate::cwl::lower::lower;
use crate::cwl::parser::parse;

/// Everything the front end produced for one source text. `ast` is only present when no
/// diagnostics were raised; `ast_text` is the serialized AST as soon as lowering succeeded.
#[derive(Debug)]
pub struct Compilation {
    pub cst: Option<CstNode>,
    pub ast: Option<ValidatedProgram>,
    pub ast_text: Option<String>,
    pub diagnostics: Vec<Box<dyn CwlError>>,
}

impl Compilation {
    fn failed(cst: Option<CstNode>, ast_text: Option<String>, diagnostics: Vec<Box<dyn CwlError>>) -> Self {
        Compilation { cst, ast: None, ast_text, diagnostics }
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn compile(source: &str) -> Compilation {
    let tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(e) => return Compilation::failed(None, None, vec![Box::new(e)]),
    };
    let cst = match parse(&tokens) {
        Ok(cst) => cst,
        Err(e) => return Compilation::failed(None, None, vec![Box::new(e)]),
    };
    let program = match lower(&cst) {
        Ok(program) => program,
        Err(e) => return Compilation::failed(Some(cst), None, vec![Box::new(e)]),
    };
    let unchecked_text = program.serialize();
    match analyze(program) {
        Ok(validated) => {
            let ast_text = Some(validated.program().serialize());
            Compilation { cst: Some(cst), ast: Some(validated), ast_text, diagnostics: Vec::new() }
        }
        Err(errors) => {
            tracing::debug!(count = errors.len(), "semantic errors");
            let diagnostics = errors.into_iter().map(|e| Box::new(e) as Box<dyn CwlError>).collect();
            Compilation::failed(Some(cst), Some(unchecked_text), diagnostics)
        }
    }
}

/// Executes a validated program with the default limits, printing to stdout.
pub fn run(program: &ValidatedProgram) -> Result<(), RuntimeError> {
    execute(program, InterpreterConfig::default(), &mut std::io::stdout().lock())
}

/// Compiles and runs `source` in one go, collecting whichever phase failed first.
#[cfg(test)]
pub fn interpret_source<W: std::io::Write>(source: &str, writer: &mut W) -> CwlResult<()> {
    let tokens = convert_error(tokenize(source))?;
    let cst = convert_error(parse(&tokens))?;
    let program = convert_error(lower(&cst))?;
    let validated = convert_errors(analyze(program))?;
    convert_error(execute(&validated, InterpreterConfig::default(), writer))
}
