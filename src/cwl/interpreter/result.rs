use crate::cwl::ast::{BinaryOperator, UnaryOperator};
use crate::cwl::common::error::{CwlError, ErrorInfo, Phase};
use crate::cwl::interpreter::value::Value;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero { error_info: ErrorInfo },
    #[error("while loop exceeded {limit} iterations")]
    IterationLimitExceeded { limit: usize, error_info: ErrorInfo },
    #[error("invalid operand: {message}")]
    InvalidOperand { message: String, error_info: ErrorInfo },
    #[error("'{name}' was used before it was created")]
    UninitializedSingletonAccess { name: &'static str, error_info: ErrorInfo },
    #[error("call depth exceeded {limit}")]
    RecursionLimitExceeded { limit: usize, error_info: ErrorInfo },
    #[error("integer overflow")]
    IntegerOverflow { error_info: ErrorInfo },
    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String, error_info: ErrorInfo },
    #[error("undefined function '{name}'")]
    UndefinedFunction { name: String, error_info: ErrorInfo },
    #[error("'break' outside of a loop")]
    MisplacedBreak { error_info: ErrorInfo },
    #[error("could not write output: {message}")]
    OutputFailed { message: String, error_info: ErrorInfo },
}

impl RuntimeError {
    pub fn invalid_operand<S: Into<String>>(message: S, error_info: ErrorInfo) -> Self {
        RuntimeError::InvalidOperand { message: message.into(), error_info }
    }
}

impl CwlError for RuntimeError {
    fn get_info(&self) -> ErrorInfo {
        match self {
            RuntimeError::DivisionByZero { error_info } => *error_info,
            RuntimeError::IterationLimitExceeded { error_info, .. } => *error_info,
            RuntimeError::InvalidOperand { error_info, .. } => *error_info,
            RuntimeError::UninitializedSingletonAccess { error_info, .. } => *error_info,
            RuntimeError::RecursionLimitExceeded { error_info, .. } => *error_info,
            RuntimeError::IntegerOverflow { error_info } => *error_info,
            RuntimeError::UndefinedVariable { error_info, .. } => *error_info,
            RuntimeError::UndefinedFunction { error_info, .. } => *error_info,
            RuntimeError::MisplacedBreak { error_info } => *error_info,
            RuntimeError::OutputFailed { error_info, .. } => *error_info,
        }
    }

    fn phase(&self) -> Phase { Phase::Runtime }
}

#[derive(Debug, PartialEq, Clone)]
pub enum InterpreterErrorOrControlFlow {
    Error(RuntimeError),

    // Not actual errors
    Broke(ErrorInfo),
    Returned(Value, ErrorInfo),
}

impl From<RuntimeError> for InterpreterErrorOrControlFlow {
    fn from(error: RuntimeError) -> Self {
        InterpreterErrorOrControlFlow::Error(error)
    }
}

pub type InterpretResult<A> = Result<A, InterpreterErrorOrControlFlow>;

pub fn unary_type_error<A>(op: UnaryOperator, v: &Value, error_info: ErrorInfo) -> Result<A, RuntimeError> {
    Err(RuntimeError::invalid_operand(
        format!("cannot apply '{}' to {}", op.symbol(), v.type_name()), error_info))
}

pub fn binary_type_error<A>(
    op: BinaryOperator, v1: &Value, v2: &Value, error_info: ErrorInfo,
) -> Result<A, RuntimeError> {
    Err(RuntimeError::invalid_operand(
        format!("cannot apply '{}' to {} and {}", op.symbol(), v1.type_name(), v2.type_name()),
        error_info,
    ))
}
