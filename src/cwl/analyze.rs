use std::collections::HashMap;
use std::mem;

use nonempty::NonEmpty;

use crate::cwl::ast::{
    BinaryOperator, Call, Declaration, Expression, FuncDecl, Identifier, Program, Statement,
    StmtList, Type, UnaryOperator,
};
use crate::cwl::builtins;
use crate::cwl::common::error::{CwlError, ErrorInfo, Phase};
use crate::cwl::common::utils::normalize;

/// A program that passed semantic analysis, with the type of every global attached to its
/// declaration. Only `analyze` constructs one.
#[derive(Debug, PartialEq, Clone)]
pub struct ValidatedProgram(Program);

impl ValidatedProgram {
    pub fn program(&self) -> &Program { &self.0 }
}

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum SemanticError {
    #[error("undeclared identifier '{name}'")]
    UndeclaredIdentifier { name: String, error_info: ErrorInfo },
    #[error("redeclaration of '{name}'")]
    Redeclaration { name: String, error_info: ErrorInfo },
    #[error("'{name}' expects {expected} argument(s), but got {actual}")]
    ArityMismatch { name: String, expected: usize, actual: usize, error_info: ErrorInfo },
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String, error_info: ErrorInfo },
    #[error("'{name}' is not a function")]
    NotCallable { name: String, error_info: ErrorInfo },
    #[error("cannot assign to function '{name}'")]
    InvalidAssignment { name: String, error_info: ErrorInfo },
    #[error("'{keyword}' outside of {context}")]
    MisplacedControlFlow { keyword: &'static str, context: &'static str, error_info: ErrorInfo },
}

impl CwlError for SemanticError {
    fn get_info(&self) -> ErrorInfo {
        match self {
            SemanticError::UndeclaredIdentifier { error_info, .. } => *error_info,
            SemanticError::Redeclaration { error_info, .. } => *error_info,
            SemanticError::ArityMismatch { error_info, .. } => *error_info,
            SemanticError::TypeMismatch { error_info, .. } => *error_info,
            SemanticError::NotCallable { error_info, .. } => *error_info,
            SemanticError::InvalidAssignment { error_info, .. } => *error_info,
            SemanticError::MisplacedControlFlow { error_info, .. } => *error_info,
        }
    }

    fn phase(&self) -> Phase { Phase::Semantic }
}

/// Checks the whole program and either returns it validated or every diagnostic found.
#[tracing::instrument(level = "debug", skip_all)]
pub fn analyze(program: Program) -> Result<ValidatedProgram, NonEmpty<SemanticError>> {
    let mut analyzer = Analyzer::new();
    analyzer.check_program(&program);
    match NonEmpty::from_vec(mem::take(&mut analyzer.errors)) {
        Some(errors) => {
            tracing::debug!(diagnostics = errors.len(), "semantic analysis failed");
            Err(errors)
        }
        None => Ok(ValidatedProgram(analyzer.annotate(program))),
    }
}

#[derive(Debug, PartialEq, Clone)]
enum SymbolKind {
    Variable,
    Parameter,
    Function { params: Vec<Type>, return_type: Type },
    Object,
}

#[derive(Debug, Clone)]
struct Symbol {
    kind: SymbolKind,
    // `None` for a global whose type is not fixed yet.
    ty: Option<Type>,
    depth: usize,
}

struct Analyzer {
    scopes: Vec<HashMap<String, Symbol>>,
    errors: Vec<SemanticError>,
    current_return: Option<Type>,
    loop_depth: usize,
}

impl Analyzer {
    fn new() -> Self {
        let mut globals = HashMap::new();
        globals.insert("world".to_owned(), Symbol { kind: SymbolKind::Object, ty: Some(Type::World), depth: 0 });
        globals.insert("agent".to_owned(), Symbol { kind: SymbolKind::Object, ty: Some(Type::Agent), depth: 0 });
        Analyzer { scopes: vec![globals], errors: Vec::new(), current_return: None, loop_depth: 0 }
    }

    fn check_program(&mut self, program: &Program) {
        for decl in &program.declarations {
            match decl {
                Declaration::Var(v) => {
                    for binding in &v.vars {
                        self.declare(&binding.name, SymbolKind::Variable, None, binding.error_info);
                    }
                }
                Declaration::Func(f) => {
                    let kind = SymbolKind::Function {
                        params: f.params.iter().map(|p| p.ty).collect(),
                        return_type: f.return_type,
                    };
                    self.declare(&f.name, kind, None, f.error_info);
                }
            }
        }
        tracing::debug!(globals = self.scopes[0].len(), "registered declarations");
        for decl in &program.declarations {
            if let Declaration::Func(f) = decl {
                self.check_function(f);
            }
        }
        self.check_function(&program.main);
    }

    fn check_function(&mut self, func: &FuncDecl) {
        self.enter_scope();
        for param in &func.params {
            self.declare(&param.name, SymbolKind::Parameter, Some(param.ty), param.error_info);
        }
        self.current_return = Some(func.return_type);
        self.check_block_contents(&func.body);
        self.current_return = None;
        self.exit_scope();
    }

    fn check_block(&mut self, block: &StmtList) {
        self.enter_scope();
        self.check_block_contents(block);
        self.exit_scope();
    }

    fn check_block_contents(&mut self, block: &StmtList) {
        for statement in &block.statements {
            self.check_statement(statement);
        }
    }

    fn check_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Assign { target, value, error_info } => self.check_assign(target, value, *error_info),
            Statement::Call(call) => {
                self.check_call(call);
            }
            Statement::Print { args, error_info } =>
                self.check_builtin_args(builtins::print_signature(), args, *error_info),
            Statement::If { cond, then_block, else_block, .. } => {
                self.check_condition("if", cond);
                self.check_block(then_block);
                if let Some(else_block) = else_block {
                    self.check_block(else_block);
                }
            }
            Statement::While { cond, body, .. } => {
                self.check_condition("while", cond);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
            }
            Statement::Break(error_info) =>
                if self.loop_depth == 0 {
                    self.errors.push(SemanticError::MisplacedControlFlow {
                        keyword: "break",
                        context: "a loop",
                        error_info: *error_info,
                    });
                },
            Statement::Return(value, error_info) => self.check_return(value.as_ref(), *error_info),
        }
    }

    fn check_assign(&mut self, target: &Identifier, value: &Expression, error_info: ErrorInfo) {
        let value_type = self.check_value(value);
        let name = target.name().to_owned();
        let outcome = match self.lookup_mut(&normalize(&name)) {
            None => Err(SemanticError::UndeclaredIdentifier { name, error_info }),
            Some(Symbol { kind: SymbolKind::Function { .. }, .. }) =>
                Err(SemanticError::InvalidAssignment { name, error_info }),
            Some(symbol) => match (symbol.ty, value_type) {
                (None, Some(ty)) => {
                    symbol.ty = Some(ty);
                    Ok(())
                }
                (Some(declared), Some(ty)) if declared != ty => Err(SemanticError::TypeMismatch {
                    message: format!("cannot assign {} to '{}' of type {}", ty, name, declared),
                    error_info,
                }),
                _ => Ok(()),
            },
        };
        if let Err(error) = outcome {
            self.errors.push(error);
        }
    }

    fn check_condition(&mut self, keyword: &str, cond: &Expression) {
        match self.check_value(cond) {
            Some(Type::Bool) | None => (),
            Some(other) => self.mismatch(
                format!("{} condition must be bool, but is {}", keyword, other),
                cond.error_info(),
            ),
        }
    }

    fn check_return(&mut self, value: Option<&Expression>, error_info: ErrorInfo) {
        let expected = match self.current_return {
            Some(ty) => ty,
            None => {
                self.errors.push(SemanticError::MisplacedControlFlow {
                    keyword: "return",
                    context: "a function body",
                    error_info,
                });
                return;
            }
        };
        match (expected, value) {
            (Type::Void, None) => (),
            (Type::Void, Some(_)) => self.mismatch("a void function cannot return a value", error_info),
            (_, None) => self.mismatch(format!("function must return a value of type {}", expected), error_info),
            (_, Some(e)) => match self.check_value(e) {
                Some(actual) if actual != expected => self.mismatch(
                    format!("function returns {}, but the value is {}", expected, actual),
                    error_info,
                ),
                _ => (),
            },
        }
    }

    // Type of an expression used as a value. `None` when an error was already reported for it.
    fn check_value(&mut self, expr: &Expression) -> Option<Type> {
        let ty = self.check_expression(expr)?;
        if ty == Type::Void {
            self.mismatch("a void call cannot be used as a value", expr.error_info());
            None
        } else {
            Some(ty)
        }
    }

    fn check_expression(&mut self, expr: &Expression) -> Option<Type> {
        match expr {
            Expression::Literal(literal, _) => Some(literal.get_type()),
            Expression::Identifier(identifier, error_info) => self.check_identifier(identifier, *error_info),
            Expression::Call(call) => self.check_call(call),
            Expression::Unary(UnaryOperator::Bang, operand, error_info) => {
                match self.check_value(operand) {
                    Some(Type::Bool) | None => (),
                    Some(other) => self.mismatch(format!("'!' requires bool, but got {}", other), *error_info),
                }
                Some(Type::Bool)
            }
            Expression::Binary(op, left, right, error_info) => {
                let left = self.check_value(left);
                let right = self.check_value(right);
                self.check_binary(*op, left, right, *error_info)
            }
        }
    }

    fn check_identifier(&mut self, identifier: &Identifier, error_info: ErrorInfo) -> Option<Type> {
        let name = identifier.name().to_owned();
        let outcome = match self.lookup_mut(&normalize(&name)) {
            None => Err(SemanticError::UndeclaredIdentifier { name, error_info }),
            Some(Symbol { kind: SymbolKind::Function { .. }, .. }) => Err(SemanticError::TypeMismatch {
                message: format!("function '{}' used as a value", name),
                error_info,
            }),
            // A global read before any assignment holds the integer default.
            Some(symbol) => Ok(*symbol.ty.get_or_insert(Type::Int)),
        };
        outcome.map_err(|error| self.errors.push(error)).ok()
    }

    fn check_binary(
        &mut self,
        op: BinaryOperator,
        left: Option<Type>,
        right: Option<Type>,
        error_info: ErrorInfo,
    ) -> Option<Type> {
        let (operands, result) = match op {
            BinaryOperator::Plus | BinaryOperator::Minus | BinaryOperator::Mult | BinaryOperator::Div =>
                (Some(Type::Int), Type::Int),
            BinaryOperator::Less | BinaryOperator::LessEqual | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => (Some(Type::Int), Type::Bool),
            BinaryOperator::And | BinaryOperator::Or => (Some(Type::Bool), Type::Bool),
            BinaryOperator::EqualEqual | BinaryOperator::BangEqual => (None, Type::Bool),
        };
        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            _ => return Some(result),
        };
        match operands {
            Some(expected) if left != expected || right != expected => self.mismatch(
                format!("'{}' requires {} operands, but got {} and {}", op.symbol(), expected, left, right),
                error_info,
            ),
            None if left != right || !left.is_printable() => self.mismatch(
                format!("'{}' cannot compare {} and {}", op.symbol(), left, right),
                error_info,
            ),
            _ => (),
        }
        Some(result)
    }

    // Return type of the call, `None` if the callee could not be resolved.
    fn check_call(&mut self, call: &Call) -> Option<Type> {
        if let Some(signature) = builtins::lookup(&call.name) {
            self.check_builtin_args(signature, &call.args, call.error_info);
            return Some(signature.return_type);
        }
        let symbol = self.lookup_mut(&normalize(&call.name)).map(|s| s.kind.clone());
        match symbol {
            Some(SymbolKind::Function { params, return_type }) => {
                let args = call.args.iter().map(|a| self.check_value(a)).collect::<Vec<_>>();
                if args.len() != params.len() {
                    self.arity(&call.name, params.len(), args.len(), call.error_info);
                } else {
                    for (i, (arg, param)) in args.into_iter().zip(params).enumerate() {
                        match arg {
                            Some(arg) if arg != param => self.mismatch(
                                format!("argument {} of '{}' expects {}, but got {}", i + 1, call.name, param, arg),
                                call.error_info,
                            ),
                            _ => (),
                        }
                    }
                }
                Some(return_type)
            }
            Some(_) => {
                self.errors.push(SemanticError::NotCallable { name: call.name.clone(), error_info: call.error_info });
                None
            }
            None => {
                self.errors.push(SemanticError::UndeclaredIdentifier { name: call.name.clone(), error_info: call.error_info });
                None
            }
        }
    }

    fn check_builtin_args(&mut self, signature: &builtins::Signature, args: &[Expression], error_info: ErrorInfo) {
        let types = args.iter().map(|a| self.check_value(a)).collect::<Vec<_>>();
        if types.len() != signature.params.len() {
            self.arity(signature.name, signature.params.len(), types.len(), error_info);
            return;
        }
        for (i, (ty, param)) in types.into_iter().zip(signature.params).enumerate() {
            match ty {
                Some(ty) if !param.accepts(ty) => self.mismatch(
                    format!("argument {} of '{}' expects {}, but got {}", i + 1, signature.name, param, ty),
                    error_info,
                ),
                _ => (),
            }
        }
    }

    fn declare(&mut self, name: &str, kind: SymbolKind, ty: Option<Type>, error_info: ErrorInfo) {
        let key = normalize(name);
        let depth = self.scopes.len() - 1;
        // `world` and `agent` are reserved in every scope, built-in names at the top level.
        let reserved = key == "world" || key == "agent" || (depth == 0 && builtins::lookup(&key).is_some());
        let scope = match self.scopes.last_mut() {
            Some(scope) => scope,
            None => return,
        };
        if reserved || scope.contains_key(&key) {
            self.errors.push(SemanticError::Redeclaration { name: name.to_owned(), error_info });
            return;
        }
        scope.insert(key, Symbol { kind, ty, depth });
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let symbol = self.scopes.iter_mut().rev().find_map(|scope| scope.get_mut(name));
        if let Some(s) = &symbol {
            tracing::trace!(symbol = name, depth = s.depth, "resolved");
        }
        symbol
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn mismatch<S: Into<String>>(&mut self, message: S, error_info: ErrorInfo) {
        self.errors.push(SemanticError::TypeMismatch { message: message.into(), error_info });
    }

    fn arity(&mut self, name: &str, expected: usize, actual: usize, error_info: ErrorInfo) {
        self.errors.push(SemanticError::ArityMismatch { name: name.to_owned(), expected, actual, error_info });
    }

    // Globals never assigned or read default to int.
    fn annotate(&self, mut program: Program) -> Program {
        let globals = &self.scopes[0];
        for decl in &mut program.declarations {
            if let Declaration::Var(v) = decl {
                for binding in &mut v.vars {
                    binding.ty = globals
                        .get(&normalize(&binding.name))
                        .and_then(|s| s.ty)
                        .or(Some(Type::Int));
                }
            }
        }
        program
    }
}
