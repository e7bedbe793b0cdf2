use std::collections::HashMap;
use std::io::Write;

use crate::cwl::analyze::ValidatedProgram;
use crate::cwl::ast::{
    BinaryOperator, Call, Declaration, Expression, FuncDecl, Identifier, Program, Statement,
    StmtList, UnaryOperator,
};
use crate::cwl::builtins;
use crate::cwl::builtins::Builtin;
use crate::cwl::common::error::ErrorInfo;
use crate::cwl::common::utils::{ensure_sufficient_stack, normalize};
use crate::cwl::interpreter::environment::{Environment, Slot};
use crate::cwl::interpreter::native::call_native;
use crate::cwl::interpreter::result::{
    binary_type_error, unary_type_error, InterpretResult, InterpreterErrorOrControlFlow, RuntimeError,
};
use crate::cwl::interpreter::value::Value;

pub mod environment;
pub mod native;
pub mod result;
pub mod value;
pub mod world;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct InterpreterConfig {
    /// Iterations a single `while` execution may run before it is aborted.
    pub max_loop_iterations: usize,
    /// Deepest chain of active user-function calls, `main` included.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig { max_loop_iterations: 100_000, max_call_depth: 256 }
    }
}

/// Runs `main` of a validated program, writing `print` output to `writer`.
pub fn execute<W: Write>(
    program: &ValidatedProgram,
    config: InterpreterConfig,
    writer: &mut W,
) -> Result<(), RuntimeError> {
    execute_program(program.program(), config, writer)
}

// Also reachable with unvalidated programs, where every dynamic check has to hold on its own.
#[tracing::instrument(level = "debug", skip_all, fields(program = %program.name))]
pub(crate) fn execute_program<W: Write>(
    program: &Program,
    config: InterpreterConfig,
    writer: &mut W,
) -> Result<(), RuntimeError> {
    let mut interpreter = Interpreter::new(program, config, writer);
    let result = interpreter.call_function(&program.main, Vec::new(), program.main.error_info);
    match &result {
        Ok(_) => tracing::debug!("program finished"),
        Err(e) => tracing::debug!(error = %e, "program aborted"),
    }
    result.map(|_| ())
}

struct Interpreter<'p, 'w, W: Write> {
    environment: Environment,
    functions: HashMap<String, &'p FuncDecl>,
    config: InterpreterConfig,
    writer: &'w mut W,
    depth: usize,
}

impl<'p, 'w, W: Write> Interpreter<'p, 'w, W> {
    fn new(program: &'p Program, config: InterpreterConfig, writer: &'w mut W) -> Self {
        let mut environment = Environment::new();
        let mut functions = HashMap::new();
        for decl in &program.declarations {
            match decl {
                Declaration::Var(v) => {
                    for binding in &v.vars {
                        environment.define_global(&binding.name, Value::default_for(binding.ty));
                    }
                }
                Declaration::Func(f) => {
                    functions.insert(normalize(&f.name), f);
                }
            }
        }
        Interpreter { environment, functions, config, writer, depth: 0 }
    }

    fn call_function(&mut self, func: &'p FuncDecl, args: Vec<Value>, error_info: ErrorInfo) -> Result<Value, RuntimeError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::RecursionLimitExceeded { limit: self.config.max_call_depth, error_info });
        }
        if args.len() != func.params.len() {
            return Err(RuntimeError::invalid_operand(
                format!("'{}' expects {} argument(s), but got {}", func.name, func.params.len(), args.len()),
                error_info,
            ));
        }
        tracing::trace!(function = %func.name, depth = self.depth, "call");
        self.environment.push_frame(func.params.iter().map(|p| p.name.as_str()).zip(args));
        self.depth += 1;
        let result = self.execute_block(&func.body);
        self.depth -= 1;
        self.environment.pop_frame();
        match result {
            Ok(()) => Ok(Value::Void),
            Err(InterpreterErrorOrControlFlow::Returned(value, _)) => Ok(value),
            Err(InterpreterErrorOrControlFlow::Broke(error_info)) => Err(RuntimeError::MisplacedBreak { error_info }),
            Err(InterpreterErrorOrControlFlow::Error(e)) => Err(e),
        }
    }

    fn execute_block(&mut self, block: &'p StmtList) -> InterpretResult<()> {
        ensure_sufficient_stack(|| -> InterpretResult<()> {
            for statement in &block.statements {
                self.execute_statement(statement)?;
            }
            Ok(())
        })
    }

    fn execute_statement(&mut self, statement: &'p Statement) -> InterpretResult<()> {
        match statement {
            Statement::Assign { target, value, error_info } => {
                let value = self.evaluate(value)?;
                self.assign(target, value, *error_info)?;
            }
            Statement::Call(call) => {
                self.call(call)?;
            }
            Statement::Print { args, error_info } => {
                let args = self.evaluate_all(args)?;
                call_native(Builtin::Print, &args, &mut self.environment, &mut *self.writer, *error_info)?;
            }
            Statement::If { cond, then_block, else_block, error_info } => {
                if self.condition(cond, *error_info)? {
                    self.execute_block(then_block)?;
                } else if let Some(else_block) = else_block {
                    self.execute_block(else_block)?;
                }
            }
            Statement::While { cond, body, error_info } => {
                let mut iterations = 0;
                while self.condition(cond, *error_info)? {
                    iterations += 1;
                    if iterations > self.config.max_loop_iterations {
                        return Err(RuntimeError::IterationLimitExceeded {
                            limit: self.config.max_loop_iterations,
                            error_info: *error_info,
                        }.into());
                    }
                    match self.execute_block(body) {
                        Err(InterpreterErrorOrControlFlow::Broke(_)) => break,
                        other => other?,
                    }
                }
                tracing::trace!(line = error_info.line, iterations, "loop finished");
            }
            Statement::Break(error_info) => return Err(InterpreterErrorOrControlFlow::Broke(*error_info)),
            Statement::Return(value, error_info) => {
                let value = match value {
                    Some(e) => self.evaluate(e)?,
                    None => Value::Void,
                };
                return Err(InterpreterErrorOrControlFlow::Returned(value, *error_info));
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Identifier, value: Value, error_info: ErrorInfo) -> Result<(), RuntimeError> {
        match (Slot::of(target.name()), value) {
            (Some(Slot::World), Value::World(world)) => self.environment.install_world(world),
            (Some(Slot::Agent), Value::Agent(agent)) => self.environment.install_agent(agent),
            (Some(slot), value) => return Err(RuntimeError::invalid_operand(
                format!("cannot store {} in '{}'", value.type_name(), slot.name()), error_info)),
            (None, value) => self.environment.assign(target.name(), value),
        }
        Ok(())
    }

    fn condition(&mut self, cond: &'p Expression, error_info: ErrorInfo) -> Result<bool, RuntimeError> {
        match self.evaluate(cond)? {
            Value::Bool(b) => Ok(b),
            other => Err(RuntimeError::invalid_operand(
                format!("condition must be bool, but is {}", other.type_name()), error_info)),
        }
    }

    fn evaluate_all(&mut self, exprs: &'p [Expression]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.evaluate(e)).collect()
    }

    fn evaluate(&mut self, expr: &'p Expression) -> Result<Value, RuntimeError> {
        ensure_sufficient_stack(|| self.evaluate_expression(expr))
    }

    fn evaluate_expression(&mut self, expr: &'p Expression) -> Result<Value, RuntimeError> {
        match expr {
            Expression::Literal(literal, _) => Ok(literal.into()),
            Expression::Identifier(identifier, error_info) => self.read(identifier, *error_info),
            Expression::Call(call) => self.call(call),
            Expression::Unary(op, operand, error_info) => {
                let value = self.evaluate(operand)?;
                match (op, &value) {
                    (UnaryOperator::Bang, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    _ => unary_type_error(*op, &value, *error_info),
                }
            }
            Expression::Binary(op @ (BinaryOperator::And | BinaryOperator::Or), left, right, error_info) => {
                let left = self.evaluate(left)?;
                match (op, &left) {
                    (BinaryOperator::And, Value::Bool(false)) => Ok(Value::Bool(false)),
                    (BinaryOperator::Or, Value::Bool(true)) => Ok(Value::Bool(true)),
                    (_, Value::Bool(_)) => match self.evaluate(right)? {
                        right @ Value::Bool(_) => Ok(right),
                        right => binary_type_error(*op, &left, &right, *error_info),
                    },
                    _ => Err(RuntimeError::invalid_operand(
                        format!("'{}' requires bool operands, but got {}", op.symbol(), left.type_name()),
                        *error_info,
                    )),
                }
            }
            Expression::Binary(op, left, right, error_info) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(*op, &left, &right, *error_info)
            }
        }
    }

    fn read(&self, identifier: &Identifier, error_info: ErrorInfo) -> Result<Value, RuntimeError> {
        let uninitialized = |slot: Slot| RuntimeError::UninitializedSingletonAccess { name: slot.name(), error_info };
        match Slot::of(identifier.name()) {
            Some(Slot::World) => self.environment.world().map(Value::World).ok_or_else(|| uninitialized(Slot::World)),
            Some(Slot::Agent) => self.environment.agent().map(Value::Agent).ok_or_else(|| uninitialized(Slot::Agent)),
            None => self.environment.get(identifier.name()).ok_or_else(|| RuntimeError::UndefinedVariable {
                name: identifier.name().to_owned(),
                error_info,
            }),
        }
    }

    fn call(&mut self, call: &'p Call) -> Result<Value, RuntimeError> {
        let args = self.evaluate_all(&call.args)?;
        if let Some(signature) = builtins::lookup(&call.name) {
            return call_native(signature.builtin, &args, &mut self.environment, &mut *self.writer, call.error_info);
        }
        match self.functions.get(&normalize(&call.name)).copied() {
            Some(func) => self.call_function(func, args, call.error_info),
            None => Err(RuntimeError::UndefinedFunction { name: call.name.clone(), error_info: call.error_info }),
        }
    }
}

fn binary(op: BinaryOperator, left: &Value, right: &Value, error_info: ErrorInfo) -> Result<Value, RuntimeError> {
    let overflow = || RuntimeError::IntegerOverflow { error_info };
    match (op, left, right) {
        (BinaryOperator::Plus, Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOperator::Minus, Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOperator::Mult, Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
        (BinaryOperator::Div, Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero { error_info }),
        (BinaryOperator::Div, Value::Int(a), Value::Int(b)) => floor_div(*a, *b).map(Value::Int).ok_or_else(overflow),
        (BinaryOperator::Less, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a < b)),
        (BinaryOperator::LessEqual, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a <= b)),
        (BinaryOperator::Greater, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a > b)),
        (BinaryOperator::GreaterEqual, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(a >= b)),
        (BinaryOperator::EqualEqual | BinaryOperator::BangEqual, _, _)
        if left.printable().is_some() && left.type_name() == right.type_name() => {
            let equal = left == right;
            Ok(Value::Bool(if op == BinaryOperator::EqualEqual { equal } else { !equal }))
        }
        _ => binary_type_error(op, left, right, error_info),
    }
}

// Rounds towards negative infinity. `None` only for `i64::MIN / -1`.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::cwl::tests::{in_main, run_with, unsafe_lower, unsafe_run};

    use super::*;

    fn run_main(statements: &str) -> String {
        unsafe_run(vec![in_main(statements).as_str()])
    }

    fn fail_main(statements: &str) -> (String, RuntimeError) {
        let (output, result) = run_with(vec![in_main(statements).as_str()], InterpreterConfig::default());
        (output, result.unwrap_err())
    }

    #[test]
    fn print_mapping() {
        assert_eq!(run_main("print(42); print(true); print(\"hi\"); print(N);"), "42\ntrue\nhi\nN\n");
    }

    #[test]
    fn arithmetic() {
        assert_eq!(
            unsafe_run(vec!["program p begin var x;", "func main() begin x = 5 + 3; print(x); end", "end"]),
            "8\n",
        );
        assert_eq!(run_main("print(2 + 3 * 4 - 10 / 3); print((2 + 3) * 4);"), "11\n20\n");
    }

    #[test]
    fn division_floors() {
        assert_eq!(run_main("print(7 / 2); print((0 - 7) / 2); print(7 / (0 - 2)); print((0 - 8) / 2);"), "3\n-4\n-4\n-4\n");
    }

    #[test]
    fn division_by_zero() {
        let (output, error) = fail_main("print(1);\nprint(1 / (2 - 2));\nprint(3);");
        assert_eq!(output, "1\n");
        assert_eq!(error, RuntimeError::DivisionByZero { error_info: ErrorInfo::new(4) });
    }

    #[test]
    fn overflow() {
        let (_, error) = fail_main("print(9223372036854775807 + 1);");
        assert_eq!(error, RuntimeError::IntegerOverflow { error_info: ErrorInfo::new(3) });
    }

    #[test]
    fn if_else_runs_exactly_one_branch() {
        assert_eq!(run_main("if false then print(\"a\"); else print(\"b\"); end"), "b\n");
        assert_eq!(run_main("if 1 < 2 then print(\"a\"); else print(\"b\"); end"), "a\n");
        assert_eq!(run_main("if false then print(\"a\"); end print(\"c\");"), "c\n");
    }

    #[test]
    fn while_and_break() {
        assert_eq!(
            unsafe_run(vec![
                "program p begin var i;",
                "func main() begin",
                "  while i < 10 do",
                "    if i == 3 then break; end",
                "    print(i);",
                "    i = i + 1;",
                "  end",
                "  print(\"done\");",
                "end end",
            ]),
            "0\n1\n2\ndone\n",
        );
    }

    #[test]
    fn endless_loop_hits_the_iteration_guard() {
        let (output, error) = fail_main("while true do end\nprint(1);");
        assert_eq!(output, "");
        assert_eq!(
            error,
            RuntimeError::IterationLimitExceeded { limit: 100_000, error_info: ErrorInfo::new(3) },
        );
    }

    #[test]
    fn iteration_guard_allows_exactly_the_limit() {
        let config = InterpreterConfig { max_loop_iterations: 3, ..InterpreterConfig::default() };
        let (output, result) = run_with(vec![in_main("while true do print(1); end").as_str()], config);
        assert_eq!(output, "1\n1\n1\n");
        assert!(matches!(result, Err(RuntimeError::IterationLimitExceeded { limit: 3, .. })));

        let (output, result) = run_with(
            vec!["program p begin var i;", "func main() begin while i < 3 do i = i + 1; end print(i); end", "end"],
            config,
        );
        assert_eq!(output, "3\n");
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn iteration_count_is_per_loop_execution() {
        let config = InterpreterConfig { max_loop_iterations: 2, ..InterpreterConfig::default() };
        let (output, result) = run_with(
            vec![
                "program p begin var i, j;",
                "func main() begin",
                "  while i < 2 do",
                "    j = 0;",
                "    while j < 2 do j = j + 1; end",
                "    i = i + 1;",
                "  end",
                "  print(i + j);",
                "end end",
            ],
            config,
        );
        assert_eq!(result, Ok(()));
        assert_eq!(output, "4\n");
    }

    #[test]
    fn short_circuit() {
        assert_eq!(
            unsafe_run(vec![
                "program p begin",
                "func loud(): bool begin print(\"called\"); return true; end",
                "func main() begin",
                "  if false && loud() then print(1); end",
                "  if true || loud() then print(2); end",
                "  if true && loud() then print(3); end",
                "end end",
            ]),
            "2\ncalled\n3\n",
        );
    }

    #[test]
    fn parameters_shadow_globals() {
        assert_eq!(
            unsafe_run(vec![
                "program p begin var count;",
                "func show(count: int) begin count = count * 10; print(count); end",
                "func main() begin count = 1; show(5); print(count); end",
                "end",
            ]),
            "50\n1\n",
        );
    }

    #[test]
    fn recursion() {
        assert_eq!(
            unsafe_run(vec![
                "program p begin",
                "func fact(n: int): int begin",
                "  if n <= 1 then return 1; end",
                "  return n * fact(n - 1);",
                "end",
                "func main() begin print(fact(10)); end",
                "end",
            ]),
            "3628800\n",
        );
    }

    #[test]
    fn recursion_limit() {
        let config = InterpreterConfig { max_call_depth: 16, ..InterpreterConfig::default() };
        let (_, result) = run_with(
            vec![
                "program p begin",
                "func down(n: int): int begin return down(n + 1); end",
                "func main() begin print(down(0)); end",
                "end",
            ],
            config,
        );
        assert_eq!(
            result,
            Err(RuntimeError::RecursionLimitExceeded { limit: 16, error_info: ErrorInfo::new(2) }),
        );
    }

    // Deepest block nesting the parser allows, inside the deepest call chain the interpreter allows.
    fn nested_descent(calls: i64) -> String {
        format!(
            "program p begin
             func down(n: int): int begin
               if n == 0 then return 0; end
               {}return ((((down(n - 1))))) + 1;{}
               return 0;
             end
             func main() begin print(down({})); end
             end",
            "if true then ".repeat(100),
            " end".repeat(100),
            calls,
        )
    }

    #[test]
    fn deep_nesting_at_the_recursion_limit() {
        let (output, result) = run_with(vec![nested_descent(254).as_str()], InterpreterConfig::default());
        assert_eq!(result, Ok(()));
        assert_eq!(output, "254\n");

        let (output, result) = run_with(vec![nested_descent(255).as_str()], InterpreterConfig::default());
        assert!(matches!(result, Err(RuntimeError::RecursionLimitExceeded { limit: 256, .. })));
        assert_eq!(output, "");
    }

    #[test]
    fn return_from_inside_loop() {
        assert_eq!(
            unsafe_run(vec![
                "program p begin var i;",
                "func find(): int begin",
                "  while true do",
                "    if i == 4 then return i * 10; end",
                "    i = i + 1;",
                "  end",
                "  return 0;",
                "end",
                "func main() begin print(find()); print(i); end",
                "end",
            ]),
            "40\n4\n",
        );
    }

    #[test]
    fn break_exits_innermost_loop() {
        assert_eq!(
            unsafe_run(vec![
                "program p begin var outer;",
                "func main() begin",
                "  while outer < 2 do",
                "    outer = outer + 1;",
                "    while true do break; end",
                "    print(outer);",
                "  end",
                "end end",
            ]),
            "1\n2\n",
        );
    }

    #[test]
    fn world_before_init() {
        let (_, error) = fail_main("print(dirt_remaining(world));");
        assert_eq!(
            error,
            RuntimeError::UninitializedSingletonAccess { name: "world", error_info: ErrorInfo::new(3) },
        );
    }

    #[test]
    fn unset_global_handle() {
        let (_, result) = run_with(
            vec![
                "program p begin var w;",
                "func later() begin w = init_world(1, 1); end",
                "func main() begin print(dirt_remaining(w)); end",
                "end",
            ],
            InterpreterConfig::default(),
        );
        assert!(matches!(result, Err(RuntimeError::UninitializedSingletonAccess { name: "world", .. })));
    }

    #[test]
    fn singleton_names_are_case_insensitive() {
        assert_eq!(
            run_main(
                "World = init_world(2, 2);\nprint(dirt_remaining(WORLD));\nAGENT = set_agent(world, 0, 0, E);\nclean(Agent);\nprint(dirt_remaining(world));"
            ),
            "4\n3\n",
        );
    }

    #[test]
    fn cleaning_a_row() {
        assert_eq!(
            run_main(
                "world = init_world(4, 1);
                 agent = set_agent(world, 0, 0, E);
                 while dirt_remaining(world) > 0 do
                   if is_dirty(agent) then clean(agent); end
                   if front_is_blocked(agent) then turn_right(agent); turn_right(agent); end
                   move_forward(agent);
                 end
                 print(dirt_remaining(world));
                 print(is_dirty(agent));"
            ),
            "0\nfalse\n",
        );
    }

    #[test]
    fn blocked_moves_stay_put() {
        assert_eq!(
            run_main(
                "world = init_world(1, 1);
                 agent = set_agent(world, 0, 0, N);
                 move_forward(agent); turn_right(agent); move_forward(agent);
                 print(front_is_blocked(agent));
                 print(is_dirty(agent));"
            ),
            "true\ntrue\n",
        );
    }

    #[test]
    fn a_later_init_world_replaces_the_slot() {
        assert_eq!(
            run_main(
                "world = init_world(1, 1);
                 agent = set_agent(world, 0, 0, N);
                 world = init_world(3, 3);
                 clean(agent);
                 print(dirt_remaining(world));"
            ),
            "9\n",
        );
    }

    #[test]
    fn agent_outside_world() {
        let (_, error) = fail_main("world = init_world(2, 2);\nagent = set_agent(world, 5, 0, N);");
        assert!(matches!(error, RuntimeError::InvalidOperand { error_info: ErrorInfo { line: 4 }, .. }));
    }

    #[test]
    fn unvalidated_programs_still_fail_safely() {
        let program = unsafe_lower(vec![in_main("x = 1 + true;").as_str()]);
        let mut out = Vec::new();
        let error = execute_program(&program, InterpreterConfig::default(), &mut out).unwrap_err();
        assert!(matches!(error, RuntimeError::InvalidOperand { .. }));

        let program = unsafe_lower(vec![in_main("print(missing);").as_str()]);
        let error = execute_program(&program, InterpreterConfig::default(), &mut out).unwrap_err();
        assert_eq!(error, RuntimeError::UndefinedVariable { name: "missing".to_owned(), error_info: ErrorInfo::new(3) });

        let program = unsafe_lower(vec![in_main("break;").as_str()]);
        let error = execute_program(&program, InterpreterConfig::default(), &mut out).unwrap_err();
        assert_eq!(error, RuntimeError::MisplacedBreak { error_info: ErrorInfo::new(3) });
    }

    #[test]
    fn separate_runs_do_not_share_state() {
        let program = vec![in_main("world = init_world(2, 1); print(dirt_remaining(world));")];
        let program = program.iter().map(|s| s.as_str()).collect::<Vec<_>>();
        assert_eq!(unsafe_run(program.clone()), "2\n");
        assert_eq!(unsafe_run(program), "2\n");
    }
}
