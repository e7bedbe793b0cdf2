use std::io::Write;

use crate::cwl::builtins::Builtin;
use crate::cwl::common::error::ErrorInfo;
use crate::cwl::common::utils::{rcrc, RcRc};
use crate::cwl::interpreter::environment::{Environment, Slot};
use crate::cwl::interpreter::result::RuntimeError;
use crate::cwl::interpreter::value::Value;
use crate::cwl::interpreter::world::{Agent, World};

/// Runs a built-in on already evaluated arguments. Arguments of the wrong kind or count are
/// `InvalidOperand`; an unset world or agent handle is `UninitializedSingletonAccess`.
pub fn call_native(
    builtin: Builtin,
    args: &[Value],
    environment: &mut Environment,
    writer: &mut impl Write,
    error_info: ErrorInfo,
) -> Result<Value, RuntimeError> {
    tracing::trace!(?builtin, line = error_info.line, "native call");
    match (builtin, args) {
        (Builtin::InitWorld, [Value::Int(width), Value::Int(height)]) => {
            if *width < 1 || *height < 1 {
                return Err(RuntimeError::invalid_operand(
                    format!("world size must be positive, but got {}x{}", width, height), error_info));
            }
            let world = World::new(*width, *height)
                .map(rcrc)
                .ok_or(RuntimeError::IntegerOverflow { error_info })?;
            environment.install_world(world.clone());
            Ok(Value::World(world))
        }
        (Builtin::SetAgent, [world, Value::Int(x), Value::Int(y), Value::Direction(facing)]) => {
            let world = world_arg(world, error_info)?;
            let agent = Agent::new(world, *x, *y, *facing)
                .map(rcrc)
                .ok_or_else(|| RuntimeError::invalid_operand(
                    format!("position ({}, {}) lies outside the world", x, y), error_info))?;
            environment.install_agent(agent.clone());
            Ok(Value::Agent(agent))
        }
        (Builtin::DirtRemaining, [world]) =>
            Ok(Value::Int(world_arg(world, error_info)?.borrow().dirt_remaining())),
        (Builtin::IsDirty, [agent]) => Ok(Value::Bool(agent_arg(agent, error_info)?.borrow().is_dirty())),
        (Builtin::Clean, [agent]) => {
            agent_arg(agent, error_info)?.borrow_mut().clean();
            Ok(Value::Void)
        }
        (Builtin::MoveForward, [agent]) => {
            agent_arg(agent, error_info)?.borrow_mut().move_forward();
            Ok(Value::Void)
        }
        (Builtin::TurnRight, [agent]) => {
            agent_arg(agent, error_info)?.borrow_mut().turn_right();
            Ok(Value::Void)
        }
        (Builtin::FrontIsBlocked, [agent]) =>
            Ok(Value::Bool(agent_arg(agent, error_info)?.borrow().front_is_blocked())),
        (Builtin::Print, [value]) => {
            let text = value.printable().ok_or_else(|| RuntimeError::invalid_operand(
                format!("cannot print a value of type {}", value.type_name()), error_info))?;
            writeln!(writer, "{}", text)
                .map_err(|e| RuntimeError::OutputFailed { message: e.to_string(), error_info })?;
            Ok(Value::Void)
        }
        (builtin, args) => Err(RuntimeError::invalid_operand(
            format!(
                "{:?} cannot be applied to ({})",
                builtin,
                args.iter().map(|a| a.type_name()).collect::<Vec<_>>().join(", "),
            ),
            error_info,
        )),
    }
}

fn world_arg(value: &Value, error_info: ErrorInfo) -> Result<RcRc<World>, RuntimeError> {
    match value {
        Value::World(world) => Ok(world.clone()),
        Value::Void => Err(RuntimeError::UninitializedSingletonAccess { name: Slot::World.name(), error_info }),
        other => Err(RuntimeError::invalid_operand(format!("expected a world, but got {}", other.type_name()), error_info)),
    }
}

fn agent_arg(value: &Value, error_info: ErrorInfo) -> Result<RcRc<Agent>, RuntimeError> {
    match value {
        Value::Agent(agent) => Ok(agent.clone()),
        Value::Void => Err(RuntimeError::UninitializedSingletonAccess { name: Slot::Agent.name(), error_info }),
        other => Err(RuntimeError::invalid_operand(format!("expected an agent, but got {}", other.type_name()), error_info)),
    }
}

#[cfg(test)]
mod tests {
    use crate::cwl::common::lexer::Direction;

    use super::*;

    fn call(builtin: Builtin, args: &[Value], env: &mut Environment) -> (Result<Value, RuntimeError>, String) {
        let mut out = Vec::new();
        let result = call_native(builtin, args, env, &mut out, ErrorInfo::new(7));
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn init_world_installs_the_slot() {
        let mut env = Environment::new();
        let (world, _) = call(Builtin::InitWorld, &[Value::Int(4), Value::Int(2)], &mut env);
        let world = world.unwrap();
        assert_eq!(Some(world.clone()), env.world().map(Value::World));
        let (dirt, _) = call(Builtin::DirtRemaining, &[world], &mut env);
        assert_eq!(dirt, Ok(Value::Int(8)));
    }

    #[test]
    fn set_agent_binds_to_the_given_world() {
        let mut env = Environment::new();
        let world = call(Builtin::InitWorld, &[Value::Int(2), Value::Int(2)], &mut env).0.unwrap();
        let (agent, _) = call(
            Builtin::SetAgent,
            &[world.clone(), Value::Int(1), Value::Int(0), Value::Direction(Direction::South)],
            &mut env,
        );
        let agent = agent.unwrap();
        call(Builtin::Clean, &[agent.clone()], &mut env).0.unwrap();
        assert_eq!(call(Builtin::IsDirty, &[agent.clone()], &mut env).0, Ok(Value::Bool(false)));
        assert_eq!(call(Builtin::DirtRemaining, &[world], &mut env).0, Ok(Value::Int(3)));
        assert_eq!(env.agent().map(Value::Agent), Some(agent));
    }

    #[test]
    fn direct_invocation_with_wrong_operands() {
        let mut env = Environment::new();
        let (result, _) = call(Builtin::DirtRemaining, &[Value::Int(3)], &mut env);
        assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
        let (result, _) = call(Builtin::InitWorld, &[Value::Int(3)], &mut env);
        assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
        let (result, _) = call(Builtin::TurnRight, &[Value::Bool(true)], &mut env);
        assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
        let (result, _) = call(Builtin::InitWorld, &[Value::Int(0), Value::Int(3)], &mut env);
        assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
    }

    #[test]
    fn unset_handles() {
        let mut env = Environment::new();
        let (result, _) = call(Builtin::IsDirty, &[Value::Void], &mut env);
        assert_eq!(
            result,
            Err(RuntimeError::UninitializedSingletonAccess { name: "agent", error_info: ErrorInfo::new(7) }),
        );
    }

    #[test]
    fn agent_outside_world() {
        let mut env = Environment::new();
        let world = call(Builtin::InitWorld, &[Value::Int(2), Value::Int(2)], &mut env).0.unwrap();
        let (result, _) = call(
            Builtin::SetAgent,
            &[world, Value::Int(2), Value::Int(0), Value::Direction(Direction::East)],
            &mut env,
        );
        assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
        assert!(env.agent().is_none());
    }

    #[test]
    fn print_writes_one_line() {
        let mut env = Environment::new();
        let (result, out) = call(Builtin::Print, &[Value::Direction(Direction::West)], &mut env);
        assert_eq!(result, Ok(Value::Void));
        assert_eq!(out, "W\n");
        let (result, out) = call(Builtin::Print, &[Value::Void], &mut env);
        assert!(matches!(result, Err(RuntimeError::InvalidOperand { .. })));
        assert_eq!(out, "");
    }
}
