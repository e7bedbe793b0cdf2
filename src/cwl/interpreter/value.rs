use std::rc::Rc;

use crate::cwl::ast::{Literal, Type};
use crate::cwl::common::lexer::Direction;
use crate::cwl::common::utils::RcRc;
use crate::cwl::interpreter::world::{Agent, World};

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Direction(Direction),
    World(RcRc<World>),
    Agent(RcRc<Agent>),
    Void,
}

impl Value {
    /// Initial value of a global of the given type. World and agent globals start unset.
    pub fn default_for(ty: Option<Type>) -> Value {
        match ty {
            Some(Type::Int) | None => Value::Int(0),
            Some(Type::Bool) => Value::Bool(false),
            Some(Type::String) => Value::String(String::new()),
            Some(Type::Dir) => Value::Direction(Direction::North),
            Some(Type::World) | Some(Type::Agent) | Some(Type::Void) => Value::Void,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Direction(_) => "dir",
            Value::World(_) => "world",
            Value::Agent(_) => "agent",
            Value::Void => "void",
        }
    }

    /// The text `print` writes, for the types it accepts.
    pub fn printable(&self) -> Option<String> {
        match self {
            Value::Int(i) => Some(i.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Direction(d) => Some(d.letter().to_string()),
            _ => None,
        }
    }

    pub fn stringify(&self) -> String {
        match self {
            Value::World(w) => {
                let w = w.borrow();
                format!("<world {}x{}, {} dirty>", w.width(), w.height(), w.dirt_remaining())
            }
            Value::Agent(a) => {
                let a = a.borrow();
                let (x, y) = a.position();
                format!("<agent at ({}, {}) facing {}, {} cleaned>", x, y, a.facing(), a.cleaned())
            }
            Value::Void => "void".to_owned(),
            scalar => scalar.printable().unwrap_or_default(),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Int(i) => Value::Int(*i),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Direction(d) => Value::Direction(*d),
        }
    }
}

// Worlds and agents compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Direction(a), Value::Direction(b)) => a == b,
            (Value::World(a), Value::World(b)) => Rc::ptr_eq(a, b),
            (Value::Agent(a), Value::Agent(b)) => Rc::ptr_eq(a, b),
            (Value::Void, Value::Void) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cwl::common::utils::rcrc;

    use super::*;

    #[test]
    fn print_mapping() {
        assert_eq!(Value::Int(42).printable(), Some("42".to_owned()));
        assert_eq!(Value::Bool(true).printable(), Some("true".to_owned()));
        assert_eq!(Value::String("hi".to_owned()).printable(), Some("hi".to_owned()));
        assert_eq!(Value::Direction(Direction::North).printable(), Some("N".to_owned()));
        assert_eq!(Value::Void.printable(), None);
    }

    #[test]
    fn defaults() {
        assert_eq!(Value::default_for(None), Value::Int(0));
        assert_eq!(Value::default_for(Some(Type::String)), Value::String(String::new()));
        assert_eq!(Value::default_for(Some(Type::Agent)), Value::Void);
    }

    #[test]
    fn worlds_compare_by_identity() {
        let world = rcrc(World::new(1, 1).unwrap());
        assert_eq!(Value::World(world.clone()), Value::World(world));
        assert_ne!(Value::World(rcrc(World::new(1, 1).unwrap())), Value::World(rcrc(World::new(1, 1).unwrap())));
        assert_eq!(Value::World(rcrc(World::new(2, 3).unwrap())).stringify(), "<world 2x3, 6 dirty>");
    }

    #[test]
    fn agents_show_their_progress() {
        let world = rcrc(World::new(2, 2).unwrap());
        let agent = rcrc(Agent::new(world, 1, 0, Direction::South).unwrap());
        agent.borrow_mut().clean();
        assert_eq!(Value::Agent(agent).stringify(), "<agent at (1, 0) facing S, 1 cleaned>");
    }
}
