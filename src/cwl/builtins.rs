use std::fmt;
use std::fmt::{Display, Formatter};

use crate::cwl::ast::Type;
use crate::cwl::common::utils::normalize;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Builtin {
    InitWorld,
    SetAgent,
    DirtRemaining,
    IsDirty,
    Clean,
    MoveForward,
    TurnRight,
    FrontIsBlocked,
    Print,
}

/// A built-in parameter. `Printable` is the closed set `print` accepts.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParamType {
    Exact(Type),
    Printable,
}

impl ParamType {
    pub fn accepts(&self, ty: Type) -> bool {
        match self {
            ParamType::Exact(expected) => *expected == ty,
            ParamType::Printable => ty.is_printable(),
        }
    }
}

impl Display for ParamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Exact(ty) => write!(f, "{}", ty),
            ParamType::Printable => f.write_str("int, bool, string or dir"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Signature {
    pub builtin: Builtin,
    pub name: &'static str,
    pub params: &'static [ParamType],
    pub return_type: Type,
}

const WORLD: ParamType = ParamType::Exact(Type::World);
const AGENT: ParamType = ParamType::Exact(Type::Agent);
const INT: ParamType = ParamType::Exact(Type::Int);
const DIR: ParamType = ParamType::Exact(Type::Dir);

pub static BUILTINS: &[Signature] = &[
    Signature { builtin: Builtin::InitWorld, name: "init_world", params: &[INT, INT], return_type: Type::World },
    Signature { builtin: Builtin::SetAgent, name: "set_agent", params: &[WORLD, INT, INT, DIR], return_type: Type::Agent },
    Signature { builtin: Builtin::DirtRemaining, name: "dirt_remaining", params: &[WORLD], return_type: Type::Int },
    Signature { builtin: Builtin::IsDirty, name: "is_dirty", params: &[AGENT], return_type: Type::Bool },
    Signature { builtin: Builtin::Clean, name: "clean", params: &[AGENT], return_type: Type::Void },
    Signature { builtin: Builtin::MoveForward, name: "move_forward", params: &[AGENT], return_type: Type::Void },
    Signature { builtin: Builtin::TurnRight, name: "turn_right", params: &[AGENT], return_type: Type::Void },
    Signature { builtin: Builtin::FrontIsBlocked, name: "front_is_blocked", params: &[AGENT], return_type: Type::Bool },
    PRINT,
];

const PRINT: Signature =
    Signature { builtin: Builtin::Print, name: "print", params: &[ParamType::Printable], return_type: Type::Void };

pub fn lookup(name: &str) -> Option<&'static Signature> {
    let name = normalize(name);
    BUILTINS.iter().find(|s| s.name == name)
}

pub fn print_signature() -> &'static Signature {
    &PRINT
}
