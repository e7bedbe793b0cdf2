use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use crate::cwl::common::utils::{normalize, RcRc};
use crate::cwl::interpreter::value::Value;
use crate::cwl::interpreter::world::{Agent, World};

/// One of the two singleton object slots.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Slot {
    World,
    Agent,
}

impl Slot {
    pub fn of(name: &str) -> Option<Slot> {
        match normalize(name).as_str() {
            "world" => Some(Slot::World),
            "agent" => Some(Slot::Agent),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Slot::World => "world",
            Slot::Agent => "agent",
        }
    }
}

type Map = HashMap<String, Value>;

/// Globals, a stack of call frames, and the world and agent slots. Every key passes through
/// `normalize`.
pub struct Environment {
    globals: Map,
    frames: Vec<Map>,
    world: Option<RcRc<World>>,
    agent: Option<RcRc<Agent>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment { globals: HashMap::new(), frames: Vec::new(), world: None, agent: None }
    }

    pub fn define_global(&mut self, key: &str, value: Value) {
        self.globals.insert(normalize(key), value);
    }

    pub fn push_frame<'a, I: IntoIterator<Item=(&'a str, Value)>>(&mut self, bindings: I) {
        self.frames.push(bindings.into_iter().map(|(k, v)| (normalize(k), v)).collect());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let key = normalize(key);
        self.frames
            .last()
            .and_then(|f| f.get(&key))
            .or_else(|| self.globals.get(&key))
            .cloned()
    }

    /// Stores into the nearest existing binding, or creates one in the current scope.
    pub fn assign(&mut self, key: &str, value: Value) {
        let key = normalize(key);
        if let Some(slot) = self.frames.last_mut().and_then(|f| f.get_mut(&key)) {
            *slot = value;
        } else if let Some(slot) = self.globals.get_mut(&key) {
            *slot = value;
        } else {
            self.frames.last_mut().unwrap_or(&mut self.globals).insert(key, value);
        }
    }

    pub fn world(&self) -> Option<RcRc<World>> { self.world.clone() }
    pub fn agent(&self) -> Option<RcRc<Agent>> { self.agent.clone() }

    pub fn install_world(&mut self, world: RcRc<World>) {
        self.world = Some(world);
    }

    pub fn install_agent(&mut self, agent: RcRc<Agent>) {
        self.agent = Some(agent);
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let short = |map: &Map| {
            map.iter().map(|(k, v)| format!("{} -> {}", k, v.stringify())).collect::<Vec<_>>().join(",")
        };
        let frames = self.frames.iter().map(short).collect::<Vec<_>>().join(";;");
        write!(f, "{}\n{}", short(&self.globals), frames)
    }
}
