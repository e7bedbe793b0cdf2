use std::cell::RefCell;
use std::rc::Rc;

pub type RcRc<A> = Rc<RefCell<A>>;

pub fn rcrc<A>(a: A) -> RcRc<A> {
    Rc::new(RefCell::new(a))
}

/// Identifiers are case-insensitive. Every symbol table and environment goes through this
/// function when a name is inserted or looked up, and nowhere else.
pub fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

pub fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

/// Grows the stack before `f` runs when less than the red zone remains. Wraps every recursive
/// step of the tree walks, whose depth is the product of call depth and block nesting.
#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_GROWTH, f)
}

const RED_ZONE: usize = 128 * 1024;
const STACK_PER_GROWTH: usize = 2 * 1024 * 1024;
