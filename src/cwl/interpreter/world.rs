use std::collections::HashSet;

use crate::cwl::common::lexer::Direction;
use crate::cwl::common::utils::RcRc;

/// A grid of cells, all dirty until cleaned. Column `x` grows eastwards and row `y` southwards.
#[derive(Debug)]
pub struct World {
    width: i64,
    height: i64,
    cells: i64,
    cleaned: HashSet<(i64, i64)>,
}

impl World {
    /// `None` when the cell count does not fit in an `i64`. Callers reject non-positive sizes.
    pub fn new(width: i64, height: i64) -> Option<World> {
        let cells = width.checked_mul(height)?;
        Some(World { width, height, cells, cleaned: HashSet::new() })
    }

    pub fn width(&self) -> i64 { self.width }
    pub fn height(&self) -> i64 { self.height }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        (0..self.width).contains(&x) && (0..self.height).contains(&y)
    }

    pub fn is_dirty(&self, x: i64, y: i64) -> bool {
        self.contains(x, y) && !self.cleaned.contains(&(x, y))
    }

    /// Returns whether the cell was dirty.
    pub fn clean(&mut self, x: i64, y: i64) -> bool {
        self.contains(x, y) && self.cleaned.insert((x, y))
    }

    pub fn dirt_remaining(&self) -> i64 {
        self.cells - self.cleaned.len() as i64
    }
}

#[derive(Debug)]
pub struct Agent {
    x: i64,
    y: i64,
    facing: Direction,
    cleaned: i64,
    world: RcRc<World>,
}

impl Agent {
    /// `None` when the position lies outside the world.
    pub fn new(world: RcRc<World>, x: i64, y: i64, facing: Direction) -> Option<Agent> {
        if world.borrow().contains(x, y) {
            Some(Agent { x, y, facing, cleaned: 0, world })
        } else {
            None
        }
    }

    pub fn position(&self) -> (i64, i64) { (self.x, self.y) }
    pub fn facing(&self) -> Direction { self.facing }
    pub fn cleaned(&self) -> i64 { self.cleaned }

    fn ahead(&self) -> (i64, i64) {
        let (dx, dy) = self.facing.delta();
        (self.x + dx, self.y + dy)
    }

    pub fn front_is_blocked(&self) -> bool {
        let (x, y) = self.ahead();
        !self.world.borrow().contains(x, y)
    }

    /// Moves one cell ahead; stays put when blocked.
    pub fn move_forward(&mut self) -> bool {
        if self.front_is_blocked() {
            return false;
        }
        let (x, y) = self.ahead();
        self.x = x;
        self.y = y;
        true
    }

    pub fn turn_right(&mut self) {
        self.facing = self.facing.turn_right();
    }

    pub fn is_dirty(&self) -> bool {
        self.world.borrow().is_dirty(self.x, self.y)
    }

    pub fn clean(&mut self) {
        if self.world.borrow_mut().clean(self.x, self.y) {
            self.cleaned += 1;
        }
    }
}
