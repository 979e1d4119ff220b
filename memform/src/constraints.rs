//! Side conditions collected while encoding one edge

use crate::formula::{Formula, FormulaManager};

/// An append-only list of formulas that must hold in addition to an edge's main formula:
/// base address layout, deferred allocation typing and similar. Created empty per edge and
/// conjoined into the edge's result.
#[derive(Default, Debug, Clone)]
pub struct Constraints {
    constraints: Vec<Formula>,
}

impl Constraints {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_constraint(&mut self, f: Formula) {
        if !f.is_true() {
            self.constraints.push(f);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Formula> {
        self.constraints.iter()
    }

    /// The conjunction of all constraints, leaving `self` empty
    pub fn take(&mut self, fmgr: &FormulaManager) -> Formula {
        fmgr.make_and_all(std::mem::take(&mut self.constraints))
    }
}
