//! Path formulas and their disjunction at control-flow merge points

use crate::converter::FormulaConverter;
use crate::error::Result;
use crate::formula::Formula;
use crate::log::*;
use crate::pointer_target_set::PointerTargetSet;
use crate::region::is_heap_name;
use crate::ssa::{SsaMap, SsaMergeDifference};

/// The formula of a path from the program entry, together with the SSA indices and pointer
/// targets at its end. Immutable; cheap to clone.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PathFormula {
    formula: Formula,
    ssa: SsaMap,
    pts: PointerTargetSet,
    /// Number of edges that contributed to the formula
    length: usize,
}

impl PathFormula {
    pub fn new(formula: Formula, ssa: SsaMap, pts: PointerTargetSet, length: usize) -> Self {
        Self {
            formula,
            ssa,
            pts,
            length,
        }
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn ssa(&self) -> &SsaMap {
        &self.ssa
    }

    pub fn pointer_target_set(&self) -> &PointerTargetSet {
        &self.pts
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl std::fmt::Display for PathFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.formula)
    }
}

impl FormulaConverter {
    /// The formula of the empty path
    pub fn make_empty_path_formula(&self) -> PathFormula {
        PathFormula::new(
            self.fmgr.make_true(),
            SsaMap::empty(),
            PointerTargetSet::empty(),
            0,
        )
    }

    /// The disjunction of two paths reaching the same program point. The path with the lower
    /// index of a name is extended with equalities lifting that name to the merged index.
    pub fn make_or(&self, a: &PathFormula, b: &PathFormula) -> Result<PathFormula> {
        let fmgr = &self.fmgr;
        let (ssa, differences) = a.ssa.merge(&b.ssa);
        let pts = a.pts.merge(&b.pts);
        debug!("Merging paths"; "differences" => differences.len());

        let mut lift_a = vec![];
        let mut lift_b = vec![];
        for d in differences.iter() {
            self.shutdown.shutdown_if_necessary()?;
            if d.left < d.right {
                lift_a.push(self.make_merge_equality(d, d.left, &pts)?);
            } else {
                lift_b.push(self.make_merge_equality(d, d.right, &pts)?);
            }
        }
        let formula = fmgr.make_or(
            fmgr.make_and(a.formula.clone(), fmgr.make_and_all(lift_a)),
            fmgr.make_and(b.formula.clone(), fmgr.make_and_all(lift_b)),
        );
        Ok(PathFormula::new(
            formula,
            ssa,
            pts,
            a.length.max(b.length),
        ))
    }

    /// Version `d.merged()` of `d.name` equals version `lagging`
    fn make_merge_equality(
        &self,
        d: &SsaMergeDifference,
        lagging: u32,
        pts: &PointerTargetSet,
    ) -> Result<Formula> {
        let fmgr = &self.fmgr;
        let sort = self.types.sort_of(&d.ty)?;
        if !is_heap_name(&d.name) {
            return Ok(fmgr.make_equal(
                fmgr.make_variable(sort.clone(), &d.name, d.merged()),
                fmgr.make_variable(sort, &d.name, lagging),
            ));
        }
        if let Some(identity) =
            self.heap
                .make_whole_region_identity(fmgr, &d.name, &sort, lagging, d.merged())
        {
            return Ok(identity);
        }
        let mut equalities = vec![];
        for region in pts.regions().filter(|r| r.heap_name() == d.name) {
            for target in pts.targets(region) {
                equalities.push(self.heap.make_identity_pointer_assignment(
                    fmgr,
                    &d.name,
                    &sort,
                    lagging,
                    d.merged(),
                    target.address(self),
                ));
            }
        }
        Ok(fmgr.make_and_all(equalities))
    }
}
