//! The two interchangeable encodings of memory.
//!
//! Each memory region is a family of heap symbols indexed by SSA version. With [`ArrayHeap`], a
//! version is an SMT array from addresses to cell values and a write produces the next version by
//! `store`. With [`UfHeap`], a version is an uninterpreted function; a write only constrains the
//! written addresses of the next version, and the unwritten cells are carried over by the
//! retention constraints of [`crate::retention`].

use crate::formula::{Formula, FormulaManager, Sort};

/// Translates reads and writes of a memory region into formulas. The backend is chosen once per
/// converter.
pub trait SmtHeap: Send + Sync + std::fmt::Debug {
    /// Version `new_index` of region `name` is version `old_index` with `values` (pairs of address
    /// and value) written, in order.
    fn make_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        values: &[(Formula, Formula)],
    ) -> Formula;

    /// At `address`, version `new_index` holds `value` if `condition` holds and the old contents
    /// otherwise. Says nothing about other addresses; `address`, `condition` and `value` may
    /// mention quantified variables.
    #[allow(clippy::too_many_arguments)]
    fn make_quantified_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: Formula,
        condition: Formula,
        value: Formula,
    ) -> Formula;

    /// The contents at `address` do not change from `old_index` to `new_index`
    fn make_identity_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: Formula,
    ) -> Formula;

    /// The value at `address` in version `index`
    fn make_pointer_dereference(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        index: u32,
        address: Formula,
    ) -> Formula;

    /// Every cell is unchanged from `old_index` to `new_index`, or `None` if that can only be
    /// stated per address
    fn make_whole_region_identity(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
    ) -> Option<Formula>;
}

#[derive(Debug, Clone)]
pub struct ArrayHeap {
    address_sort: Sort,
}

impl ArrayHeap {
    pub fn new(address_sort: Sort) -> Self {
        Self { address_sort }
    }

    fn array(&self, fmgr: &FormulaManager, name: &str, sort: &Sort, index: u32) -> Formula {
        fmgr.make_array(name, index, self.address_sort.clone(), sort.clone())
    }
}

impl SmtHeap for ArrayHeap {
    fn make_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        values: &[(Formula, Formula)],
    ) -> Formula {
        let stored = values
            .iter()
            .fold(self.array(fmgr, name, sort, old_index), |a, (address, value)| {
                fmgr.make_store(a, address.clone(), value.clone())
            });
        fmgr.make_equal(self.array(fmgr, name, sort, new_index), stored)
    }

    fn make_quantified_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: Formula,
        condition: Formula,
        value: Formula,
    ) -> Formula {
        let new = fmgr.make_select(self.array(fmgr, name, sort, new_index), address.clone());
        let old = fmgr.make_select(self.array(fmgr, name, sort, old_index), address);
        fmgr.make_equal(new, fmgr.make_ite(condition, value, old))
    }

    fn make_identity_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: Formula,
    ) -> Formula {
        fmgr.make_equal(
            fmgr.make_select(self.array(fmgr, name, sort, new_index), address.clone()),
            fmgr.make_select(self.array(fmgr, name, sort, old_index), address),
        )
    }

    fn make_pointer_dereference(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        index: u32,
        address: Formula,
    ) -> Formula {
        fmgr.make_select(self.array(fmgr, name, sort, index), address)
    }

    fn make_whole_region_identity(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
    ) -> Option<Formula> {
        Some(fmgr.make_equal(
            self.array(fmgr, name, sort, new_index),
            self.array(fmgr, name, sort, old_index),
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UfHeap;

impl UfHeap {
    pub fn new() -> Self {
        UfHeap
    }
}

impl SmtHeap for UfHeap {
    fn make_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        _old_index: u32,
        new_index: u32,
        values: &[(Formula, Formula)],
    ) -> Formula {
        fmgr.make_and_all(values.iter().map(|(address, value)| {
            fmgr.make_equal(
                self.make_pointer_dereference(fmgr, name, sort, new_index, address.clone()),
                value.clone(),
            )
        }))
    }

    fn make_quantified_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: Formula,
        condition: Formula,
        value: Formula,
    ) -> Formula {
        let new = self.make_pointer_dereference(fmgr, name, sort, new_index, address.clone());
        let old = self.make_pointer_dereference(fmgr, name, sort, old_index, address);
        fmgr.make_equal(new, fmgr.make_ite(condition, value, old))
    }

    fn make_identity_pointer_assignment(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        old_index: u32,
        new_index: u32,
        address: Formula,
    ) -> Formula {
        fmgr.make_equal(
            self.make_pointer_dereference(fmgr, name, sort, new_index, address.clone()),
            self.make_pointer_dereference(fmgr, name, sort, old_index, address),
        )
    }

    fn make_pointer_dereference(
        &self,
        fmgr: &FormulaManager,
        name: &str,
        sort: &Sort,
        index: u32,
        address: Formula,
    ) -> Formula {
        fmgr.make_uf_application(name, index, sort.clone(), vec![address])
    }

    fn make_whole_region_identity(
        &self,
        _fmgr: &FormulaManager,
        _name: &str,
        _sort: &Sort,
        _old_index: u32,
        _new_index: u32,
    ) -> Option<Formula> {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn array_writes_chain_stores() {
        let fmgr = FormulaManager::new();
        let heap = ArrayHeap::new(Sort::BitVec(64));
        let a = fmgr.make_variable_without_ssa_index(Sort::BitVec(64), "__ADDRESS_OF_a");
        let five = fmgr.make_bv(32, 5);
        let f = heap.make_pointer_assignment(
            &fmgr,
            "*int32_t",
            &Sort::BitVec(32),
            1,
            2,
            &[(a.clone(), five.clone())],
        );
        let arr = |i| {
            fmgr.make_array("*int32_t", i, Sort::BitVec(64), Sort::BitVec(32))
        };
        assert_eq!(f, fmgr.make_equal(arr(2), fmgr.make_store(arr(1), a, five)));
    }

    #[test]
    fn uf_unconditional_quantified_write_is_plain_equality() {
        let fmgr = FormulaManager::new();
        let heap = UfHeap::new();
        let a = fmgr.make_variable_without_ssa_index(Sort::BitVec(64), "__ADDRESS_OF_a");
        let v = fmgr.make_bv(32, 7);
        let f = heap.make_quantified_pointer_assignment(
            &fmgr,
            "*int32_t",
            &Sort::BitVec(32),
            1,
            2,
            a.clone(),
            fmgr.make_true(),
            v.clone(),
        );
        assert_eq!(
            f,
            fmgr.make_equal(
                heap.make_pointer_dereference(&fmgr, "*int32_t", &Sort::BitVec(32), 2, a),
                v
            )
        );
        assert!(heap
            .make_whole_region_identity(&fmgr, "*int32_t", &Sort::BitVec(32), 1, 2)
            .is_none());
    }
}
