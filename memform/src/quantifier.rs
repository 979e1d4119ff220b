//! Elimination of array index variables from decomposed assignments.
//!
//! An index variable stands for all elements of an array at once. Before writing, it is replaced
//! either by a universally quantified solver variable (guarded by the array length) or by every
//! concrete index up to the unrolling bound.

use crate::assignment::WriteTracker;
use crate::converter::EdgeEncoder;
use crate::error::Result;
use crate::formula::{unique_name, Formula};
use crate::log::*;
use crate::options::EncodingOptions;
use crate::slice::{IndexVariable, SliceIndex, SpanAssignment};
use crate::types::ArrayLength;

/// Which elimination to use for index variables
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantifierPolicy {
    /// Quantify if the converter is configured to, unroll otherwise
    FromOptions,
    Encode,
    Unroll,
    /// Quantify over arrays whose length is not a literal, unroll the others
    EncodeSymbolicOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    Encode,
    Unroll,
}

impl QuantifierPolicy {
    fn strategy(&self, options: &EncodingOptions, length: &ArrayLength) -> Strategy {
        let encode = match self {
            QuantifierPolicy::FromOptions => options.use_quantifiers_on_arrays,
            QuantifierPolicy::Encode => true,
            QuantifierPolicy::Unroll => false,
            QuantifierPolicy::EncodeSymbolicOnly => !matches!(length, ArrayLength::Literal(_)),
        };
        // Without a length there is nothing to guard the quantifier with
        if encode && *length != ArrayLength::Unknown {
            Strategy::Encode
        } else {
            Strategy::Unroll
        }
    }

    /// Whether writes may happen under a quantifier, in which case all writes of one assignment
    /// to a region share a single new version of it
    pub(crate) fn shares_writes(&self, options: &EncodingOptions) -> bool {
        let may_encode = match self {
            QuantifierPolicy::FromOptions => options.use_quantifiers_on_arrays,
            QuantifierPolicy::Unroll => false,
            QuantifierPolicy::Encode | QuantifierPolicy::EncodeSymbolicOnly => true,
        };
        !options.use_arrays_for_heap || may_encode
    }
}

impl<'a> EdgeEncoder<'a> {
    pub(crate) fn quantify_assignments(
        &mut self,
        batch: Vec<SpanAssignment>,
        policy: QuantifierPolicy,
        tracker: &mut WriteTracker,
        use_old_ssa_indices: bool,
    ) -> Result<Formula> {
        let condition = self.conv.fmgr.make_true();
        self.quantify(batch, policy, condition, false, tracker, use_old_ssa_indices)
    }

    fn quantify(
        &mut self,
        batch: Vec<SpanAssignment>,
        policy: QuantifierPolicy,
        condition: Formula,
        quantified: bool,
        tracker: &mut WriteTracker,
        use_old_ssa_indices: bool,
    ) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        conv.shutdown.shutdown_if_necessary()?;

        let var = match batch
            .iter()
            .flat_map(|a| a.index_variables())
            .next()
            .cloned()
        {
            Some(v) => v,
            None => {
                return self.resolve_and_write(
                    &batch,
                    condition,
                    quantified,
                    tracker,
                    use_old_ssa_indices,
                )
            }
        };
        let (inner, outer): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|a| a.index_variables().contains(&&var));
        let rest = self.quantify(
            outer,
            policy,
            condition.clone(),
            quantified,
            tracker,
            use_old_ssa_indices,
        )?;

        let eliminated = match policy.strategy(&conv.options, var.length()) {
            Strategy::Encode => {
                let q = fmgr.make_variable_without_ssa_index(
                    conv.types.pointer_sort(),
                    &unique_name("__quantifier_"),
                );
                let guard = self.index_guard(q.clone(), &var)?;
                let body = self.quantify(
                    substitute(&inner, &var, &SliceIndex::Encoded(q.clone())),
                    policy,
                    fmgr.make_and(condition, guard),
                    true,
                    tracker,
                    use_old_ssa_indices,
                )?;
                fmgr.make_forall(vec![q], body)
            }
            Strategy::Unroll => {
                let n = self.unroll_count(&var);
                trace!("Unrolling array assignment"; "elements" => n);
                let bits = conv.types.machine_model().pointer_bits();
                let mut parts = vec![];
                for i in 0..n {
                    conv.shutdown.shutdown_if_necessary()?;
                    let guard = self.index_guard(fmgr.make_bv(bits, i as i128), &var)?;
                    parts.push(self.quantify(
                        substitute(&inner, &var, &SliceIndex::Concrete(i)),
                        policy,
                        fmgr.make_and(condition.clone(), guard),
                        quantified,
                        tracker,
                        use_old_ssa_indices,
                    )?);
                }
                fmgr.make_and_all(parts)
            }
        };
        Ok(fmgr.make_and(rest, eliminated))
    }

    /// `index` lies within the array `var` ranges over
    fn index_guard(&mut self, index: Formula, var: &IndexVariable) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let bits = conv.types.machine_model().pointer_bits();
        match var.length() {
            ArrayLength::Literal(n) => {
                Ok(fmgr.make_less_than(index, fmgr.make_bv(bits, *n as i128), false))
            }
            ArrayLength::Symbolic(e) => {
                let from = conv.types.simplify_operand(e.expression_type());
                let length = self.evaluate_value(e)?;
                let length = self.make_cast(length, &from, &conv.types.size_type());
                Ok(fmgr.make_less_than(index, length, false))
            }
            ArrayLength::Unknown => Ok(fmgr.make_true()),
        }
    }

    /// Number of elements to unroll; truncation and guessed lengths are soundness warnings
    fn unroll_count(&self, var: &IndexVariable) -> u64 {
        let options = &self.conv.options;
        match var.length() {
            ArrayLength::Literal(n) => {
                let (bound, truncated) = options.unroll_bound(*n);
                if truncated {
                    self.conv.log_once.warn_once(format!(
                        "Assignments to arrays of length {} are unrolled only up to {} elements",
                        n, bound
                    ));
                }
                bound
            }
            ArrayLength::Symbolic(_) => {
                self.conv.log_once.warn_once(format!(
                    "Assignments to variable length arrays are unrolled up to {} elements",
                    options.default_array_length
                ));
                options.default_array_length
            }
            ArrayLength::Unknown => {
                self.conv.log_once.warn_once(format!(
                    "Assignments to arrays of unknown length are unrolled up to {} elements",
                    options.default_array_length
                ));
                options.default_array_length
            }
        }
    }
}

fn substitute(
    batch: &[SpanAssignment],
    var: &IndexVariable,
    by: &SliceIndex,
) -> Vec<SpanAssignment> {
    batch.iter().map(|a| a.substitute(var, by)).collect()
}
