//! Retention constraints: the cells of a region that an assignment did not write keep their
//! contents in the new version of the region.
//!
//! The written range is described by a [`PointerTargetPattern`] derived from the left-hand side
//! and by its start address and size. Cells the pattern certainly covers need no constraint,
//! cells it certainly misses are retained unconditionally, and for all others retention is
//! conditional on the cell lying outside the written range.

use crate::assignment::{WriteTracker, WrittenRegion};
use crate::converter::EdgeEncoder;
use crate::error::Result;
use crate::evaluate::Evaluated;
use crate::expr::Expression;
use crate::formula::{unique_name, Formula};
use crate::log::*;
use crate::pointer_target_set::{PatternPrecision, PointerTargetPattern};
use crate::slice::{SliceBase, SliceExpression, SliceIndex, SliceModifier};
use crate::types::{ArrayLength, SimplifiedType};

/// Where an assignment writes
struct WrittenRange {
    pattern: PointerTargetPattern,
    start: Option<Formula>,
    /// In bytes; `None` if the range reaches to the end of the object
    size: Option<u64>,
    /// The range is a single scalar cell
    scalar: bool,
}

impl<'a> EdgeEncoder<'a> {
    /// Add retention for every region written in shared mode, and advance the regions' SSA
    /// indices to their new versions
    pub(crate) fn finish_writes(
        &mut self,
        lhs: &SliceExpression,
        tracker: WriteTracker,
    ) -> Result<Formula> {
        let conv = self.conv;
        if tracker.is_empty() {
            return Ok(conv.fmgr.make_true());
        }
        let prefix = lhs.concrete_prefix();
        let ty = self.slice_type(&prefix)?;
        let range = WrittenRange {
            pattern: self.pattern_for_slice(&prefix)?,
            start: match self.resolve_slice(&prefix)? {
                Evaluated::AliasedLocation { address, .. } => Some(address),
                _ => None,
            },
            size: self.written_size(&ty)?,
            scalar: ty.is_scalar_or_pointer(),
        };
        debug!("Retaining unwritten cells";
            "precision" => ?range.pattern.precision(),
            "size" => ?range.size);

        let mut result = vec![];
        for w in tracker.written() {
            result.push(self.make_retention(w, &range)?);
            self.ssa
                .set_index(&w.region.heap_name(), w.region.cell_type(), w.new_index);
        }
        Ok(conv.fmgr.make_and_all(result))
    }

    fn written_size(&self, ty: &SimplifiedType) -> Result<Option<u64>> {
        match ty {
            SimplifiedType::Array(element, ArrayLength::Literal(n)) => {
                Ok(self.written_size(element)?.map(|size| size * n))
            }
            SimplifiedType::Array(..) => Ok(None),
            t => Ok(Some(self.conv.types.size_of(t)?)),
        }
    }

    /// `address` lies in the written range
    fn in_range(&self, address: Formula, start: Formula, size: Option<u64>) -> Formula {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let after_start = fmgr.make_less_or_equal(start.clone(), address.clone(), false);
        match size {
            Some(size) => {
                let bits = conv.types.machine_model().pointer_bits();
                let end = fmgr.make_plus(start, fmgr.make_bv(bits, size as i128));
                fmgr.make_and(after_start, fmgr.make_less_than(address, end, false))
            }
            None => after_start,
        }
    }

    fn make_retention(&self, w: &WrittenRegion, range: &WrittenRange) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let name = w.region.heap_name();
        let identity = |address: Formula| {
            conv.heap.make_identity_pointer_assignment(
                fmgr,
                &name,
                &w.sort,
                w.old_index,
                w.new_index,
                address,
            )
        };

        if conv.options.use_arrays_for_heap || conv.options.use_quantifiers_on_arrays {
            let start = match &range.start {
                Some(s) => s.clone(),
                None => return Ok(fmgr.make_true()),
            };
            let a = fmgr.make_variable_without_ssa_index(
                conv.types.pointer_sort(),
                &unique_name("__quantifier_"),
            );
            let body = fmgr.make_or(
                self.in_range(a.clone(), start, range.size),
                identity(a.clone()),
            );
            return Ok(fmgr.make_forall(vec![a], body));
        }

        let exact = range.pattern.precision() == PatternPrecision::Exact;
        let mut result = vec![];
        for target in self.pts.snapshot().targets(&w.region) {
            conv.shutdown.shutdown_if_necessary()?;
            let address = target.address(conv);
            if !range.pattern.may_cover(target, range.size) {
                result.push(identity(address));
                continue;
            }
            if exact {
                continue;
            }
            let start = match &range.start {
                Some(s) => s.clone(),
                None => continue,
            };
            let written = if range.scalar {
                fmgr.make_equal(address.clone(), start)
            } else {
                self.in_range(address.clone(), start, range.size)
            };
            result.push(fmgr.make_or(written, identity(address)));
        }
        Ok(fmgr.make_and_all(result))
    }

    /// What is known statically about the location of a slice with concrete indices
    fn pattern_for_slice(&self, slice: &SliceExpression) -> Result<PointerTargetPattern> {
        let (mut pattern, mut ty) = match &slice.base {
            SliceBase::Value { .. } => return Ok(PointerTargetPattern::any()),
            SliceBase::Expression(e) => (
                self.pattern_for_expression(e)?,
                self.conv.types.simplify(e.expression_type()),
            ),
        };
        for m in slice.modifiers.iter() {
            let next = self.apply_modifier(&ty, m)?;
            pattern = self.refine_pattern(pattern, &ty, m)?;
            ty = next;
        }
        // Containers only identify single cells
        if !ty.is_scalar_or_pointer() {
            pattern.container = None;
        }
        Ok(pattern)
    }

    fn pattern_for_expression(&self, e: &Expression) -> Result<PointerTargetPattern> {
        let types = &self.conv.types;
        match e {
            Expression::Id { name, .. } if self.pts.snapshot().is_base(name) => {
                Ok(PointerTargetPattern::exact(name.clone(), 0))
            }
            Expression::FieldRef {
                owner,
                field,
                is_pointer_dereference,
                ..
            } => {
                let (pattern, owner_type) = if *is_pointer_dereference {
                    let pointer = types.simplify_operand(owner.expression_type());
                    match pointer.element_type() {
                        Some(t) => (PointerTargetPattern::any(), t.clone()),
                        None => return Ok(PointerTargetPattern::any()),
                    }
                } else {
                    (
                        self.pattern_for_expression(owner)?,
                        types.simplify(owner.expression_type()),
                    )
                };
                self.refine_pattern(pattern, &owner_type, &SliceModifier::Field(field.clone()))
            }
            Expression::Subscript { array, index, .. } => {
                let array_type = types.simplify(array.expression_type());
                if !matches!(array_type, SimplifiedType::Array(..)) {
                    return Ok(PointerTargetPattern::any());
                }
                let pattern = self.pattern_for_expression(array)?;
                match index.constant_value() {
                    Some(i) if i >= 0 => self.refine_pattern(
                        pattern,
                        &array_type,
                        &SliceModifier::Index(SliceIndex::Concrete(i as u64)),
                    ),
                    _ => Ok(PointerTargetPattern {
                        base: pattern.base,
                        offset: None,
                        container: None,
                    }),
                }
            }
            Expression::Cast { operand, .. } => self.pattern_for_expression(operand),
            _ => Ok(PointerTargetPattern::any()),
        }
    }

    /// The pattern of part `m` of an object of type `ty` matching `pattern`
    fn refine_pattern(
        &self,
        pattern: PointerTargetPattern,
        ty: &SimplifiedType,
        m: &SliceModifier,
    ) -> Result<PointerTargetPattern> {
        let types = &self.conv.types;
        Ok(match m {
            SliceModifier::Field(name) => match types.member(ty, name)?.byte_offset() {
                Some(offset) => PointerTargetPattern {
                    base: pattern.base,
                    offset: pattern.offset.map(|o| o + offset),
                    container: Some((ty.clone(), offset)),
                },
                None => PointerTargetPattern {
                    base: pattern.base,
                    offset: None,
                    container: None,
                },
            },
            SliceModifier::Index(SliceIndex::Concrete(i)) => {
                let element = self.apply_modifier(ty, m)?;
                let delta = i * types.size_of(&element)?;
                PointerTargetPattern {
                    base: pattern.base,
                    offset: pattern.offset.map(|o| o + delta),
                    container: pattern.container.map(|(c, o)| (c, o + delta)),
                }
            }
            SliceModifier::Index(_) => PointerTargetPattern {
                base: pattern.base,
                offset: None,
                container: None,
            },
        })
    }
}
