//! Writing simple (span) assignments to variables and memory regions.
//!
//! All values of one resolved batch of span assignments are read before any of them is written,
//! so that overlapping source and destination (`s = s`, union members) see the state before the
//! assignment. When an array index is unrolled without shared writes, each element forms its own
//! batch: element `i` is read after elements `0..i` have been written, which only matters if the
//! source and destination arrays overlap.

use crate::containers::unordered::UnorderedMap;
use crate::converter::EdgeEncoder;
use crate::error::{EncodingError, Result};
use crate::evaluate::Evaluated;
use crate::expr::Expression;
use crate::formula::{Formula, Sort};
use crate::log::*;
use crate::machine_model::Endianness;
use crate::quantifier::QuantifierPolicy;
use crate::region::MemoryRegion;
use crate::slice::{
    PartSpan, SliceAssignment, SliceBase, SliceExpression, SliceIndex, SliceModifier,
    SpanAssignment, SpanSource,
};
use crate::types::SimplifiedType;

/// A memory region written by a top-level assignment in shared mode
#[derive(Debug, Clone)]
pub(crate) struct WrittenRegion {
    pub region: MemoryRegion,
    pub sort: Sort,
    pub old_index: u32,
    pub new_index: u32,
}

/// Collects the memory regions written while encoding one top-level assignment.
///
/// In shared mode, all writes to a region within the assignment constrain the same new version
/// of it, and the cells that are not written are carried over afterwards by retention. Otherwise
/// (arrays, unrolled) every write produces its own version.
#[derive(Debug)]
pub(crate) struct WriteTracker {
    shared: bool,
    written: UnorderedMap<String, WrittenRegion>,
}

impl WriteTracker {
    pub fn new(shared: bool) -> Self {
        Self {
            shared,
            written: UnorderedMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }

    pub fn written(&self) -> impl Iterator<Item = &WrittenRegion> {
        self.written.values()
    }
}

impl<'a> EdgeEncoder<'a> {
    /// Assign `rhs` (or a nondeterministic value) to the object `lhs` denotes
    pub fn assign(
        &mut self,
        lhs: &Expression,
        rhs: Option<SliceExpression>,
        use_old_ssa_indices: bool,
    ) -> Result<Formula> {
        self.handle_slice_assignments(
            &[SliceAssignment::new(SliceExpression::of_lvalue(lhs.clone()), rhs)],
            QuantifierPolicy::FromOptions,
            use_old_ssa_indices,
        )
    }

    /// Encode top-level assignments, in order. With `use_old_ssa_indices`, the written memory
    /// is constrained in its current version instead of a new one (used for initializing objects
    /// that have just come into existence).
    pub fn handle_slice_assignments(
        &mut self,
        assignments: &[SliceAssignment],
        policy: QuantifierPolicy,
        use_old_ssa_indices: bool,
    ) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let mut result = vec![];
        for assignment in assignments {
            conv.shutdown.shutdown_if_necessary()?;
            let spans = self.decompose(assignment)?;
            trace!("Decomposed assignment"; "spans" => spans.len());
            let mut tracker = WriteTracker::new(policy.shares_writes(&conv.options));
            let written =
                self.quantify_assignments(spans, policy, &mut tracker, use_old_ssa_indices)?;
            let retained = self.finish_writes(&assignment.lhs, tracker)?;
            result.push(fmgr.make_and(written, retained));
        }
        Ok(fmgr.make_and_all(result))
    }

    /// The location a slice denotes
    pub(crate) fn resolve_slice(&mut self, slice: &SliceExpression) -> Result<Evaluated> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let (mut location, mut ty) = match &slice.base {
            SliceBase::Value { .. } => {
                return Err(EncodingError::unrecognized("assignment to a computed value"))
            }
            SliceBase::Expression(e) => {
                let location = match self.evaluate(e)? {
                    Evaluated::Value(_) => {
                        return Err(EncodingError::unrecognized(format!(
                            "{:?} is not an lvalue",
                            e
                        )))
                    }
                    l => l,
                };
                (location, conv.types.simplify(e.expression_type()))
            }
        };
        let bits = conv.types.machine_model().pointer_bits();
        for m in slice.modifiers.iter() {
            let next = self.apply_modifier(&ty, m)?;
            location = match (location, m) {
                (Evaluated::Nondet, _) | (Evaluated::Value(_), _) => Evaluated::Nondet,
                (Evaluated::UnaliasedLocation { name }, SliceModifier::Field(f)) => {
                    Evaluated::UnaliasedLocation {
                        name: format!("{}${}", name, f),
                    }
                }
                (Evaluated::UnaliasedLocation { name }, SliceModifier::Index(_)) => {
                    return Err(EncodingError::unrecognized(format!(
                        "array {} is not kept in memory",
                        name
                    )))
                }
                (Evaluated::AliasedLocation { address, .. }, SliceModifier::Field(f)) => {
                    match conv.types.member(&ty, f)?.byte_offset() {
                        Some(offset) => Evaluated::AliasedLocation {
                            address: fmgr
                                .make_plus(address, fmgr.make_bv(bits, offset as i128)),
                            field: Some((ty.clone(), f.clone())),
                        },
                        None => {
                            conv.log_once.warn_once(format!(
                                "Bit-field {} of {} in memory is not tracked",
                                f, ty
                            ));
                            Evaluated::Nondet
                        }
                    }
                }
                (Evaluated::AliasedLocation { address, field }, SliceModifier::Index(index)) => {
                    let index = match index {
                        SliceIndex::Concrete(i) => fmgr.make_bv(bits, *i as i128),
                        SliceIndex::Encoded(f) => f.clone(),
                        SliceIndex::Variable(v) => {
                            return Err(EncodingError::unrecognized(format!(
                                "index variable {:?} was never resolved",
                                v
                            )))
                        }
                    };
                    let element_size = conv.types.size_of(&next)?;
                    Evaluated::AliasedLocation {
                        address: fmgr.make_plus(
                            address,
                            fmgr.make_multiply(index, fmgr.make_bv(bits, element_size as i128)),
                        ),
                        field,
                    }
                }
            };
            ty = next;
        }
        Ok(location)
    }

    /// The current contents of `slice`, of type `ty`. `None` if they are not modelled.
    pub(crate) fn read_slice(
        &mut self,
        slice: &SliceExpression,
        ty: &SimplifiedType,
    ) -> Result<Option<Formula>> {
        match (&slice.base, slice.modifiers.is_empty()) {
            (SliceBase::Value { formula, .. }, true) => Ok(Some(formula.clone())),
            (SliceBase::Value { .. }, false) => Err(EncodingError::unrecognized(
                "part of a computed value used as source",
            )),
            (SliceBase::Expression(e), true) => {
                let evaluated = self.evaluate(e)?;
                self.read_evaluated(evaluated, ty)
            }
            (SliceBase::Expression(_), false) => {
                let location = self.resolve_slice(slice)?;
                self.read_evaluated(location, ty)
            }
        }
    }

    /// A source value, converted as the source asks, together with its final type
    fn read_source(&mut self, source: &SpanSource) -> Result<Option<(Formula, SimplifiedType)>> {
        Ok(match self.read_slice(&source.slice, &source.ty)? {
            None => None,
            Some(v) => Some(match &source.cast_to {
                Some(to) => (self.make_cast(v, &source.ty, to), to.clone()),
                None => (v, source.ty.decayed()),
            }),
        })
    }

    /// Position of the lowest value bit of the `size` bits at memory bit offset `offset` of an
    /// object `width` bits wide
    fn value_bit_position(&self, offset: u64, size: u64, width: u64) -> u64 {
        match self.conv.types.machine_model().endianness {
            Endianness::Little => offset,
            Endianness::Big => width.saturating_sub(offset + size),
        }
    }

    /// `base` with the `size` bits starting at value bit `low` replaced by `piece`
    fn insert_bits(&self, base: Formula, piece: Formula, low: u64, size: u64, width: u64) -> Formula {
        let fmgr = &self.conv.fmgr;
        if size >= width {
            return piece;
        }
        let mut result = piece;
        if low > 0 {
            result = fmgr.make_concat(result, fmgr.make_extract(base.clone(), low as u32 - 1, 0));
        }
        if low + size < width {
            result = fmgr.make_concat(
                fmgr.make_extract(base, width as u32 - 1, (low + size) as u32),
                result,
            );
        }
        result
    }

    /// The value a span assignment stores, `None` if it is entirely nondeterministic
    fn span_value(&mut self, a: &SpanAssignment, location: &Evaluated) -> Result<Option<Formula>> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let target = &a.target_type;
        let width = conv.types.bit_size_of(target)?;

        if let [only] = a.rhs.as_slice() {
            if only.span == PartSpan::whole(width) {
                let source = match &only.source {
                    None => return Ok(None),
                    Some(s) => s,
                };
                match self.read_source(source)? {
                    None => return Ok(None),
                    Some((v, ty)) => {
                        if let Some(v) = self.make_value_reinterpretation(v, &ty, target)? {
                            return Ok(Some(v));
                        }
                    }
                }
            }
        }

        // Assemble the value bit by bit; bits no span covers keep their old contents
        let covered: u64 = a.rhs.iter().map(|r| r.span.bit_size).sum();
        let mut bits = if covered < width {
            match self.read_evaluated(location.clone(), target)? {
                Some(old) => self.to_bits(old, target),
                None => self.make_nondet(Sort::BitVec(width as u32)),
            }
        } else {
            fmgr.make_bv(width as u32, 0)
        };
        for r in a.rhs.iter() {
            let size = r.span.bit_size;
            if size == 0 {
                continue;
            }
            let source = match &r.source {
                Some(s) => self.read_source(s)?,
                None => None,
            };
            let piece = match source {
                None => self.make_nondet(Sort::BitVec(size as u32)),
                Some((v, ty)) => {
                    let source_width = conv.types.bit_size_of(&ty)?;
                    let v = self.to_bits(v, &ty);
                    let low = self.value_bit_position(r.span.rhs_bit_offset, size, source_width);
                    if low == 0 && size == source_width {
                        v
                    } else if low + size <= source_width {
                        fmgr.make_extract(v, (low + size - 1) as u32, low as u32)
                    } else {
                        self.make_nondet(Sort::BitVec(size as u32))
                    }
                }
            };
            let low = self.value_bit_position(r.span.lhs_bit_offset, size, width);
            bits = self.insert_bits(bits, piece, low, size, width);
        }
        Ok(Some(self.from_bits(bits, target)))
    }

    /// Read all values of `batch`, then write them, under `condition`
    pub(crate) fn resolve_and_write(
        &mut self,
        batch: &[SpanAssignment],
        condition: Formula,
        quantified: bool,
        tracker: &mut WriteTracker,
        use_old_ssa_indices: bool,
    ) -> Result<Formula> {
        let mut resolved = Vec::with_capacity(batch.len());
        for a in batch {
            self.conv.shutdown.shutdown_if_necessary()?;
            let location = self.resolve_slice(&a.lhs)?;
            let value = self.span_value(a, &location)?;
            resolved.push((a, location, value));
        }
        let mut result = vec![];
        for (a, location, value) in resolved {
            result.push(self.write(
                location,
                &a.target_type,
                value,
                condition.clone(),
                quantified,
                tracker,
                use_old_ssa_indices,
            )?);
        }
        Ok(self.conv.fmgr.make_and_all(result))
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        location: Evaluated,
        ty: &SimplifiedType,
        value: Option<Formula>,
        condition: Formula,
        quantified: bool,
        tracker: &mut WriteTracker,
        use_old_ssa_indices: bool,
    ) -> Result<Formula> {
        let conv = self.conv;
        let fmgr = &conv.fmgr;
        let sort = conv.types.sort_of(ty)?;
        match location {
            Evaluated::Nondet => Ok(fmgr.make_true()),
            Evaluated::Value(v) => Err(EncodingError::unrecognized(format!(
                "assignment to value {}",
                v
            ))),
            Evaluated::UnaliasedLocation { name } => {
                if quantified {
                    return Err(EncodingError::unrecognized(format!(
                        "quantified assignment to variable {}",
                        name
                    )));
                }
                if condition.is_true() {
                    let index = self.ssa.make_fresh_index(&name, ty);
                    return Ok(match value {
                        Some(v) => fmgr.make_equal(fmgr.make_variable(sort, &name, index), v),
                        None => fmgr.make_true(),
                    });
                }
                let old_index = self.ssa.get_index(&name, ty);
                let new_index = self.ssa.make_fresh_index(&name, ty);
                let old = fmgr.make_variable(sort.clone(), &name, old_index);
                let new = fmgr.make_variable(sort, &name, new_index);
                Ok(match value {
                    Some(v) => fmgr.make_equal(new, fmgr.make_ite(condition, v, old)),
                    None => fmgr.make_or(condition, fmgr.make_equal(new, old)),
                })
            }
            Evaluated::AliasedLocation { address, field } => {
                let region = conv.regions.region_for(ty, field.as_ref());
                let name = region.heap_name();
                if use_old_ssa_indices {
                    let index = self.ssa.get_index(&name, region.cell_type());
                    return Ok(match value {
                        Some(v) => fmgr.make_implies(
                            condition,
                            fmgr.make_equal(
                                conv.heap
                                    .make_pointer_dereference(fmgr, &name, &sort, index, address),
                                v,
                            ),
                        ),
                        None => fmgr.make_true(),
                    });
                }
                if tracker.shared {
                    let written = match tracker.written.get(&name) {
                        Some(w) => w.clone(),
                        None => {
                            let w = WrittenRegion {
                                old_index: self.ssa.get_index(&name, region.cell_type()),
                                new_index: self.ssa.fresh_index(&name),
                                sort: sort.clone(),
                                region,
                            };
                            tracker.written.insert(name.clone(), w.clone());
                            w
                        }
                    };
                    return Ok(match value {
                        Some(v) => conv.heap.make_quantified_pointer_assignment(
                            fmgr,
                            &name,
                            &sort,
                            written.old_index,
                            written.new_index,
                            address,
                            condition,
                            v,
                        ),
                        None if condition.is_true() => fmgr.make_true(),
                        None => fmgr.make_or(
                            condition,
                            conv.heap.make_identity_pointer_assignment(
                                fmgr,
                                &name,
                                &sort,
                                written.old_index,
                                written.new_index,
                                address,
                            ),
                        ),
                    });
                }
                let old_index = self.ssa.get_index(&name, region.cell_type());
                let new_index = self.ssa.make_fresh_index(&name, region.cell_type());
                let value = match value {
                    Some(v) => v,
                    None => self.make_nondet(sort.clone()),
                };
                let assignment = conv.heap.make_pointer_assignment(
                    fmgr,
                    &name,
                    &sort,
                    old_index,
                    new_index,
                    &[(address, value)],
                );
                if condition.is_true() {
                    return Ok(assignment);
                }
                let identity = conv
                    .heap
                    .make_whole_region_identity(fmgr, &name, &sort, old_index, new_index)
                    .unwrap_or_else(|| fmgr.make_true());
                Ok(fmgr.make_or(
                    fmgr.make_and(condition.clone(), assignment),
                    fmgr.make_and(fmgr.make_not(condition), identity),
                ))
            }
        }
    }
}
