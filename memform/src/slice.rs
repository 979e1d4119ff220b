//! Decomposition of aggregate assignments into assignments of scalar cells.
//!
//! An assignment `lhs = rhs` whose sides are structs, unions or arrays is expanded into
//! [`SpanAssignment`]s, one per scalar leaf of the left-hand side. Each leaf lists which of its
//! bits come from which bits of which right-hand side [`SliceExpression`]. Arrays are not
//! expanded element by element; instead a single [`IndexVariable`] stands for "every element",
//! and is later eliminated by [`crate::quantifier`].

use crate::containers::unordered::{UnorderedMap, UnorderedSet};
use crate::converter::EdgeEncoder;
use crate::error::{EncodingError, Result};
use crate::expr::Expression;
use crate::formula::{next_unique_id, Formula};
use crate::types::{ArrayLength, CType, SimplifiedType};

/// One quantified position of an array, standing for all its elements at once. Identity is by
/// creation: two index variables are the same only if they were made by the same decomposition
/// step.
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct IndexVariable {
    id: usize,
    length: ArrayLength,
}

impl IndexVariable {
    pub fn new(length: ArrayLength) -> Self {
        Self {
            id: next_unique_id(),
            length,
        }
    }

    pub fn length(&self) -> &ArrayLength {
        &self.length
    }
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum SliceIndex {
    /// Not yet resolved
    Variable(IndexVariable),
    /// Resolved by unrolling
    Concrete(u64),
    /// Resolved to a solver variable (or any other index formula)
    Encoded(Formula),
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum SliceModifier {
    Field(String),
    Index(SliceIndex),
}

#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub enum SliceBase {
    Expression(Expression),
    /// An already computed value; only usable as a source
    Value { formula: Formula, ty: SimplifiedType },
}

/// The location reached by applying `modifiers`, in order, to `base`
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct SliceExpression {
    pub base: SliceBase,
    pub modifiers: Vec<SliceModifier>,
}

impl SliceExpression {
    pub fn of(e: Expression) -> Self {
        Self {
            base: SliceBase::Expression(e),
            modifiers: vec![],
        }
    }

    /// The slice of an lvalue, with member accesses through non-pointer owners turned into field
    /// modifiers and constant subscripts of arrays into concrete indices. Writes to union members
    /// are only recognized in this form.
    pub fn of_lvalue(e: Expression) -> Self {
        match e {
            Expression::FieldRef {
                owner,
                field,
                is_pointer_dereference: false,
                ..
            } => Self::of_lvalue(*owner).field(&field),
            Expression::Subscript { array, index, ty }
                if matches!(array.expression_type(), CType::Array(..)) =>
            {
                match index.constant_value() {
                    Some(i) if i >= 0 => {
                        Self::of_lvalue(*array).index(SliceIndex::Concrete(i as u64))
                    }
                    _ => Self::of(Expression::Subscript { array, index, ty }),
                }
            }
            e => Self::of(e),
        }
    }

    pub fn value(formula: Formula, ty: SimplifiedType) -> Self {
        Self {
            base: SliceBase::Value { formula, ty },
            modifiers: vec![],
        }
    }

    pub fn with(&self, m: SliceModifier) -> Self {
        let mut r = self.clone();
        r.modifiers.push(m);
        r
    }

    pub fn field(&self, name: &str) -> Self {
        self.with(SliceModifier::Field(name.to_owned()))
    }

    pub fn index(&self, index: SliceIndex) -> Self {
        self.with(SliceModifier::Index(index))
    }

    pub fn index_variables(&self) -> impl Iterator<Item = &IndexVariable> {
        self.modifiers.iter().filter_map(|m| match m {
            SliceModifier::Index(SliceIndex::Variable(v)) => Some(v),
            _ => None,
        })
    }

    /// Whether every index is a constant
    pub fn is_concrete(&self) -> bool {
        self.modifiers.iter().all(|m| {
            matches!(
                m,
                SliceModifier::Field(_) | SliceModifier::Index(SliceIndex::Concrete(_))
            )
        })
    }

    /// The longest prefix whose indices are all constants
    pub fn concrete_prefix(&self) -> SliceExpression {
        SliceExpression {
            base: self.base.clone(),
            modifiers: self
                .modifiers
                .iter()
                .take_while(|m| {
                    matches!(
                        m,
                        SliceModifier::Field(_) | SliceModifier::Index(SliceIndex::Concrete(_))
                    )
                })
                .cloned()
                .collect(),
        }
    }

    pub fn substitute(&self, var: &IndexVariable, by: &SliceIndex) -> Self {
        SliceExpression {
            base: self.base.clone(),
            modifiers: self
                .modifiers
                .iter()
                .map(|m| match m {
                    SliceModifier::Index(SliceIndex::Variable(v)) if v == var => {
                        SliceModifier::Index(by.clone())
                    }
                    m => m.clone(),
                })
                .collect(),
        }
    }
}

/// Bits `[lhs_bit_offset, lhs_bit_offset + bit_size)` of a leaf are bits
/// `[rhs_bit_offset, rhs_bit_offset + bit_size)` of a source. Offsets count from the lowest
/// address.
#[derive(PartialEq, Eq, Debug, Hash, Clone, Copy)]
pub struct PartSpan {
    pub lhs_bit_offset: u64,
    pub rhs_bit_offset: u64,
    pub bit_size: u64,
}

impl PartSpan {
    pub fn whole(bit_size: u64) -> Self {
        Self {
            lhs_bit_offset: 0,
            rhs_bit_offset: 0,
            bit_size,
        }
    }
}

/// The source of a span: the value of `slice` (of type `ty`), converted to `cast_to` if given
#[derive(PartialEq, Eq, Debug, Hash, Clone)]
pub struct SpanSource {
    pub slice: SliceExpression,
    pub ty: SimplifiedType,
    pub cast_to: Option<SimplifiedType>,
}

/// A span and where its bits come from; no source means nondeterministic bits
#[derive(PartialEq, Eq, Debug, Hash, Clone)]
pub struct SpanRhs {
    pub span: PartSpan,
    pub source: Option<SpanSource>,
}

/// An assignment to a single scalar cell. Bits not covered by any span keep their old value.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SpanAssignment {
    pub lhs: SliceExpression,
    pub target_type: SimplifiedType,
    pub rhs: Vec<SpanRhs>,
}

impl SpanAssignment {
    pub fn index_variables(&self) -> Vec<&IndexVariable> {
        let mut r: Vec<&IndexVariable> = self.lhs.index_variables().collect();
        for s in self.rhs.iter().filter_map(|r| r.source.as_ref()) {
            r.extend(s.slice.index_variables());
        }
        r
    }

    pub fn substitute(&self, var: &IndexVariable, by: &SliceIndex) -> Self {
        SpanAssignment {
            lhs: self.lhs.substitute(var, by),
            target_type: self.target_type.clone(),
            rhs: self
                .rhs
                .iter()
                .map(|r| SpanRhs {
                    span: r.span,
                    source: r.source.as_ref().map(|s| SpanSource {
                        slice: s.slice.substitute(var, by),
                        ty: s.ty.clone(),
                        cast_to: s.cast_to.clone(),
                    }),
                })
                .collect(),
        }
    }
}

/// A top-level assignment; no right-hand side means a nondeterministic value
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SliceAssignment {
    pub lhs: SliceExpression,
    pub rhs: Option<SliceExpression>,
}

impl SliceAssignment {
    pub fn new(lhs: SliceExpression, rhs: Option<SliceExpression>) -> Self {
        Self { lhs, rhs }
    }
}

/// What the part of the left-hand side currently being decomposed is assigned from
#[derive(Debug, Clone)]
enum RhsSource {
    Nondet,
    /// A slice of the same type (or, at scalar leaves, any scalar type)
    Slice {
        slice: SliceExpression,
        ty: SimplifiedType,
    },
    /// A scalar assigned to every leaf
    Broadcast {
        slice: SliceExpression,
        ty: SimplifiedType,
    },
    /// An aggregate of a different type, positioned `bit_offset` bits from the start of the current
    /// left-hand part
    Opaque {
        slice: SliceExpression,
        ty: SimplifiedType,
        bit_offset: i64,
    },
}

/// A scalar leaf of a type: modifiers reaching it, its type and its bit offset
type Leaf = (Vec<SliceModifier>, SimplifiedType, u64);

impl<'a> EdgeEncoder<'a> {
    /// The type of the location (or value) a slice denotes
    pub fn slice_type(&self, slice: &SliceExpression) -> Result<SimplifiedType> {
        let mut ty = match &slice.base {
            SliceBase::Expression(e) => self.conv.types.simplify(e.expression_type()),
            SliceBase::Value { ty, .. } => ty.clone(),
        };
        for m in slice.modifiers.iter() {
            ty = self.apply_modifier(&ty, m)?;
        }
        Ok(ty)
    }

    pub(crate) fn apply_modifier(&self, ty: &SimplifiedType, m: &SliceModifier) -> Result<SimplifiedType> {
        match (m, ty) {
            (SliceModifier::Field(name), _) => Ok(self.conv.types.member(ty, name)?.ty),
            (SliceModifier::Index(_), SimplifiedType::Array(e, _)) => Ok((**e).clone()),
            (SliceModifier::Index(_), _) => Err(EncodingError::unrecognized(format!(
                "subscript of non-array type {}",
                ty
            ))),
        }
    }

    /// Bit offset of the part reached by `modifiers` from an object of type `ty`, if all indices
    /// are constants
    fn concrete_bit_offset(
        &self,
        ty: &SimplifiedType,
        modifiers: &[SliceModifier],
    ) -> Result<Option<u64>> {
        let mut ty = ty.clone();
        let mut offset = 0;
        for m in modifiers {
            match m {
                SliceModifier::Field(name) => offset += self.conv.types.bit_offset_of(&ty, name)?,
                SliceModifier::Index(SliceIndex::Concrete(i)) => {
                    let element = self.apply_modifier(&ty, m)?;
                    offset += i * self.conv.types.bit_size_of(&element)?;
                }
                SliceModifier::Index(_) => return Ok(None),
            }
            ty = self.apply_modifier(&ty, m)?;
        }
        Ok(Some(offset))
    }

    /// Expand a top-level assignment into simple assignments, including the assignments to other
    /// members of unions that the written bits also belong to
    pub fn decompose(&mut self, assignment: &SliceAssignment) -> Result<Vec<SpanAssignment>> {
        let lhs_type = self.slice_type(&assignment.lhs)?;
        let rhs = match &assignment.rhs {
            None => RhsSource::Nondet,
            Some(slice) => {
                let ty = self.slice_type(slice)?;
                if lhs_type.is_scalar_or_pointer() {
                    RhsSource::Slice {
                        slice: slice.clone(),
                        ty: ty.decayed(),
                    }
                } else if ty == lhs_type {
                    RhsSource::Slice {
                        slice: slice.clone(),
                        ty,
                    }
                } else if ty.is_scalar_or_pointer() {
                    RhsSource::Broadcast {
                        slice: slice.clone(),
                        ty,
                    }
                } else {
                    RhsSource::Opaque {
                        slice: slice.clone(),
                        ty,
                        bit_offset: 0,
                    }
                }
            }
        };
        let mut out = vec![];
        self.decompose_into(assignment.lhs.clone(), &lhs_type, rhs, &mut out)?;
        self.add_union_alternatives(out)
    }

    fn decompose_into(
        &mut self,
        lhs: SliceExpression,
        lhs_type: &SimplifiedType,
        rhs: RhsSource,
        out: &mut Vec<SpanAssignment>,
    ) -> Result<()> {
        self.conv.shutdown.shutdown_if_necessary()?;
        match lhs_type {
            SimplifiedType::Scalar(_) | SimplifiedType::Pointer(_) => {
                let rhs = self.leaf_spans(lhs_type, rhs)?;
                out.push(SpanAssignment {
                    lhs,
                    target_type: lhs_type.clone(),
                    rhs,
                });
            }
            SimplifiedType::Composite(kind, name) => {
                let layout = self.conv.types.layout(*kind, name)?;
                let skip_irrelevant =
                    self.conv.options.ignore_irrelevant_fields && self.slice_lives_in_memory(&lhs)?;
                for m in layout.members.iter() {
                    if skip_irrelevant
                        && m.ty.is_scalar_or_pointer()
                        && !self.pts.snapshot().is_tracked_field(lhs_type, &m.name)
                    {
                        continue;
                    }
                    let member_rhs = match &rhs {
                        RhsSource::Nondet => RhsSource::Nondet,
                        RhsSource::Slice { slice, .. } => RhsSource::Slice {
                            slice: slice.field(&m.name),
                            ty: m.ty.clone(),
                        },
                        RhsSource::Broadcast { .. } => rhs.clone(),
                        RhsSource::Opaque {
                            slice,
                            ty,
                            bit_offset,
                        } => RhsSource::Opaque {
                            slice: slice.clone(),
                            ty: ty.clone(),
                            bit_offset: bit_offset - m.bit_offset as i64,
                        },
                    };
                    self.decompose_into(
                        lhs.field(&m.name),
                        &m.ty,
                        member_rhs,
                        out,
                    )?;
                }
            }
            SimplifiedType::Array(element, length) => {
                let index = IndexVariable::new(length.clone());
                let element_rhs = match rhs {
                    RhsSource::Nondet => RhsSource::Nondet,
                    RhsSource::Slice {
                        slice,
                        ty: SimplifiedType::Array(e, _),
                    } => RhsSource::Slice {
                        slice: slice.index(SliceIndex::Variable(index.clone())),
                        ty: (*e).clone(),
                    },
                    RhsSource::Broadcast { slice, ty } => RhsSource::Broadcast { slice, ty },
                    RhsSource::Slice { ty, .. } | RhsSource::Opaque { ty, .. } => {
                        self.conv.log_once.warn_once(format!(
                            "Assignment of {} to array {} is treated as nondeterministic",
                            ty, lhs_type
                        ));
                        RhsSource::Nondet
                    }
                };
                self.decompose_into(
                    lhs.index(SliceIndex::Variable(index)),
                    element,
                    element_rhs,
                    out,
                )?;
            }
            SimplifiedType::Void | SimplifiedType::Function(_) => {
                return Err(EncodingError::unrecognized(format!(
                    "assignment to object of type {}",
                    lhs_type
                )))
            }
        }
        Ok(())
    }

    fn leaf_spans(&self, ty: &SimplifiedType, rhs: RhsSource) -> Result<Vec<SpanRhs>> {
        let width = self.conv.types.bit_size_of(ty)?;
        Ok(match rhs {
            RhsSource::Nondet => vec![SpanRhs {
                span: PartSpan::whole(width),
                source: None,
            }],
            RhsSource::Slice { slice, ty: rty } | RhsSource::Broadcast { slice, ty: rty } => {
                let cast_to = if &rty != ty { Some(ty.clone()) } else { None };
                vec![SpanRhs {
                    span: PartSpan::whole(width),
                    source: Some(SpanSource {
                        slice,
                        ty: rty,
                        cast_to,
                    }),
                }]
            }
            RhsSource::Opaque {
                slice,
                ty: rty,
                bit_offset,
            } => {
                // Bits of the source that land inside this leaf
                let lo = (-bit_offset).max(0) as u64;
                let hi = width as i64 - bit_offset;
                if hi <= lo as i64 {
                    return Ok(vec![]);
                }
                let mut leaves = vec![];
                self.overlapping_leaves(&rty, vec![], 0, (lo, hi as u64), &mut leaves)?;
                let mut spans = vec![];
                for (modifiers, leaf_type, leaf_offset) in leaves {
                    let start = bit_offset + leaf_offset as i64;
                    let end = start + self.conv.types.bit_size_of(&leaf_type)? as i64;
                    let (lo, hi) = (start.max(0), end.min(width as i64));
                    if lo < hi {
                        let mut source = slice.clone();
                        source.modifiers.extend(modifiers);
                        spans.push(SpanRhs {
                            span: PartSpan {
                                lhs_bit_offset: lo as u64,
                                rhs_bit_offset: (lo - start) as u64,
                                bit_size: (hi - lo) as u64,
                            },
                            source: Some(SpanSource {
                                slice: source,
                                ty: leaf_type,
                                cast_to: None,
                            }),
                        });
                    }
                }
                spans
            }
        })
    }

    /// The scalar leaves of `ty` (placed at bit `offset`) that overlap the bit range
    /// `[range.0, range.1)`. Array elements are visited only where they overlap, so arrays of any
    /// length, including unknown ones, contribute just the elements in range.
    fn overlapping_leaves(
        &self,
        ty: &SimplifiedType,
        prefix: Vec<SliceModifier>,
        offset: u64,
        range: (u64, u64),
        out: &mut Vec<Leaf>,
    ) -> Result<()> {
        let (lo, hi) = range;
        if hi <= offset {
            return Ok(());
        }
        match ty {
            SimplifiedType::Scalar(_) | SimplifiedType::Pointer(_) => {
                if offset + self.conv.types.bit_size_of(ty)? > lo {
                    out.push((prefix, ty.clone(), offset));
                }
            }
            SimplifiedType::Composite(kind, name) => {
                for m in self.conv.types.layout(*kind, name)?.members.iter() {
                    let mut p = prefix.clone();
                    p.push(SliceModifier::Field(m.name.clone()));
                    self.overlapping_leaves(&m.ty, p, offset + m.bit_offset, range, out)?;
                }
            }
            SimplifiedType::Array(element, length) => {
                let element_size = self.conv.types.bit_size_of(element)?;
                if element_size == 0 {
                    return Ok(());
                }
                let first = lo.saturating_sub(offset) / element_size;
                let mut last = (hi - offset + element_size - 1) / element_size;
                if let ArrayLength::Literal(n) = length {
                    last = last.min(*n);
                }
                for i in first..last {
                    let mut p = prefix.clone();
                    p.push(SliceModifier::Index(SliceIndex::Concrete(i)));
                    self.overlapping_leaves(element, p, offset + i * element_size, range, out)?;
                }
            }
            SimplifiedType::Void | SimplifiedType::Function(_) => {}
        }
        Ok(())
    }

    /// For each simple assignment whose left-hand side lies inside a union member, assign the
    /// overlapping leaves of the union's other members from the same bits. Leaves assigned
    /// directly take precedence.
    fn add_union_alternatives(
        &self,
        assignments: Vec<SpanAssignment>,
    ) -> Result<Vec<SpanAssignment>> {
        let direct: UnorderedSet<SliceExpression> =
            assignments.iter().map(|a| a.lhs.clone()).collect();
        let mut alternatives: UnorderedMap<SliceExpression, SpanAssignment> = UnorderedMap::new();
        let mut order: Vec<SliceExpression> = vec![];

        for a in assignments.iter() {
            let mut ty = match &a.lhs.base {
                SliceBase::Expression(e) => self.conv.types.simplify(e.expression_type()),
                SliceBase::Value { ty, .. } => ty.clone(),
            };
            let width = self.conv.types.bit_size_of(&a.target_type)?;
            for (k, m) in a.lhs.modifiers.iter().enumerate() {
                let next = self.apply_modifier(&ty, m)?;
                if let (SimplifiedType::Composite(kind, name), SliceModifier::Field(written)) =
                    (&ty, m)
                {
                    if ty.is_union() {
                        if let Some(inner) =
                            self.concrete_bit_offset(&next, &a.lhs.modifiers[k + 1..])?
                        {
                            let union_slice = SliceExpression {
                                base: a.lhs.base.clone(),
                                modifiers: a.lhs.modifiers[..k].to_vec(),
                            };
                            let layout = self.conv.types.layout(*kind, name)?;
                            let position = self.conv.types.bit_offset_of(&ty, written)? + inner;
                            for other in layout.members.iter().filter(|o| &o.name != written) {
                                let mut leaves = vec![];
                                self.overlapping_leaves(
                                    &other.ty,
                                    vec![SliceModifier::Field(other.name.clone())],
                                    other.bit_offset,
                                    (position, position + width),
                                    &mut leaves,
                                )?;
                                for (modifiers, leaf_type, leaf_offset) in leaves {
                                    let spans = self.compose_spans(
                                        a,
                                        position,
                                        leaf_offset,
                                        self.conv.types.bit_size_of(&leaf_type)?,
                                    );
                                    if spans.is_empty() {
                                        continue;
                                    }
                                    let mut lhs = union_slice.clone();
                                    lhs.modifiers.extend(modifiers);
                                    if direct.contains(&lhs) {
                                        continue;
                                    }
                                    match alternatives.get_mut(&lhs) {
                                        Some(existing) => existing.rhs.extend(spans),
                                        None => {
                                            order.push(lhs.clone());
                                            alternatives.insert(
                                                lhs.clone(),
                                                SpanAssignment {
                                                    lhs,
                                                    target_type: leaf_type,
                                                    rhs: spans,
                                                },
                                            );
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                ty = next;
            }
        }

        let mut result = assignments;
        for lhs in order.iter() {
            if let Some(a) = alternatives.remove(lhs) {
                result.push(a);
            }
        }
        Ok(result)
    }

    /// Spans of an alternative leaf at union bit offset `leaf_offset` (of `leaf_width` bits), from
    /// the spans of assignment `a`, whose leaf sits at union bit offset `position`
    fn compose_spans(
        &self,
        a: &SpanAssignment,
        position: u64,
        leaf_offset: u64,
        leaf_width: u64,
    ) -> Vec<SpanRhs> {
        let mut spans = vec![];
        for r in a.rhs.iter() {
            let start = position + r.span.lhs_bit_offset;
            let end = start + r.span.bit_size;
            let lo = start.max(leaf_offset);
            let hi = end.min(leaf_offset + leaf_width);
            if lo < hi {
                spans.push(SpanRhs {
                    span: PartSpan {
                        lhs_bit_offset: lo - leaf_offset,
                        rhs_bit_offset: r.span.rhs_bit_offset + (lo - start),
                        bit_size: hi - lo,
                    },
                    source: r.source.clone(),
                });
            }
        }
        spans
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn substitution_replaces_only_the_given_variable() {
        let i = IndexVariable::new(ArrayLength::Literal(3));
        let j = IndexVariable::new(ArrayLength::Literal(3));
        assert_ne!(i, j);
        let base = SliceExpression::of(Expression::id("a", CType::int()));
        let s = base
            .index(SliceIndex::Variable(i.clone()))
            .index(SliceIndex::Variable(j.clone()));
        let r = s.substitute(&i, &SliceIndex::Concrete(2));
        assert_eq!(r.index_variables().collect::<Vec<_>>(), vec![&j]);
        assert!(!r.is_concrete());
        assert_eq!(
            r.concrete_prefix(),
            base.index(SliceIndex::Concrete(2))
        );
    }

    #[test]
    fn lvalues_with_constant_subscripts_become_modifiers() {
        let ints = CType::array_of(CType::int(), 4);
        let a = Expression::id("a", ints);
        let s = SliceExpression::of_lvalue(Expression::subscript(
            a.clone(),
            Expression::int_literal(2),
            CType::int(),
        ));
        assert_eq!(s, SliceExpression::of(a.clone()).index(SliceIndex::Concrete(2)));

        let by_variable =
            Expression::subscript(a, Expression::id("i", CType::int()), CType::int());
        assert_eq!(
            SliceExpression::of_lvalue(by_variable.clone()),
            SliceExpression::of(by_variable)
        );

        // Subscripts through pointers stay whole
        let p = Expression::id("p", CType::pointer_to(CType::int()));
        let through_pointer = Expression::subscript(p, Expression::int_literal(2), CType::int());
        assert_eq!(
            SliceExpression::of_lvalue(through_pointer.clone()),
            SliceExpression::of(through_pointer)
        );
    }
}
