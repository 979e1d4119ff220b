//! The universe of memory locations a pointer may refer to.
//!
//! Every variable kept in memory, and every allocation, is a *base*: a symbolic start address
//! `__ADDRESS_OF_<base>` plus a type. Each scalar cell of a base is a [`PointerTarget`], filed
//! under the [`MemoryRegion`] it lives in. The set only ever grows along a path.

use crate::constraints::Constraints;
use crate::containers::unordered::{UnorderedMap, UnorderedSet};
use crate::converter::FormulaConverter;
use crate::error::Result;
use crate::expr::{BinaryOperator, Expression};
use crate::formula::Formula;
use crate::log::*;
use crate::region::MemoryRegion;
use crate::types::{ArrayLength, BuiltIn, CType, SimplifiedType};
use std::sync::Arc;

/// A scalar cell at byte `offset` of `base`
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct PointerTarget {
    pub base: String,
    pub offset: u64,
    /// The innermost composite containing the cell, and the cell's offset inside it
    pub container: Option<(SimplifiedType, u64)>,
}

impl PointerTarget {
    pub fn address(&self, conv: &FormulaConverter) -> Formula {
        let fmgr = &conv.fmgr;
        fmgr.make_plus(
            base_address(conv, &self.base),
            fmgr.make_bv(conv.types.machine_model().pointer_bits(), self.offset as i128),
        )
    }
}

/// The symbolic start address of `base`
pub fn base_address(conv: &FormulaConverter, base: &str) -> Formula {
    conv.fmgr.make_variable_without_ssa_index(
        conv.types.pointer_sort(),
        &format!("__ADDRESS_OF_{}", base),
    )
}

/// An allocation whose pointer had type `void *` when it was made; its cells are only known once
/// the pointer is converted to a typed pointer
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct DeferredAllocation {
    pub base: String,
    /// Size in bytes
    pub size: ArrayLength,
    /// Made by `calloc`
    pub zeroed: bool,
}

/// How precisely an address is known, relative to the pointer targets
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct PointerTargetPattern {
    pub base: Option<String>,
    pub offset: Option<u64>,
    pub container: Option<(SimplifiedType, u64)>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum PatternPrecision {
    /// Base and offset are known
    Exact,
    /// Either the base or the containing composite is known
    SemiExact,
    Inexact,
}

impl PointerTargetPattern {
    pub fn any() -> Self {
        Default::default()
    }

    pub fn exact(base: impl Into<String>, offset: u64) -> Self {
        Self {
            base: Some(base.into()),
            offset: Some(offset),
            container: None,
        }
    }

    pub fn precision(&self) -> PatternPrecision {
        match (&self.base, &self.offset, &self.container) {
            (Some(_), Some(_), _) => PatternPrecision::Exact,
            (Some(_), None, _) | (None, _, Some(_)) => PatternPrecision::SemiExact,
            (None, _, None) => PatternPrecision::Inexact,
        }
    }

    /// Whether `t` may lie within the `size` bytes this pattern describes (`None` for an unknown
    /// size, reaching to the end of the base)
    pub fn may_cover(&self, t: &PointerTarget, size: Option<u64>) -> bool {
        if let Some(base) = &self.base {
            if base != &t.base {
                return false;
            }
        }
        if let Some(offset) = self.offset {
            if t.offset < offset || size.map_or(false, |size| t.offset >= offset + size) {
                return false;
            }
        }
        if let Some((container, container_offset)) = &self.container {
            match &t.container {
                Some((c, o)) => {
                    if c != container
                        || o < container_offset
                        || size.map_or(false, |size| *o >= container_offset + size)
                    {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// See the module documentation. Immutable; cheap to clone.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct PointerTargetSet {
    bases: Arc<UnorderedMap<String, SimplifiedType>>,
    last_base: Option<String>,
    targets: Arc<UnorderedMap<MemoryRegion, Vec<PointerTarget>>>,
    tracked_fields: Arc<UnorderedSet<(SimplifiedType, String)>>,
    deferred_allocations: Arc<UnorderedMap<String, DeferredAllocation>>,
    allocation_count: usize,
}

impl PointerTargetSet {
    pub fn empty() -> Self {
        Default::default()
    }

    pub fn is_base(&self, name: &str) -> bool {
        self.bases.contains_key(name)
    }

    pub fn base_type(&self, name: &str) -> Option<&SimplifiedType> {
        self.bases.get(name)
    }

    pub fn bases(&self) -> impl Iterator<Item = (&String, &SimplifiedType)> {
        self.bases.iter()
    }

    /// All targets in `region`, in the order they were added
    pub fn targets(&self, region: &MemoryRegion) -> &[PointerTarget] {
        self.targets.get(region).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.targets.keys()
    }

    pub fn is_tracked_field(&self, composite: &SimplifiedType, member: &str) -> bool {
        self.tracked_fields
            .contains(&(composite.clone(), member.to_owned()))
    }

    pub fn deferred_allocation(&self, pointer: &str) -> Option<&DeferredAllocation> {
        self.deferred_allocations.get(pointer)
    }

    pub fn builder(&self) -> PointerTargetSetBuilder {
        PointerTargetSetBuilder {
            pts: self.clone(),
            changed: false,
        }
    }

    /// The union of two sets reaching the same program point
    pub fn merge(&self, other: &PointerTargetSet) -> PointerTargetSet {
        if self == other {
            return self.clone();
        }
        let mut bases = (*self.bases).clone();
        for (n, t) in other.bases.iter() {
            bases.entry(n.clone()).or_insert_with(|| t.clone());
        }
        let mut targets = (*self.targets).clone();
        for (r, ts) in other.targets.iter() {
            let mine = targets.entry(r.clone()).or_insert_with(Vec::new);
            for t in ts {
                if !mine.contains(t) {
                    mine.push(t.clone());
                }
            }
        }
        let mut tracked_fields = (*self.tracked_fields).clone();
        tracked_fields.extend(other.tracked_fields.iter().cloned());
        let mut deferred_allocations = (*self.deferred_allocations).clone();
        for (n, d) in other.deferred_allocations.iter() {
            deferred_allocations
                .entry(n.clone())
                .or_insert_with(|| d.clone());
        }
        PointerTargetSet {
            bases: Arc::new(bases),
            last_base: self.last_base.clone().or_else(|| other.last_base.clone()),
            targets: Arc::new(targets),
            tracked_fields: Arc::new(tracked_fields),
            deferred_allocations: Arc::new(deferred_allocations),
            allocation_count: self.allocation_count.max(other.allocation_count),
        }
    }
}

/// The path-local, growing form of a [`PointerTargetSet`]
#[derive(Debug, Clone)]
pub struct PointerTargetSetBuilder {
    pts: PointerTargetSet,
    changed: bool,
}

/// Where a cell being enumerated sits
struct Site {
    offset: u64,
    container: Option<(SimplifiedType, u64)>,
    field: Option<(SimplifiedType, String)>,
}

impl PointerTargetSetBuilder {
    /// The current contents
    pub fn snapshot(&self) -> &PointerTargetSet {
        &self.pts
    }

    pub fn is_unchanged(&self) -> bool {
        !self.changed
    }

    pub fn freeze(self) -> PointerTargetSet {
        self.pts
    }

    /// Add `name` as a base of type `ty`, enumerate its cells as targets, and constrain its address
    /// to be positive and to follow the previously added base. Returns whether the base is new.
    pub fn add_base(
        &mut self,
        conv: &FormulaConverter,
        name: &str,
        ty: &SimplifiedType,
        constraints: &mut Constraints,
    ) -> Result<bool> {
        if self.pts.is_base(name) {
            return Ok(false);
        }
        debug!("Adding pointer target base"; "base" => name, "type" => %ty);
        let fmgr = &conv.fmgr;
        let bits = conv.types.machine_model().pointer_bits();
        let address = base_address(conv, name);
        constraints.add_constraint(fmgr.make_less_than(
            fmgr.make_bv(bits, 0),
            address.clone(),
            false,
        ));
        if let Some(last) = &self.pts.last_base {
            let last_type = self.pts.bases.get(last).cloned().unwrap_or(SimplifiedType::Void);
            let last_end = fmgr.make_plus(
                base_address(conv, last),
                fmgr.make_bv(bits, conservative_size(conv, &last_type)?.max(1) as i128),
            );
            constraints.add_constraint(fmgr.make_less_or_equal(last_end, address, false));
        }

        let mut new_targets = vec![];
        add_targets(
            conv,
            name,
            ty,
            Site {
                offset: 0,
                container: None,
                field: None,
            },
            &mut new_targets,
        )?;
        let targets = Arc::make_mut(&mut self.pts.targets);
        for (region, target) in new_targets {
            targets.entry(region).or_insert_with(Vec::new).push(target);
        }
        Arc::make_mut(&mut self.pts.bases).insert(name.to_owned(), ty.clone());
        self.pts.last_base = Some(name.to_owned());
        self.changed = true;
        Ok(true)
    }

    pub fn add_tracked_field(&mut self, composite: &SimplifiedType, member: &str) {
        if !self.pts.is_tracked_field(composite, member) {
            Arc::make_mut(&mut self.pts.tracked_fields)
                .insert((composite.clone(), member.to_owned()));
            self.changed = true;
        }
    }

    pub fn add_deferred_allocation(&mut self, pointer: &str, allocation: DeferredAllocation) {
        Arc::make_mut(&mut self.pts.deferred_allocations).insert(pointer.to_owned(), allocation);
        self.changed = true;
    }

    pub fn take_deferred_allocation(&mut self, pointer: &str) -> Option<DeferredAllocation> {
        if !self.pts.deferred_allocations.contains_key(pointer) {
            return None;
        }
        self.changed = true;
        Arc::make_mut(&mut self.pts.deferred_allocations).remove(pointer)
    }

    /// A number for naming the next allocation on this path
    pub fn next_allocation_id(&mut self) -> usize {
        self.pts.allocation_count += 1;
        self.changed = true;
        self.pts.allocation_count
    }
}

/// Number of elements to enumerate for an array of the given length
pub(crate) fn bounded_length(
    conv: &FormulaConverter,
    what: &str,
    length: &ArrayLength,
) -> u64 {
    match length {
        ArrayLength::Literal(n) => {
            let (bound, truncated) = conv.options.unroll_bound(*n);
            if truncated {
                conv.log_once.warn_once(format!(
                    "Only the first {} of {} elements of {} are tracked",
                    bound, n, what
                ));
            }
            bound
        }
        ArrayLength::Symbolic(_) | ArrayLength::Unknown => {
            conv.log_once.warn_once(format!(
                "Assuming {} elements for {}, whose length is not a constant",
                conv.options.default_array_length, what
            ));
            conv.options.default_array_length
        }
    }
}

/// Size in bytes, with non-constant array lengths replaced by their assumed default
pub(crate) fn conservative_size(conv: &FormulaConverter, ty: &SimplifiedType) -> Result<u64> {
    match ty {
        SimplifiedType::Array(element, ArrayLength::Literal(n)) => {
            Ok(n * conservative_size(conv, element)?)
        }
        SimplifiedType::Array(element, _) => {
            Ok(conv.options.default_array_length * conservative_size(conv, element)?)
        }
        t => conv.types.size_of(t),
    }
}

fn add_targets(
    conv: &FormulaConverter,
    base: &str,
    ty: &SimplifiedType,
    site: Site,
    out: &mut Vec<(MemoryRegion, PointerTarget)>,
) -> Result<()> {
    match ty {
        SimplifiedType::Array(element, length) => {
            let n = bounded_length(conv, &format!("{} ({})", base, ty), length);
            let element_size = conv.types.size_of(element)?;
            for i in 0..n {
                conv.shutdown.shutdown_if_necessary()?;
                let delta = i * element_size;
                add_targets(
                    conv,
                    base,
                    element,
                    Site {
                        offset: site.offset + delta,
                        container: site.container.clone().map(|(c, o)| (c, o + delta)),
                        field: site.field.clone(),
                    },
                    out,
                )?;
            }
        }
        SimplifiedType::Composite(kind, name) => {
            for m in conv.types.layout(*kind, name)?.members.iter() {
                let offset = match m.byte_offset() {
                    Some(o) => o,
                    None => continue,
                };
                add_targets(
                    conv,
                    base,
                    &m.ty,
                    Site {
                        offset: site.offset + offset,
                        container: Some((ty.clone(), offset)),
                        field: Some((ty.clone(), m.name.clone())),
                    },
                    out,
                )?;
            }
        }
        SimplifiedType::Void | SimplifiedType::Function(_) => {}
        SimplifiedType::Scalar(_) | SimplifiedType::Pointer(_) => {
            out.push((
                conv.regions.region_for(ty, site.field.as_ref()),
                PointerTarget {
                    base: base.to_owned(),
                    offset: site.offset,
                    container: site.container,
                },
            ));
        }
    }
    Ok(())
}

/// The type of a fresh allocation of `size` bytes through a pointer to `pointee`
pub(crate) fn allocation_type(
    conv: &FormulaConverter,
    pointee: &SimplifiedType,
    size: &ArrayLength,
) -> Result<SimplifiedType> {
    let (element, element_size) = match pointee {
        SimplifiedType::Void => (conv.types.simplify(&CType::BuiltIn(BuiltIn::UnsignedChar)), 1),
        t => (t.clone(), conv.types.size_of(t)?.max(1)),
    };
    Ok(match size {
        ArrayLength::Literal(n) if *n == element_size => element,
        ArrayLength::Literal(n) => {
            SimplifiedType::Array(Arc::new(element), ArrayLength::Literal(n / element_size))
        }
        ArrayLength::Symbolic(e) => {
            let size_type = conv.types.lower(&conv.types.size_type());
            let length = Expression::binary(
                BinaryOperator::Divide,
                (**e).clone(),
                Expression::int(element_size as i128, size_type.clone()),
                size_type,
            );
            SimplifiedType::Array(Arc::new(element), ArrayLength::Symbolic(Arc::new(length)))
        }
        ArrayLength::Unknown => SimplifiedType::Array(Arc::new(element), ArrayLength::Unknown),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn target(base: &str, offset: u64) -> PointerTarget {
        PointerTarget {
            base: base.into(),
            offset,
            container: None,
        }
    }

    #[test]
    fn pattern_precision() {
        assert_eq!(
            PointerTargetPattern::exact("a", 4).precision(),
            PatternPrecision::Exact
        );
        assert_eq!(
            PointerTargetPattern::any().precision(),
            PatternPrecision::Inexact
        );
        let s = SimplifiedType::Composite(crate::types::CompositeKind::Struct, "s".into());
        let p = PointerTargetPattern {
            container: Some((s, 0)),
            ..Default::default()
        };
        assert_eq!(p.precision(), PatternPrecision::SemiExact);
        assert!(!p.may_cover(&target("a", 0), Some(4)));
    }

    #[test]
    fn exact_patterns_cover_their_range() {
        let p = PointerTargetPattern::exact("a", 4);
        assert!(!p.may_cover(&target("a", 0), Some(8)));
        assert!(p.may_cover(&target("a", 4), Some(8)));
        assert!(p.may_cover(&target("a", 8), Some(8)));
        assert!(!p.may_cover(&target("a", 12), Some(8)));
        assert!(p.may_cover(&target("a", 400), None));
        assert!(!p.may_cover(&target("b", 4), Some(8)));
    }
}
