//! Partitioning of memory into regions, each backed by its own heap symbol.
//!
//! Two cells can only alias if they are in the same region. By default regions are type based:
//! all cells of the same (simplified) type share one region. With field based regions, cells that
//! are members of a composite get a region per `(composite, member)` pair instead.

use crate::types::{ScalarKind, ScalarType, SimplifiedType};

/// A logical heap namespace
#[derive(PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Clone)]
pub struct MemoryRegion {
    ty: SimplifiedType,
    field: Option<(SimplifiedType, String)>,
}

impl MemoryRegion {
    /// The type of the cells in this region
    pub fn cell_type(&self) -> &SimplifiedType {
        &self.ty
    }

    /// The owning composite and member, for field based regions
    pub fn field(&self) -> Option<&(SimplifiedType, String)> {
        self.field.as_ref()
    }

    /// The name of the heap symbol (array or uninterpreted function) backing this region. Also used
    /// as the name under which its SSA index is kept.
    pub fn heap_name(&self) -> String {
        let cell = sanitize(&self.ty.to_string());
        match &self.field {
            None => format!("*{}", cell),
            Some((owner, member)) => {
                format!("*{}_{}_{}", cell, sanitize(&owner.to_string()), member)
            }
        }
    }
}

impl std::fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.heap_name())
    }
}

fn sanitize(s: &str) -> String {
    s.replace(' ', "_")
}

/// Whether `name` is the SSA name of a memory region rather than of a program variable
pub fn is_heap_name(name: &str) -> bool {
    name.starts_with('*')
}

/// Decides which region a cell belongs to
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegionManager {
    field_based: bool,
}

impl MemoryRegionManager {
    pub fn new(field_based: bool) -> Self {
        Self { field_based }
    }

    /// The region of a cell of type `cell_type`, which is member `field.1` of a composite of type
    /// `field.0` if `field` is given.
    pub fn region_for(
        &self,
        cell_type: &SimplifiedType,
        field: Option<&(SimplifiedType, String)>,
    ) -> MemoryRegion {
        MemoryRegion {
            ty: canonical_cell_type(cell_type),
            field: if self.field_based {
                field.cloned()
            } else {
                None
            },
        }
    }
}

/// Signed and unsigned integers of the same width may alias, so they share a region
fn canonical_cell_type(t: &SimplifiedType) -> SimplifiedType {
    match t {
        SimplifiedType::Scalar(s @ ScalarType {
            kind: ScalarKind::Integer,
            ..
        }) => SimplifiedType::Scalar(ScalarType { signed: true, ..*s }),
        t => t.clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::CompositeKind;
    use std::sync::Arc;

    fn integer(bit_width: u32, signed: bool) -> SimplifiedType {
        SimplifiedType::Scalar(ScalarType {
            kind: ScalarKind::Integer,
            bit_width,
            signed,
        })
    }

    #[test]
    fn type_based_regions_ignore_fields_and_signedness() {
        let m = MemoryRegionManager::new(false);
        let s = SimplifiedType::Composite(CompositeKind::Struct, "s".into());
        let field = (s, "x".to_owned());
        let a = m.region_for(&integer(32, false), Some(&field));
        let b = m.region_for(&integer(32, true), None);
        assert_eq!(a, b);
        assert_eq!(a.heap_name(), "*int32_t");
        let p = m.region_for(&SimplifiedType::Pointer(Arc::new(integer(8, true))), None);
        assert_eq!(p.heap_name(), "*int8_t*");
    }

    #[test]
    fn field_based_regions_separate_members() {
        let m = MemoryRegionManager::new(true);
        let s = SimplifiedType::Composite(CompositeKind::Struct, "s".into());
        let x = m.region_for(&integer(32, true), Some(&(s.clone(), "x".to_owned())));
        let y = m.region_for(&integer(32, true), Some(&(s, "y".to_owned())));
        assert_ne!(x, y);
        assert_eq!(x.heap_name(), "*int32_t_struct_s_x");
        assert!(is_heap_name(&y.heap_name()));
    }
}
