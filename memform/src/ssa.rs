//! Versioning of symbolic names along a path.
//!
//! Every program variable and every memory region is encoded as a family of logic variables
//! `name@1`, `name@2`, ..., one per write. An [`SsaMap`] records the current version of each name;
//! it is an immutable snapshot, shared between paths that have not diverged. All modifications go
//! through an [`SsaMapBuilder`], which is frozen into the next snapshot once an edge is encoded.

use crate::containers::unordered::UnorderedMap;
use crate::types::SimplifiedType;
use std::sync::Arc;

/// The version a name has before it is ever written. Reading such a name instantiates it with
/// this index.
pub const INITIAL_INDEX: u32 = 1;

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SsaEntry {
    pub index: u32,
    /// The type of the variable, or the cell type of a memory region
    pub ty: SimplifiedType,
}

/// An immutable map from names to their current SSA index. Absent names have never been
/// written.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct SsaMap {
    vars: Arc<UnorderedMap<String, SsaEntry>>,
}

/// A name whose index differs between two merged maps
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SsaMergeDifference {
    pub name: String,
    pub ty: SimplifiedType,
    /// Index in the left map (`INITIAL_INDEX` if absent)
    pub left: u32,
    /// Index in the right map (`INITIAL_INDEX` if absent)
    pub right: u32,
}

impl SsaMergeDifference {
    pub fn merged(&self) -> u32 {
        self.left.max(self.right)
    }
}

impl SsaMap {
    pub fn empty() -> Self {
        Default::default()
    }

    pub fn get_index(&self, name: &str) -> Option<u32> {
        self.vars.get(name).map(|e| e.index)
    }

    pub fn get_type(&self, name: &str) -> Option<&SimplifiedType> {
        self.vars.get(name).map(|e| &e.ty)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &SsaEntry)> {
        self.vars.iter()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn builder(&self) -> SsaMapBuilder {
        SsaMapBuilder {
            base: self.clone(),
            changes: UnorderedMap::new(),
        }
    }

    /// Whether both snapshots are literally the same (not just equal)
    pub fn ptr_eq(&self, other: &SsaMap) -> bool {
        Arc::ptr_eq(&self.vars, &other.vars)
    }

    /// Merge two maps taken at the end of two paths that meet. The merged map holds the maximum
    /// index of each name; every name whose indices differ is reported, so that the caller can
    /// equate the lagging path's version with the merged one.
    pub fn merge(&self, other: &SsaMap) -> (SsaMap, Vec<SsaMergeDifference>) {
        if self.ptr_eq(other) {
            return (self.clone(), vec![]);
        }
        let mut merged = (*self.vars).clone();
        let mut differences = vec![];
        for (name, entry) in other.vars.iter() {
            let left = self.get_index(name);
            if left != Some(entry.index) {
                let left = left.unwrap_or(INITIAL_INDEX);
                if left != entry.index {
                    differences.push(SsaMergeDifference {
                        name: name.clone(),
                        ty: entry.ty.clone(),
                        left,
                        right: entry.index,
                    });
                }
                merged.insert(
                    name.clone(),
                    SsaEntry {
                        index: left.max(entry.index),
                        ty: entry.ty.clone(),
                    },
                );
            }
        }
        for (name, entry) in self.vars.iter() {
            if !other.contains(name) && entry.index != INITIAL_INDEX {
                differences.push(SsaMergeDifference {
                    name: name.clone(),
                    ty: entry.ty.clone(),
                    left: entry.index,
                    right: INITIAL_INDEX,
                });
            }
        }
        (
            SsaMap {
                vars: Arc::new(merged),
            },
            differences,
        )
    }
}

/// The path-local, mutable form of an [`SsaMap`]. Indices only ever grow.
#[derive(Debug, Clone)]
pub struct SsaMapBuilder {
    base: SsaMap,
    changes: UnorderedMap<String, SsaEntry>,
}

impl SsaMapBuilder {
    pub fn peek_index(&self, name: &str) -> Option<u32> {
        self.changes
            .get(name)
            .map(|e| e.index)
            .or_else(|| self.base.get_index(name))
    }

    pub fn get_type(&self, name: &str) -> Option<&SimplifiedType> {
        self.changes
            .get(name)
            .map(|e| &e.ty)
            .or_else(|| self.base.get_type(name))
    }

    /// The current index of `name`, instantiating never-written names with [`INITIAL_INDEX`]
    pub fn get_index(&mut self, name: &str, ty: &SimplifiedType) -> u32 {
        match self.peek_index(name) {
            Some(i) => i,
            None => {
                self.set_index(name, ty, INITIAL_INDEX);
                INITIAL_INDEX
            }
        }
    }

    /// The index the next write to `name` would get, without reserving it
    pub fn fresh_index(&self, name: &str) -> u32 {
        self.peek_index(name).unwrap_or(0).max(INITIAL_INDEX) + 1
    }

    /// Reserve and return a fresh index for `name`
    pub fn make_fresh_index(&mut self, name: &str, ty: &SimplifiedType) -> u32 {
        let index = self.fresh_index(name);
        self.set_index(name, ty, index);
        index
    }

    pub fn set_index(&mut self, name: &str, ty: &SimplifiedType, index: u32) {
        if let Some(old) = self.peek_index(name) {
            assert!(
                old <= index,
                "SSA index of {} would decrease from {} to {}",
                name,
                old,
                index
            );
            if old == index {
                return;
            }
        }
        self.changes.insert(
            name.to_owned(),
            SsaEntry {
                index,
                ty: ty.clone(),
            },
        );
    }

    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }

    /// Produce the immutable snapshot. Shares the underlying storage with the snapshot this
    /// builder was created from if nothing changed.
    pub fn freeze(self) -> SsaMap {
        if self.changes.is_empty() {
            return self.base;
        }
        let mut vars = (*self.base.vars).clone();
        for (name, entry) in self.changes.iter() {
            vars.insert(name.clone(), entry.clone());
        }
        SsaMap {
            vars: Arc::new(vars),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{ScalarKind, ScalarType};

    fn int() -> SimplifiedType {
        SimplifiedType::Scalar(ScalarType {
            kind: ScalarKind::Integer,
            bit_width: 32,
            signed: true,
        })
    }

    #[test]
    fn writes_get_increasing_indices() {
        let base = SsaMap::empty();
        let mut b = base.builder();
        assert_eq!(b.get_index("main::x", &int()), 1);
        assert_eq!(b.make_fresh_index("main::x", &int()), 2);
        assert_eq!(b.fresh_index("main::x"), 3);
        assert_eq!(b.make_fresh_index("main::y", &int()), 2);
        let frozen = b.freeze();
        assert_eq!(frozen.get_index("main::x"), Some(2));
        assert_eq!(base.get_index("main::x"), None);
    }

    #[test]
    fn unchanged_builder_shares_snapshot() {
        let mut b = SsaMap::empty().builder();
        b.make_fresh_index("g", &int());
        let first = b.freeze();
        let second = first.builder().freeze();
        assert!(first.ptr_eq(&second));
    }

    #[test]
    #[should_panic]
    fn indices_never_decrease() {
        let mut b = SsaMap::empty().builder();
        b.set_index("g", &int(), 5);
        b.set_index("g", &int(), 3);
    }

    #[test]
    fn merge_reports_lagging_names() {
        let mut l = SsaMap::empty().builder();
        l.set_index("a", &int(), 4);
        l.set_index("b", &int(), 2);
        let l = l.freeze();
        let mut r = SsaMap::empty().builder();
        r.set_index("a", &int(), 2);
        r.set_index("c", &int(), 3);
        let r = r.freeze();
        let (merged, diffs) = l.merge(&r);
        assert_eq!(merged.get_index("a"), Some(4));
        assert_eq!(merged.get_index("b"), Some(2));
        assert_eq!(merged.get_index("c"), Some(3));
        let mut names: Vec<_> = diffs.iter().map(|d| (d.name.as_str(), d.left, d.right)).collect();
        names.sort();
        assert_eq!(names, vec![("a", 4, 2), ("b", 2, 1), ("c", 1, 3)]);
    }
}
