//! Container data structures shared by the encoder

use unordered::UnorderedMap;

/// A set of values of type `T` that remembers the order in which values were first inserted.
/// Used wherever formula output must not depend on hashing order (e.g. the order in which index
/// variables are quantified).
#[derive(Default, Clone, Debug)]
pub struct InsertionOrderedSet<T: Eq + std::hash::Hash + Ord + Clone> {
    data: Vec<T>,
    revmap: UnorderedMap<T, usize>,
}

impl<T: Eq + std::hash::Hash + Ord + Clone> InsertionOrderedSet<T> {
    /// A new, empty set
    pub fn new() -> Self {
        Self {
            data: Default::default(),
            revmap: Default::default(),
        }
    }

    /// Convert into a vec, in order of first insertion
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Insert `v`, returning its position. Re-inserting an existing value keeps its original
    /// position.
    pub fn insert(&mut self, v: T) -> usize {
        if let Some(idx) = self.revmap.get(&v) {
            *idx
        } else {
            let idx = self.data.len();
            self.data.push(v.clone());
            self.revmap.insert(v, idx);
            idx
        }
    }

    /// Get the member of the set at index `idx`.
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.data.get(idx)
    }

    /// Get the index of `v` if it exists in the set
    pub fn get_index(&self, v: &T) -> Option<usize> {
        self.revmap.get(v).cloned()
    }

    pub fn contains(&self, v: &T) -> bool {
        self.revmap.contains_key(v)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over the storage, in the order of insertion
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

impl<T: Eq + std::hash::Hash + Ord + Clone> FromIterator<T> for InsertionOrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut r = Self::new();
        for v in iter {
            r.insert(v);
        }
        r
    }
}

pub mod unordered {
    #[cfg(not(feature = "deterministic_containers"))]
    type BaseMap<K, V> = std::collections::HashMap<K, V>;
    #[cfg(feature = "deterministic_containers")]
    type BaseMap<K, V> = std::collections::BTreeMap<K, V>;
    #[cfg(not(feature = "deterministic_containers"))]
    pub type UnorderedMapEntry<'a, K, V> = std::collections::hash_map::Entry<'a, K, V>;
    #[cfg(feature = "deterministic_containers")]
    pub type UnorderedMapEntry<'a, K, V> = std::collections::btree_map::Entry<'a, K, V>;
    #[cfg(not(feature = "deterministic_containers"))]
    type BaseSet<T> = std::collections::HashSet<T>;
    #[cfg(feature = "deterministic_containers")]
    type BaseSet<T> = std::collections::BTreeSet<T>;

    /// An unordered map type. This type specifies the _intention_ of unorderedness, but allows the
    /// crate's features to dictate whether it actually use non-determinism at runtime.
    ///
    /// With `deterministic_containers`, iteration order (and thus the order of conjuncts in any
    /// formula built by iterating one of these) is stable across runs.
    #[derive(Clone, PartialEq, Eq)]
    pub struct UnorderedMap<K: std::hash::Hash + Ord + Eq, V> {
        map: BaseMap<K, V>,
    }

    impl<K: std::hash::Hash + Ord + Eq, V> UnorderedMap<K, V> {
        /// Make a new, empty unordered map
        pub fn new() -> Self {
            Self {
                map: Default::default(),
            }
        }

        pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
            self.map.iter()
        }

        pub fn contains_key<Q: ?Sized>(&self, k: &Q) -> bool
        where
            K: std::borrow::Borrow<Q>,
            Q: std::hash::Hash + Ord + Eq,
        {
            self.map.contains_key(k)
        }

        pub fn get<Q: ?Sized>(&self, k: &Q) -> Option<&V>
        where
            K: std::borrow::Borrow<Q>,
            Q: std::hash::Hash + Ord + Eq,
        {
            self.map.get(k)
        }

        pub fn get_mut<Q: ?Sized>(&mut self, k: &Q) -> Option<&mut V>
        where
            K: std::borrow::Borrow<Q>,
            Q: std::hash::Hash + Ord + Eq,
        {
            self.map.get_mut(k)
        }

        /// Inserts a key-value pair into the map, returning the previous value if there was one.
        pub fn insert(&mut self, k: K, v: V) -> Option<V> {
            self.map.insert(k, v)
        }

        pub fn remove<Q: ?Sized>(&mut self, k: &Q) -> Option<V>
        where
            K: std::borrow::Borrow<Q>,
            Q: std::hash::Hash + Ord + Eq,
        {
            self.map.remove(k)
        }

        pub fn entry(&mut self, key: K) -> UnorderedMapEntry<'_, K, V> {
            self.map.entry(key)
        }

        pub fn keys(&self) -> impl Iterator<Item = &K> {
            self.map.keys()
        }

        pub fn values(&self) -> impl Iterator<Item = &V> {
            self.map.values()
        }

        pub fn len(&self) -> usize {
            self.map.len()
        }

        pub fn is_empty(&self) -> bool {
            self.map.is_empty()
        }
    }

    impl<K: std::hash::Hash + Ord + Eq, V> Default for UnorderedMap<K, V> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<K: std::hash::Hash + Ord + Eq, V> FromIterator<(K, V)> for UnorderedMap<K, V> {
        fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
            Self {
                map: BaseMap::from_iter(iter),
            }
        }
    }

    impl<K: std::hash::Hash + Ord + Eq + std::fmt::Debug, V: std::fmt::Debug> std::fmt::Debug
        for UnorderedMap<K, V>
    {
        #[cfg(not(feature = "deterministic_containers"))]
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            self.map
                .iter()
                .collect::<std::collections::BTreeMap<_, _>>()
                .fmt(f)
        }
        #[cfg(feature = "deterministic_containers")]
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            self.map.fmt(f)
        }
    }

    impl<'a, K: std::hash::Hash + Ord + Eq, V> IntoIterator for &'a UnorderedMap<K, V> {
        type Item = (&'a K, &'a V);
        type IntoIter = <&'a BaseMap<K, V> as IntoIterator>::IntoIter;

        fn into_iter(self) -> Self::IntoIter {
            self.map.iter()
        }
    }

    /// An unordered set type, with the same determinism switch as [`UnorderedMap`].
    #[derive(Clone, PartialEq, Eq)]
    pub struct UnorderedSet<T: std::hash::Hash + Ord + Eq> {
        set: BaseSet<T>,
    }

    impl<T: std::hash::Hash + Ord + Eq> UnorderedSet<T> {
        /// Make a new, empty unordered set
        pub fn new() -> Self {
            Self {
                set: BaseSet::new(),
            }
        }

        /// Adds a value to the set, returning whether it was newly inserted.
        pub fn insert(&mut self, value: T) -> bool {
            self.set.insert(value)
        }

        pub fn iter(&self) -> impl Iterator<Item = &T> {
            self.set.iter()
        }

        pub fn contains<Q: ?Sized>(&self, value: &Q) -> bool
        where
            T: std::borrow::Borrow<Q>,
            Q: std::hash::Hash + Ord + Eq,
        {
            self.set.contains(value)
        }

        pub fn len(&self) -> usize {
            self.set.len()
        }

        pub fn is_empty(&self) -> bool {
            self.set.is_empty()
        }
    }

    impl<T: std::hash::Hash + Ord + Eq> Default for UnorderedSet<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T: std::hash::Hash + Ord + Eq + std::fmt::Debug> std::fmt::Debug for UnorderedSet<T> {
        #[cfg(not(feature = "deterministic_containers"))]
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            self.set
                .iter()
                .collect::<std::collections::BTreeSet<_>>()
                .fmt(f)
        }
        #[cfg(feature = "deterministic_containers")]
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            self.set.fmt(f)
        }
    }

    impl<T: std::hash::Hash + Ord + Eq> Extend<T> for UnorderedSet<T> {
        fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
            self.set.extend(iter);
        }
    }

    impl<'a, T: std::hash::Hash + Ord + Eq> IntoIterator for &'a UnorderedSet<T> {
        type Item = &'a T;
        type IntoIter = <&'a BaseSet<T> as IntoIterator>::IntoIter;

        fn into_iter(self) -> Self::IntoIter {
            self.set.iter()
        }
    }

    impl<T: std::hash::Hash + Ord + Eq> FromIterator<T> for UnorderedSet<T> {
        fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
            Self {
                set: BaseSet::from_iter(iter),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insertion_order_survives_reinsertion() {
        let mut s = InsertionOrderedSet::new();
        assert_eq!(s.insert("b"), 0);
        assert_eq!(s.insert("a"), 1);
        assert_eq!(s.insert("b"), 0);
        assert_eq!(s.into_vec(), vec!["b", "a"]);
    }
}
