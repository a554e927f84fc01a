use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ahash::{AHashMap, RandomState};

/// Typed integer handle into a flat array owned by the network or an engine.
///
/// The handle is `Copy` and only carries the internal index. Mapping to external string ids is
/// done by an [IdStore] which is owned by whoever creates the ids, usually the [Network].
///
/// This type uses the newtype pattern https://rust-unofficial.github.io/patterns/patterns/behavioural/newtype.html
/// so that ids of different kinds can't be mixed up and to enable implementing IsEnabled for
/// using the NoHashHasher crate.
///
/// [Network]: crate::simulation::network::Network
pub struct Id<T> {
    internal: u32,
    // fn() -> T keeps Id Send + Sync regardless of T
    _type_marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Creates an id which is not attached to any id store. Engines use this for ids of objects
    /// which have no external representation, e.g. vehicles created by a demand generator.
    pub const fn new(internal: u32) -> Self {
        Self {
            internal,
            _type_marker: PhantomData,
        }
    }

    pub fn internal(&self) -> u32 {
        self.internal
    }

    pub fn index(&self) -> usize {
        self.internal as usize
    }
}

/// Mark Id as enabled for the nohash_hasher::NoHashHasher trait
impl<T> nohash_hasher::IsEnabled for Id<T> {}

impl<T> nohash_hasher::IsEnabled for &Id<T> {}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

/// Implement PartialEq, Eq, PartialOrd, Ord, so that Ids can be used in HashMaps and Ordered collections
/// all four methods rely on the internal id.
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.internal == other.internal
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // use write u64 directly, so that we can use NoHashHasher with ids
        state.write_u64(self.internal as u64);
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.internal.cmp(&other.internal)
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.internal)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.internal)
    }
}

/// Bijection between external string ids and dense internal ids of one kind.
#[derive(Debug)]
pub struct IdStore<T> {
    external: Vec<String>,
    // use ahasher algorithm with fixed random state, to get predictable iteration
    mapping: AHashMap<String, Id<T>>,
}

impl<T> Default for IdStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IdStore<T> {
    pub fn new() -> Self {
        Self {
            external: Vec::new(),
            mapping: AHashMap::with_hasher(RandomState::with_seed(42)),
        }
    }

    /// Returns the id for `external`, creating the next dense id if it is unknown.
    pub fn create_id(&mut self, external: &str) -> Id<T> {
        if let Some(id) = self.mapping.get(external) {
            return *id;
        }
        let id = Id::new(self.external.len() as u32);
        self.external.push(String::from(external));
        self.mapping.insert(String::from(external), id);
        id
    }

    pub fn get_from_ext(&self, external: &str) -> Option<Id<T>> {
        self.mapping.get(external).copied()
    }

    pub fn external(&self, id: Id<T>) -> Option<&str> {
        self.external.get(id.index()).map(String::as_str)
    }

    pub fn contains(&self, external: &str) -> bool {
        self.mapping.contains_key(external)
    }

    pub fn len(&self) -> usize {
        self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.external.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use nohash_hasher::IntSet;

    use super::{Id, IdStore};

    #[derive(Debug)]
    struct Marker;

    #[test]
    fn create_id_is_dense_and_idempotent() {
        let mut store: IdStore<Marker> = IdStore::new();
        let a = store.create_id("a");
        let b = store.create_id("b");
        let a_again = store.create_id("a");

        assert_eq!(0, a.internal());
        assert_eq!(1, b.internal());
        assert_eq!(a, a_again);
        assert_eq!(2, store.len());
        assert_eq!(Some("b"), store.external(b));
    }

    #[test]
    fn get_unknown_external() {
        let mut store: IdStore<Marker> = IdStore::new();
        store.create_id("known");
        assert_eq!(None, store.get_from_ext("unknown"));
        assert_eq!(None, store.external(Id::new(7)));
    }

    #[test]
    fn ids_in_nohash_set() {
        let mut set: IntSet<Id<Marker>> = IntSet::default();
        set.insert(Id::new(3));
        set.insert(Id::new(3));
        set.insert(Id::new(1));
        assert_eq!(2, set.len());
        assert!(set.contains(&Id::new(1)));
    }

    #[test]
    fn order_follows_internal() {
        let mut ids = vec![Id::<Marker>::new(5), Id::new(2), Id::new(9)];
        ids.sort();
        assert_eq!(vec![2, 5, 9], ids.iter().map(|i| i.internal()).collect::<Vec<_>>());
    }
}
