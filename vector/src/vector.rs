use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Index,
    rc::Rc,
};

use crate::{
    edit::{acquire_editable, Owner},
    node::{capacity, extract_index, Iter, Node},
    Error, Result, BITS, BRANCHING,
};

/// A persistent vector, stored as a trie of fixed fanout plus a tail buffer.
///
/// Indices below [`tail_offset`](Vector::tail_offset) live in the trie,
/// which is always packed to the left; the remaining (at most
/// [`BRANCHING`]) elements live in the tail. Appending only touches the
/// tail, until it fills up and gets moved into the trie as a whole leaf.
///
/// Cloning is `O(1)`. All the `with_*` methods leave `self` alone and return
/// a new version that shares every untouched node with `self`.
#[derive(Clone)]
pub struct Vector<T> {
    root: Option<Rc<Node<T>>>,
    tail: Option<Rc<Node<T>>>,
    size: usize,
    // The number of index bits consumed above the leaves, i.e. the height of
    // the trie times `BITS`. An empty or tail-only vector has level `BITS`,
    // which is the level its root will have once it gets one.
    level: u32,
}

fn tail_offset(size: usize) -> usize {
    if size < BRANCHING {
        0
    } else {
        ((size - 1) >> BITS) << BITS
    }
}

impl<T> Vector<T> {
    pub fn new() -> Self {
        Vector {
            root: None,
            tail: None,
            size: 0,
            level: BITS,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The number of index bits consumed by the trie, from its root down to
    /// (but excluding) its leaves.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// The index of the first element stored in the tail.
    pub fn tail_offset(&self) -> usize {
        tail_offset(self.size)
    }

    fn height(&self) -> u32 {
        self.level / BITS
    }

    /// Gets the element at the given index.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use immu_vector::{Error, Vector};
    /// let vec = Vector::from_iter([0, 1, 2, 3, 4, 5]);
    /// assert_eq!(vec.get(2), Ok(&2));
    /// assert_eq!(vec.get(6), Err(Error::OutOfRange { index: 6, len: 6 }));
    /// ```
    pub fn get(&self, index: usize) -> Result<&T> {
        let out_of_range = Error::OutOfRange {
            index,
            len: self.size,
        };
        if index >= self.size {
            return Err(out_of_range);
        }

        let found = if index >= self.tail_offset() {
            self.tail.as_ref().and_then(|tail| tail.get(0, index))
        } else {
            self.root
                .as_ref()
                .and_then(|root| root.get(self.height(), index))
        };
        found.ok_or(out_of_range)
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0).ok()
    }

    pub fn last(&self) -> Option<&T> {
        self.size.checked_sub(1).and_then(|i| self.get(i).ok())
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.into_iter()
    }

    pub fn check_invariants(&self) {
        let root_len = self
            .root
            .as_ref()
            .map_or(0, |root| root.check(self.height()));
        let tail_len = self.tail.as_ref().map_or(0, |tail| tail.check(0));

        assert_eq!(root_len + tail_len, self.size);
        assert_eq!(root_len, self.tail_offset());
        assert!(tail_len <= BRANCHING);
        assert_eq!(tail_len == 0, self.size == 0);
        assert_eq!(self.level % BITS, 0);

        match &self.root {
            None => assert_eq!(self.level, BITS),
            Some(root) => {
                assert!(root_len <= capacity(self.height()));
                if self.level > BITS {
                    assert!(root.child(1).is_some(), "root has a single child");
                }
            }
        }

        // The trie is packed to the left, so every index must resolve.
        assert!((0..self.size).all(|i| self.get(i).is_ok()));
    }

    /// Moves a full leaf that used to be the tail into the trie, at
    /// position `pos`.
    fn push_tail(&mut self, owner: &Owner, leaf: Rc<Node<T>>, pos: usize)
    where
        T: Clone,
    {
        let height = self.height();
        match self.root.as_mut() {
            None => {
                debug_assert_eq!(pos, 0);
                self.root = Some(Rc::new(Node::branch(
                    owner,
                    [(extract_index(pos, height), leaf)],
                )));
            }
            Some(root) if pos < capacity(height) => {
                acquire_editable(root, owner).graft(owner, height, pos, leaf);
            }
            Some(root) => {
                // The root is full: the old root becomes the left child of a
                // new root, and the leaf goes at the bottom of a fresh right
                // child.
                let branch = Node::wrap(owner, leaf, 0, height, pos);
                *root = Rc::new(Node::branch(
                    owner,
                    [
                        (0, Rc::clone(root)),
                        (extract_index(pos, height + 1), branch),
                    ],
                ));
                self.level += BITS;
                log::trace!("vector trie grew to level {}", self.level);
            }
        }
    }
}

impl<T: Clone> Vector<T> {
    /// Starts an edit session on a copy of this vector.
    ///
    /// The session copies each node at most once, the first time it
    /// modifies it, so a batch of modifications is much cheaper through a
    /// session than through the `with_*` methods. `self` is not affected.
    pub fn begin_edit(&self) -> TransientVector<T> {
        TransientVector::new(self.clone())
    }

    /// Returns a new version of this vector with the element at `index`
    /// replaced by `value`.
    ///
    /// Runs in time complexity `O(log n)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use immu_vector::Vector;
    /// let vec = Vector::from_iter([0, 1, 2]);
    /// let updated = vec.with_update(1, 10).unwrap();
    /// assert_eq!(vec.get(1), Ok(&1));
    /// assert_eq!(updated.get(1), Ok(&10));
    /// assert!(vec.with_update(3, 10).is_err());
    /// ```
    pub fn with_update(&self, index: usize, value: T) -> Result<Self> {
        let mut edit = self.begin_edit();
        edit.update(index, value)?;
        Ok(edit.end_edit())
    }

    /// Returns a new version of this vector with `value` added to the end.
    ///
    /// Runs in amortized time complexity `O(1)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use immu_vector::Vector;
    /// let vec = Vector::from_iter([0, 1, 2]);
    /// let appended = vec.with_append(3);
    /// assert_eq!(vec.len(), 3);
    /// assert_eq!(appended.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    /// ```
    pub fn with_append(&self, value: T) -> Self {
        let mut edit = self.begin_edit();
        edit.append(value);
        edit.end_edit()
    }
}

/// An edit session on a [`Vector`].
///
/// Modifications go straight into the nodes this session has already
/// copied. Nodes that might be visible from some other version are copied
/// first, so the versions this session started from never change.
pub struct TransientVector<T> {
    vec: Vector<T>,
    owner: Owner,
}

impl<T> TransientVector<T> {
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        self.vec.get(index)
    }

    /// Ends the session, publishing the result.
    pub fn end_edit(self) -> Vector<T> {
        self.vec
    }
}

impl<T: Clone> TransientVector<T> {
    fn new(vec: Vector<T>) -> Self {
        TransientVector {
            vec,
            owner: Owner::new(),
        }
    }

    /// Replaces the element at `index`.
    pub fn update(&mut self, index: usize, value: T) -> Result<()> {
        let vec = &mut self.vec;
        let out_of_range = Error::OutOfRange {
            index,
            len: vec.size,
        };
        if index >= vec.size {
            return Err(out_of_range);
        }

        let (node, height) = if index >= vec.tail_offset() {
            (vec.tail.as_mut(), 0)
        } else {
            (vec.root.as_mut(), vec.level / BITS)
        };
        let node = node.ok_or(out_of_range)?;
        let old = acquire_editable(node, &self.owner).put(&self.owner, height, index, value);
        debug_assert!(old.is_some());
        Ok(())
    }

    /// Adds an element to the end.
    pub fn append(&mut self, value: T) {
        let owner = &self.owner;
        let vec = &mut self.vec;
        let offset = vec.tail_offset();
        let tail_len = vec.size - offset;

        match vec.tail.as_mut() {
            Some(tail) if tail_len < BRANCHING => {
                acquire_editable(tail, owner).put(owner, 0, tail_len, value);
            }
            _ => {
                let fresh = Rc::new(Node::unit_leaf(owner, 0, value));
                if let Some(full) = vec.tail.replace(fresh) {
                    log::trace!("moving a full tail into the trie at {offset}");
                    vec.push_tail(owner, full, offset);
                }
            }
        }
        vec.size += 1;
    }
}

impl<T: Clone> Extend<T> for TransientVector<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for elt in iter {
            self.append(elt);
        }
    }
}

impl<T: Clone> Extend<T> for Vector<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let mut edit = TransientVector::new(std::mem::take(self));
        edit.extend(iter);
        *self = edit.end_edit();
    }
}

impl<T: Clone> FromIterator<T> for Vector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ret = Vector::new();
        ret.extend(iter);
        ret
    }
}

impl<'a, T> IntoIterator for &'a Vector<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        Iter::new(self.root.as_deref(), self.tail.as_deref(), self.size)
    }
}

impl<T> Default for Vector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for Vector<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.get(index).expect("index out of range")
    }
}

impl<T: fmt::Debug> fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self).finish()
    }
}

impl<T: PartialEq> PartialEq for Vector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other)
    }
}

impl<T: Eq> Eq for Vector<T> {}

impl<T: Hash> Hash for Vector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for elt in self {
            elt.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic() {
        let mut vec = Vector::<u32>::new();
        vec.check_invariants();
        vec = vec.with_append(1);
        assert_eq!(vec.get(0), Ok(&1));
        assert_eq!(vec.get(1), Err(Error::OutOfRange { index: 1, len: 1 }));
        vec.check_invariants();

        vec = vec.with_append(2).with_append(3);
        vec.check_invariants();
        assert_eq!(vec.get(0), Ok(&1));
        assert_eq!(vec.get(1), Ok(&2));
        assert_eq!(vec.get(2), Ok(&3));
        assert!(vec.get(3).is_err());

        let mut iter = vec.iter();
        assert_eq!(iter.next(), Some(&1));
        assert_eq!(iter.next(), Some(&2));
        assert_eq!(iter.next(), Some(&3));
        assert_eq!(iter.next(), None);

        vec.extend([1, 2, 3]);
        vec.check_invariants();
        assert_eq!(6, vec.len());
        assert_eq!(
            vec.iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 1, 2, 3]
        );
        assert_eq!(vec.first(), Some(&1));
        assert_eq!(vec.last(), Some(&3));
    }

    #[test]
    fn tail_offsets() {
        assert_eq!(tail_offset(0), 0);
        assert_eq!(tail_offset(31), 0);
        assert_eq!(tail_offset(32), 0);
        assert_eq!(tail_offset(33), 32);
        assert_eq!(tail_offset(64), 32);
        assert_eq!(tail_offset(65), 64);
    }

    #[test]
    fn tail_spills_into_the_trie() {
        let vec: Vector<usize> = (0..32).collect();
        assert!(vec.root.is_none());
        vec.check_invariants();

        let vec = vec.with_append(32);
        vec.check_invariants();
        assert_eq!(vec.tail_offset(), 32);
        assert_eq!(vec.root.as_ref().map(|r| r.len()), Some(32));
        assert_eq!(vec.tail.as_ref().map(|t| t.len()), Some(1));
        assert_eq!(vec[31], 31);
        assert_eq!(vec[32], 32);
    }

    #[test]
    fn level_grows_when_the_root_fills() {
        // A level-5 root holds 32 leaves, and the tail holds one more.
        let vec: Vector<usize> = (0..BRANCHING * BRANCHING + BRANCHING).collect();
        vec.check_invariants();
        assert_eq!(vec.level(), BITS);

        let vec = vec.with_append(usize::MAX);
        vec.check_invariants();
        assert_eq!(vec.level(), 2 * BITS);
        assert_eq!(vec.last(), Some(&usize::MAX));
        assert_eq!(vec[BRANCHING * BRANCHING], BRANCHING * BRANCHING);
    }

    #[test]
    fn update_shares_untouched_subtrees() {
        let vec: Vector<usize> = (0..2000).collect();
        assert_eq!(vec.level(), 2 * BITS);
        let updated = vec.with_update(5, 5000).unwrap();
        updated.check_invariants();

        let old_root = vec.root.as_ref().unwrap();
        let new_root = updated.root.as_ref().unwrap();
        assert!(!Rc::ptr_eq(old_root, new_root));

        let old_first = old_root.child(0).unwrap();
        let new_first = new_root.child(0).unwrap();
        assert!(!Rc::ptr_eq(old_first, new_first));
        assert!(!Rc::ptr_eq(
            old_first.child(0).unwrap(),
            new_first.child(0).unwrap()
        ));
        for slot in 1..BRANCHING {
            assert!(Rc::ptr_eq(
                old_first.child(slot).unwrap(),
                new_first.child(slot).unwrap()
            ));
        }
        assert!(Rc::ptr_eq(
            old_root.child(1).unwrap(),
            new_root.child(1).unwrap()
        ));
        assert!(Rc::ptr_eq(
            vec.tail.as_ref().unwrap(),
            updated.tail.as_ref().unwrap()
        ));

        assert_eq!(vec[5], 5);
        assert_eq!(updated[5], 5000);
    }

    #[test]
    fn update_in_tail_shares_the_trie() {
        let vec: Vector<usize> = (0..100).collect();
        let updated = vec.with_update(99, 0).unwrap();

        assert!(Rc::ptr_eq(
            vec.root.as_ref().unwrap(),
            updated.root.as_ref().unwrap()
        ));
        assert!(!Rc::ptr_eq(
            vec.tail.as_ref().unwrap(),
            updated.tail.as_ref().unwrap()
        ));
        assert_eq!(vec[99], 99);
        assert_eq!(updated[99], 0);
    }

    #[test]
    fn sessions_mutate_their_own_nodes_in_place() {
        let base: Vector<usize> = (0..10).collect();
        let mut edit = base.begin_edit();

        edit.append(10);
        let tail = Rc::as_ptr(edit.vec.tail.as_ref().unwrap());
        assert_ne!(tail, Rc::as_ptr(base.tail.as_ref().unwrap()));

        edit.append(11);
        edit.update(0, 100).unwrap();
        assert_eq!(Rc::as_ptr(edit.vec.tail.as_ref().unwrap()), tail);

        let vec = edit.end_edit();
        vec.check_invariants();
        assert_eq!(vec.len(), 12);
        assert_eq!(vec[0], 100);
        assert_eq!(base.len(), 10);
        assert_eq!(base[0], 0);
    }

    #[test]
    fn published_nodes_are_copied_by_the_next_session() {
        let vec: Vector<usize> = (0..10).collect();
        let tail = Rc::as_ptr(vec.tail.as_ref().unwrap());

        let mut edit = vec.begin_edit();
        edit.update(3, 30).unwrap();
        let next = edit.end_edit();

        assert_ne!(Rc::as_ptr(next.tail.as_ref().unwrap()), tail);
        assert_eq!(vec[3], 3);
        assert_eq!(next[3], 30);
    }

    #[test]
    fn equality_and_debug() {
        let a: Vector<u8> = (0..50).collect();
        let b = (0..49).collect::<Vector<u8>>().with_append(49);
        assert_eq!(a, b);
        assert_ne!(a, b.with_update(0, 1).unwrap());
        assert_eq!(format!("{:?}", Vector::from_iter([1, 2])), "[1, 2]");
    }
}
