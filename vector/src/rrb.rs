use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Index,
    rc::Rc,
};

use crate::{
    edit::{acquire_editable, Owner},
    node::{capacity, Iter, Node},
    Error, Result,
};

/// A persistent vector that can grow at both ends.
///
/// The elements occupy the positions `start..=end` of a tree whose root can
/// address `32^depth` positions. Appending fills in position `end + 1` and
/// prepending fills in position `start - 1`; nodes are only ever partially
/// filled along the two edges of the window. When the window reaches the edge
/// of the root's capacity, the tree grows by one level: the old root becomes
/// one child of a new root, and a minimal branch holding the new element
/// becomes the other. Already stored elements are never renumbered, apart
/// from the constant shift applied to the whole window when the tree grows on
/// the left.
///
/// Cloning is `O(1)`. All the `with_*` methods leave `self` alone and return
/// a new version that shares every untouched node with `self`.
#[derive(Clone)]
pub struct RrbVector<T> {
    root: Option<Rc<Node<T>>>,
    // The height of the tree, counting the leaves as one. Zero when empty.
    depth: u32,
    start: usize,
    // Inclusive.
    end: usize,
}

impl<T> RrbVector<T> {
    pub fn new() -> Self {
        RrbVector {
            root: None,
            depth: 0,
            start: 0,
            end: 0,
        }
    }

    pub fn len(&self) -> usize {
        if self.root.is_some() {
            self.end - self.start + 1
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The height of the tree, counting the leaves as one. The root can
    /// address `32^depth` positions.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Gets the element at the given index.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use immu_vector::{Error, RrbVector};
    /// let vec = RrbVector::from_iter([1, 2]).with_prepend(0);
    /// assert_eq!(vec.get(0), Ok(&0));
    /// assert_eq!(vec.get(2), Ok(&2));
    /// assert_eq!(vec.get(3), Err(Error::OutOfRange { index: 3, len: 3 }));
    /// ```
    pub fn get(&self, index: usize) -> Result<&T> {
        let out_of_range = Error::OutOfRange {
            index,
            len: self.len(),
        };
        if index >= self.len() {
            return Err(out_of_range);
        }
        self.root
            .as_ref()
            .and_then(|root| root.get(self.depth - 1, self.start + index))
            .ok_or(out_of_range)
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0).ok()
    }

    pub fn last(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i).ok())
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.into_iter()
    }

    pub fn check_invariants(&self) {
        match &self.root {
            None => {
                assert_eq!(self.depth, 0);
                assert_eq!((self.start, self.end), (0, 0));
            }
            Some(root) => {
                assert!(self.depth >= 1);
                assert!(self.start <= self.end);
                assert!(self.end < capacity(self.depth - 1));
                assert_eq!(root.check(self.depth - 1), self.len());
                // Together with the count above, this means that the
                // occupied slots are exactly the window.
                assert!((0..self.len()).all(|i| self.get(i).is_ok()));
            }
        }
    }
}

impl<T: Clone> RrbVector<T> {
    /// Starts an edit session on a copy of this vector.
    ///
    /// The session copies each node at most once, the first time it
    /// modifies it. `self` is not affected.
    pub fn begin_edit(&self) -> TransientRrbVector<T> {
        TransientRrbVector::new(self.clone())
    }

    /// Returns a new version of this vector with the element at `index`
    /// replaced by `value`.
    ///
    /// Runs in time complexity `O(log n)`.
    pub fn with_update(&self, index: usize, value: T) -> Result<Self> {
        let mut edit = self.begin_edit();
        edit.update(index, value)?;
        Ok(edit.end_edit())
    }

    /// Returns a new version of this vector with `value` added to the end.
    ///
    /// Runs in time complexity `O(log n)`.
    pub fn with_append(&self, value: T) -> Self {
        let mut edit = self.begin_edit();
        edit.append(value);
        edit.end_edit()
    }

    /// Returns a new version of this vector with `value` added to the front.
    /// The old elements move up by one index.
    ///
    /// Runs in time complexity `O(log n)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use immu_vector::RrbVector;
    /// let vec = RrbVector::from_iter([1, 2, 3]);
    /// let prepended = vec.with_prepend(0);
    /// assert_eq!(vec.len(), 3);
    /// assert_eq!(prepended.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    /// ```
    pub fn with_prepend(&self, value: T) -> Self {
        let mut edit = self.begin_edit();
        edit.prepend(value);
        edit.end_edit()
    }
}

/// An edit session on an [`RrbVector`].
pub struct TransientRrbVector<T> {
    vec: RrbVector<T>,
    owner: Owner,
}

impl<T> TransientRrbVector<T> {
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
    pub fn end_edit(self) -> RrbVector<T> {
        self.vec
    }
}

impl<T: Clone> TransientRrbVector<T> {
    fn new(vec: RrbVector<T>) -> Self {
        TransientRrbVector {
            vec,
            owner: Owner::new(),
        }
    }

    /// Replaces the element at `index`.
    pub fn update(&mut self, index: usize, value: T) -> Result<()> {
        let vec = &mut self.vec;
        let len = vec.len();
        let height = vec.depth.saturating_sub(1);
        match vec.root.as_mut() {
            Some(root) if index < len => {
                let pos = vec.start + index;
                let old = acquire_editable(root, &self.owner).put(&self.owner, height, pos, value);
                debug_assert!(old.is_some());
                Ok(())
            }
            _ => Err(Error::OutOfRange { index, len }),
        }
    }

    /// Adds an element to the end.
    pub fn append(&mut self, value: T) {
        let owner = &self.owner;
        let vec = &mut self.vec;
        let height = vec.depth.saturating_sub(1);
        match vec.root.as_mut() {
            None => vec.init(owner, value),
            // Position `end + 1` is still within the root's reach: walk down
            // the right edge, copying what we don't own, and hang a fresh
            // branch off the first node whose children are all taken.
            Some(root) if vec.end + 1 < capacity(height) => {
                vec.end += 1;
                acquire_editable(root, owner).put(owner, height, vec.end, value);
            }
            Some(root) => {
                vec.end += 1;
                let branch = Node::path(owner, height, vec.end, value);
                *root = Rc::new(Node::branch(owner, [(0, Rc::clone(root)), (1, branch)]));
                vec.depth += 1;
                log::trace!("rrb tree grew to depth {} on the right", vec.depth);
            }
        }
    }

    /// Adds an element to the front.
    pub fn prepend(&mut self, value: T) {
        let owner = &self.owner;
        let vec = &mut self.vec;
        let height = vec.depth.saturating_sub(1);
        match vec.root.as_mut() {
            None => vec.init(owner, value),
            Some(root) if vec.start > 0 => {
                vec.start -= 1;
                acquire_editable(root, owner).put(owner, height, vec.start, value);
            }
            Some(root) => {
                // There's no room on the left. The old root moves to the second
                // slot of a new root, which shifts every position by the span
                // of one old root.
                let span = capacity(height);
                let branch = Node::path(owner, height, span - 1, value);
                *root = Rc::new(Node::branch(owner, [(0, branch), (1, Rc::clone(root))]));
                vec.start = span - 1;
                vec.end += span;
                vec.depth += 1;
                log::trace!("rrb tree grew to depth {} on the left", vec.depth);
            }
        }
    }
}

impl<T> RrbVector<T> {
    /// Turns an empty vector into a single leaf holding `value`.
    fn init(&mut self, owner: &Owner, value: T) {
        debug_assert!(self.root.is_none());
        self.root = Some(Rc::new(Node::unit_leaf(owner, 0, value)));
        self.depth = 1;
        self.start = 0;
        self.end = 0;
    }
}

impl<T: Clone> Extend<T> for TransientRrbVector<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for elt in iter {
            self.append(elt);
        }
    }
}

impl<T: Clone> Extend<T> for RrbVector<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let mut edit = TransientRrbVector::new(std::mem::take(self));
        edit.extend(iter);
        *self = edit.end_edit();
    }
}

impl<T: Clone> FromIterator<T> for RrbVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ret = RrbVector::new();
        ret.extend(iter);
        ret
    }
}

impl<'a, T> IntoIterator for &'a RrbVector<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        Iter::new(self.root.as_deref(), None, self.len())
    }
}

impl<T> Default for RrbVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for RrbVector<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        self.get(index).expect("index out of range")
    }
}

impl<T: fmt::Debug> fmt::Debug for RrbVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self).finish()
    }
}

impl<T: PartialEq> PartialEq for RrbVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other)
    }
}

impl<T: Eq> Eq for RrbVector<T> {}

impl<T: Hash> Hash for RrbVector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for elt in self {
            elt.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::BRANCHING;

    #[test]
    fn empty() {
        let vec = RrbVector::<u8>::new();
        vec.check_invariants();
        assert_eq!(vec.len(), 0);
        assert_eq!(vec.get(0), Err(Error::OutOfRange { index: 0, len: 0 }));
        assert_eq!(vec.iter().next(), None);
        assert!(vec.with_update(0, 1).is_err());
    }

    #[test]
    fn first_element() {
        let appended = RrbVector::new().with_append('a');
        let prepended = RrbVector::new().with_prepend('a');
        for vec in [appended, prepended] {
            vec.check_invariants();
            assert_eq!(vec.depth(), 1);
            assert_eq!(vec.len(), 1);
            assert_eq!(vec[0], 'a');
        }
    }

    #[test]
    fn append_grows_on_the_right() {
        let mut vec = RrbVector::new();
        for i in 0..BRANCHING {
            vec = vec.with_append(i);
        }
        assert_eq!(vec.depth(), 1);
        vec.check_invariants();

        let grown = vec.with_append(BRANCHING);
        grown.check_invariants();
        assert_eq!(grown.depth(), 2);
        // The old root is reused as is.
        assert!(Rc::ptr_eq(
            vec.root.as_ref().unwrap(),
            grown.root.as_ref().unwrap().child(0).unwrap()
        ));
        assert_eq!(grown[BRANCHING], BRANCHING);
        assert_eq!(vec.len(), BRANCHING);
    }

    #[test]
    fn prepend_grows_on_the_left() {
        let vec = RrbVector::new().with_append(1).with_append(2);
        let grown = vec.with_prepend(0);
        grown.check_invariants();
        assert_eq!(grown.depth(), 2);
        assert_eq!((grown.start, grown.end), (BRANCHING - 1, BRANCHING + 1));
        assert!(Rc::ptr_eq(
            vec.root.as_ref().unwrap(),
            grown.root.as_ref().unwrap().child(1).unwrap()
        ));

        // There's room on the left now, so the depth stays put.
        let mut more = grown.clone();
        for i in 1..BRANCHING {
            more = more.with_prepend(-(i as i32));
        }
        more.check_invariants();
        assert_eq!(more.depth(), 2);
        assert_eq!(more.start, 0);
        assert_eq!(more[0], -(BRANCHING as i32 - 1));
        assert_eq!(more.last(), Some(&2));

        let deeper = more.with_prepend(-100);
        deeper.check_invariants();
        assert_eq!(deeper.depth(), 3);
        assert_eq!(deeper[0], -100);
        assert_eq!(deeper.len(), more.len() + 1);
    }

    #[test]
    fn interleaved_ends() {
        let mut vec = RrbVector::new();
        let mut model = VecDeque::new();
        for i in 0..40 {
            vec = vec.with_append(i);
            model.push_back(i);
            vec = vec.with_prepend(-i - 1);
            model.push_front(-i - 1);
        }
        vec.check_invariants();
        assert_eq!(vec.len(), 80);
        for (i, expected) in model.iter().enumerate() {
            assert_eq!(vec.get(i), Ok(expected));
        }
        assert!(vec.iter().eq(model.iter()));
    }

    #[test]
    fn update_copies_one_path() {
        let vec: RrbVector<usize> = (0..2000).collect();
        let vec = vec.with_prepend(0);
        let updated = vec.with_update(1500, 0).unwrap();
        updated.check_invariants();

        let old_root = vec.root.as_ref().unwrap();
        let new_root = updated.root.as_ref().unwrap();
        let mut shared = 0;
        for slot in 0..BRANCHING {
            if let (Some(a), Some(b)) = (old_root.child(slot), new_root.child(slot)) {
                if Rc::ptr_eq(a, b) {
                    shared += 1;
                }
            }
        }
        // The root has two children: the branch holding the prepended element
        // and the old root. Only the latter is on the updated path.
        assert_eq!(shared, 1);
        assert_eq!(vec[1500], 1499);
        assert_eq!(updated[1500], 0);
    }

    #[test]
    fn session_keeps_its_own_nodes() {
        let base: RrbVector<u32> = (0..5).collect();
        let mut edit = base.begin_edit();
        edit.prepend(100);
        let root = Rc::as_ptr(edit.vec.root.as_ref().unwrap());
        edit.append(200);
        edit.update(3, 300).unwrap();
        assert_eq!(Rc::as_ptr(edit.vec.root.as_ref().unwrap()), root);
        assert_eq!(edit.get(0), Ok(&100));

        let vec = edit.end_edit();
        vec.check_invariants();
        assert_eq!(
            vec.iter().copied().collect::<Vec<_>>(),
            vec![100, 0, 1, 300, 3, 4, 200]
        );
        assert_eq!(base.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }
}
